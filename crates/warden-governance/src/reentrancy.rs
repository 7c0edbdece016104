//! Reentrancy protection for guarded entry points.
//!
//! Proposal execution, premium payment and compensation each push a frame
//! for the component they run in. Entering a component that already has a
//! frame on the stack is rejected.

use std::collections::BTreeSet;
use warden_types::Address;

use crate::error::GovernanceError;

/// Maximum nesting of guarded frames.
pub const MAX_CALL_DEPTH: usize = 16;

/// Tracks the guarded call stack.
#[derive(Debug, Clone)]
pub struct ReentrancyGuard {
    /// Current call stack
    stack: Vec<CallFrame>,
    /// Components in the call stack (for O(log n) lookup)
    in_stack: BTreeSet<Address>,
    /// Maximum call depth allowed
    max_depth: usize,
}

/// A single frame in the call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Component being entered
    pub component: Address,
    /// Account that entered it
    pub caller: Address,
    /// Call depth (0 for top-level)
    pub depth: usize,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            in_stack: BTreeSet::new(),
            max_depth,
        }
    }

    /// Enter a new call frame.
    ///
    /// # Errors
    /// Returns `Reentrancy` if the component is already on the stack or the
    /// maximum depth is reached.
    pub fn enter(&mut self, component: Address, caller: Address) -> Result<usize, GovernanceError> {
        let depth = self.stack.len();

        if depth >= self.max_depth {
            return Err(GovernanceError::Reentrancy(format!(
                "{} (call depth {} exceeded)",
                component, depth
            )));
        }

        if self.in_stack.contains(&component) {
            return Err(GovernanceError::Reentrancy(component.to_string()));
        }

        self.in_stack.insert(component);
        self.stack.push(CallFrame {
            component,
            caller,
            depth,
        });

        Ok(depth)
    }

    /// Exit the current call frame.
    pub fn exit(&mut self) -> Result<CallFrame, GovernanceError> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| GovernanceError::InvalidState("call stack is empty".to_string()))?;

        self.in_stack.remove(&frame.component);
        Ok(frame)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn contains(&self, component: &Address) -> bool {
        self.in_stack.contains(component)
    }
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new()
    }
}
