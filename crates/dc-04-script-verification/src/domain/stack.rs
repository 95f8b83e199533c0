//! # Evaluation Stack
//!
//! LIFO of [`StackItem`]s shared by every invocation context of one engine.

use super::errors::{VmError, VmResult};
use super::stack_item::StackItem;

/// Maximum items on the evaluation stack.
pub const MAX_STACK_SIZE: usize = 2 * 1024;

/// Maximum bytes in a single item.
pub const MAX_ITEM_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct EvaluationStack {
    items: Vec<StackItem>,
}

impl EvaluationStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(16),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// # Errors
    ///
    /// `StackOverflow` when full, `ItemTooLarge` for oversized byte arrays.
    pub fn push(&mut self, item: impl Into<StackItem>) -> VmResult<()> {
        if self.items.len() >= MAX_STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        let item = item.into();
        if let StackItem::ByteArray(bytes) = &item {
            if bytes.len() > MAX_ITEM_SIZE {
                return Err(VmError::ItemTooLarge(bytes.len()));
            }
        }
        self.items.push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.items.pop().ok_or(VmError::StackUnderflow)
    }

    /// Item `depth` places below the top (0 = top).
    pub fn peek(&self, depth: usize) -> VmResult<&StackItem> {
        self.items
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.items.get(i))
            .ok_or(VmError::StackUnderflow)
    }

    /// Remove the item `depth` places below the top.
    pub fn remove(&mut self, depth: usize) -> VmResult<StackItem> {
        let index = self
            .items
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::StackUnderflow)?;
        Ok(self.items.remove(index))
    }

    /// Bottom-to-top view.
    pub fn as_slice(&self) -> &[StackItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_and_depth_access() {
        let mut stack = EvaluationStack::new();
        stack.push(vec![1u8]).unwrap();
        stack.push(vec![2u8]).unwrap();
        stack.push(true).unwrap();

        assert_eq!(stack.peek(0).unwrap(), &StackItem::Boolean(true));
        assert_eq!(stack.peek(2).unwrap(), &StackItem::ByteArray(vec![1]));
        assert_eq!(stack.peek(3), Err(VmError::StackUnderflow));

        assert_eq!(stack.remove(1).unwrap(), StackItem::ByteArray(vec![2]));
        assert_eq!(stack.len(), 2);
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn test_limits() {
        let mut stack = EvaluationStack::new();
        for _ in 0..MAX_STACK_SIZE {
            stack.push(false).unwrap();
        }
        assert_eq!(stack.push(false), Err(VmError::StackOverflow));

        let mut stack = EvaluationStack::new();
        assert_eq!(
            stack.push(vec![0u8; MAX_ITEM_SIZE + 1]),
            Err(VmError::ItemTooLarge(MAX_ITEM_SIZE + 1))
        );
    }
}
