//! The operand stack carries every argument and every result.

use crate::error::{ErrorCode, Result};
use crate::value::Handle;

/// Fixed capacity LIFO of value handles. Offsets count from the top: `peek(0)` is the value
/// pushed last.
#[derive(Debug)]
pub struct OperandStack {
    slots: Vec<Handle>,
    capacity: usize,
}

impl OperandStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            // One spare slot so a failing call can always land its error value.
            slots: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, value: Handle) -> Result<()> {
        if self.slots.len() >= self.capacity {
            log::warn!("operand stack overflow at {} slots", self.capacity);
            return Err(ErrorCode::StackOverflow);
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pushes the outcome of a call, using the spare slot if the stack is full.
    pub(crate) fn land(&mut self, value: Handle) {
        if self.slots.len() <= self.capacity {
            self.slots.push(value);
        } else if let Some(top) = self.slots.last_mut() {
            *top = value;
        }
    }

    pub fn pop(&mut self) -> Option<Handle> {
        self.slots.pop()
    }

    pub fn peek(&self, offset: usize) -> Option<Handle> {
        let index = self.slots.len().checked_sub(offset + 1)?;
        Some(self.slots[index])
    }

    /// Absolute access from the bottom of the stack.
    pub fn get(&self, index: usize) -> Option<Handle> {
        self.slots.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.iter().copied()
    }
}
