use crate::error::{ErrorCode, Result};
use crate::value::Handle;

/// Fixed size table of global bindings, keyed by interned name and searched linearly.
pub struct Globals {
    entries: Vec<(u16, Handle)>,
    capacity: usize,
}

impl Globals {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Overwrites an existing binding in place, or appends a new one when there is room.
    pub fn set(&mut self, name: u16, value: Handle) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            entry.1 = value;
            return Ok(());
        }

        if self.entries.len() >= self.capacity {
            log::warn!("global table full at {} entries", self.capacity);
            return Err(ErrorCode::SymbolTableExhausted);
        }

        self.entries.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: u16) -> Option<Handle> {
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    pub fn remove(&mut self, name: u16) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| *key != name);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn names(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn values(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().map(|(_, value)| *value)
    }
}
