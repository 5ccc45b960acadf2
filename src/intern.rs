//! Symbol names live once in a fixed byte arena, separated by NUL bytes. A symbol is the offset
//! of its name, so interning the same name twice yields the same symbol.

use crate::error::{ErrorCode, Result};

pub struct InternTable {
    bytes: Box<[u8]>,
    used: usize,
}

impl InternTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    fn entries(&self) -> impl Iterator<Item = (u16, &[u8])> {
        let mut offset = 0;
        std::iter::from_fn(move || {
            if offset >= self.used {
                return None;
            }
            let start = offset;
            let len = self.bytes[start..self.used]
                .iter()
                .position(|byte| *byte == 0)
                .unwrap_or(self.used - start);
            offset = start + len + 1;
            Some((start as u16, &self.bytes[start..start + len]))
        })
    }

    pub fn find(&self, name: &str) -> Option<u16> {
        self.entries()
            .find(|(_, entry)| *entry == name.as_bytes())
            .map(|(offset, _)| offset)
    }

    pub fn intern(&mut self, name: &str) -> Result<u16> {
        if name.as_bytes().contains(&0) {
            return Err(ErrorCode::WrongArgumentType);
        }

        if let Some(offset) = self.find(name) {
            return Ok(offset);
        }

        let start = self.used;
        let end = start + name.len();

        if end >= self.bytes.len() {
            log::warn!("intern table full, cannot add '{name}'");
            return Err(ErrorCode::SymbolTableExhausted);
        }

        self.bytes[start..end].copy_from_slice(name.as_bytes());
        self.bytes[end] = 0;
        self.used = end + 1;

        Ok(start as u16)
    }

    pub fn name(&self, offset: u16) -> &str {
        let start = (offset as usize).min(self.used);
        let len = self.bytes[start..self.used]
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.used - start);
        std::str::from_utf8(&self.bytes[start..start + len]).unwrap_or_default()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_twice_is_identical() {
        let mut table = InternTable::new(64);

        let first = table.intern("player").unwrap();
        let second = table.intern("player").unwrap();

        assert_eq!(first, second);
        assert_eq!(table.name(first), "player");
    }

    #[test]
    fn different_names_never_alias() {
        let mut table = InternTable::new(64);

        let car = table.intern("car").unwrap();
        let cdr = table.intern("cdr").unwrap();
        let ca = table.intern("ca").unwrap();

        assert_ne!(car, cdr);
        assert_ne!(car, ca);
        assert_eq!(table.name(ca), "ca");
        assert_eq!(table.find("cdr"), Some(cdr));
        assert_eq!(table.find("cadr"), None);
    }

    #[test]
    fn full_table_is_reported() {
        let mut table = InternTable::new(8);

        table.intern("abc").unwrap();
        assert_eq!(table.intern("defg"), Err(ErrorCode::SymbolTableExhausted));
        assert_eq!(table.intern("abc"), Ok(0));
        assert_eq!(table.intern("de"), Ok(4));
    }
}
