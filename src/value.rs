//! The universal runtime datum. A value is a cell in the [crate::heap::Heap]; everything outside
//! the heap refers to it through a [Handle], and cells refer to each other through the 16 bit
//! [Compressed] form.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::Context;
use crate::error::{ErrorCode, Result};

/// A 16 bit reference to a cell: two pool selector bits and fourteen offset bits. Only meaningful
/// relative to the heap that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Compressed(u16);

impl Compressed {
    pub const OFFSET_BITS: u32 = 14;
    pub const MAX_OFFSET: usize = (1 << Self::OFFSET_BITS) - 1;
    pub const MAX_POOLS: usize = 4;

    pub fn new(pool: usize, offset: usize) -> Self {
        assert!(pool < Self::MAX_POOLS, "pool selector {pool} out of range");
        assert!(offset <= Self::MAX_OFFSET, "pool offset {offset} out of range");
        Self(((pool as u16) << Self::OFFSET_BITS) | offset as u16)
    }

    pub fn pool(self) -> usize {
        (self.0 >> Self::OFFSET_BITS) as usize
    }

    pub fn offset(self) -> usize {
        (self.0 as usize) & Self::MAX_OFFSET
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

impl Debug for Compressed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.pool(), self.offset())
    }
}

/// Identity of a heap, so a handle can never be resolved against a heap that did not produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Full width reference to a cell, used on the operand stack, in the global table and by the
/// host. Two handles are equal when they name the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) heap: HeapId,
    pub(crate) slot: Compressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Nil,
    Integer,
    Cons,
    Function,
    Error,
    Symbol,
    UserData,
    DataBuffer,
}

/// Native callables read their `argc` arguments with [Context::get_op], the last argument at
/// offset zero. The arguments are discarded by the caller.
pub type NativeFn = fn(&mut Context, u8) -> Result<Handle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(u8),
    AtLeast(u8),
}

impl Arity {
    pub fn required(self) -> u8 {
        match self {
            Arity::Exactly(n) | Arity::AtLeast(n) => n,
        }
    }

    pub fn accepts(self, argc: u8) -> bool {
        match self {
            Arity::Exactly(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
        }
    }
}

impl From<u8> for Arity {
    fn from(value: u8) -> Self {
        Arity::Exactly(value)
    }
}

#[derive(Clone, Copy)]
pub enum Function {
    Native { arity: Arity, call: NativeFn },

    /// Interpreted body: a list of forms evaluated in order.
    Lisp { body: Compressed },

    /// Compiled body starting at `offset` inside a `data_buffer` value.
    Bytecode { buffer: Compressed, offset: u16 },
}

impl Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Function::Native { arity, .. } => write!(f, "Native({arity:?})"),
            Function::Lisp { body } => write!(f, "Lisp({body:?})"),
            Function::Bytecode { buffer, offset } => write!(f, "Bytecode({buffer:?}+{offset})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// Offset of the name in the intern table.
    Interned(u16),

    /// A name owned by the host program.
    Stable(&'static str),
}

/// Host chosen tag paired with every wrapped pointer, checked when the pointer is taken back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostKind(pub u16);

impl HostKind {
    pub const OPAQUE: HostKind = HostKind(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u8);

#[derive(Debug, Clone, Copy)]
pub enum Data {
    Free { next: Option<Compressed> },
    Nil,
    Integer(i32),
    Cons { car: Compressed, cdr: Compressed },
    Function(Function),
    Error { code: ErrorCode, context: Compressed },
    Symbol(Symbol),
    UserData { ptr: *mut libc::c_void, kind: HostKind },
    DataBuffer(BufferId),
}

impl Data {
    pub fn tag(&self) -> Tag {
        match self {
            Data::Free { .. } => panic!("access to a reclaimed cell"),
            Data::Nil => Tag::Nil,
            Data::Integer(_) => Tag::Integer,
            Data::Cons { .. } => Tag::Cons,
            Data::Function(_) => Tag::Function,
            Data::Error { .. } => Tag::Error,
            Data::Symbol(_) => Tag::Symbol,
            Data::UserData { .. } => Tag::UserData,
            Data::DataBuffer(_) => Tag::DataBuffer,
        }
    }

    /// Cells this one keeps alive.
    pub(crate) fn children(&self) -> [Option<Compressed>; 2] {
        match *self {
            Data::Cons { car, cdr } => [Some(car), Some(cdr)],
            Data::Function(Function::Lisp { body }) => [Some(body), None],
            Data::Function(Function::Bytecode { buffer, .. }) => [Some(buffer), None],
            Data::Error { context, .. } => [Some(context), None],
            _ => [None, None],
        }
    }
}

/// One slot of a pool.
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub data: Data,
    pub alive: bool,
    pub mark: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_packs_pool_and_offset() {
        let pointer = Compressed::new(3, 16383);

        assert_eq!(pointer.pool(), 3);
        assert_eq!(pointer.offset(), 16383);
        assert_eq!(pointer.raw(), u16::MAX);
    }

    #[test]
    #[should_panic]
    fn compressed_rejects_wide_offsets() {
        Compressed::new(0, 16384);
    }

    #[test]
    fn arity_accepts() {
        assert!(Arity::Exactly(2).accepts(2));
        assert!(!Arity::Exactly(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(4));
        assert!(!Arity::AtLeast(1).accepts(0));
    }
}
