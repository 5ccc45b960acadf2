//! The interpreter context owns every piece of runtime state: the heap, the operand stack, the
//! global table, the intern table and the call frames. It is built once by the host and passed by
//! reference into every entry point.

use crate::config::Config;
use crate::error::{ConfigError, ErrorCode, Result};
use crate::globals::Globals;
use crate::heap::Heap;
use crate::intern::InternTable;
use crate::roots::{Protected, RootList};
use crate::stack::OperandStack;
use crate::value::{Arity, BufferId, Data, Function, Handle, HostKind, NativeFn, Symbol, Tag};

/// A running script function. Its arguments sit on the operand stack starting at `base`.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub this: Handle,
    pub base: usize,
    pub argc: u8,
}

/// What a name resolves to, computed without touching the heap.
enum Binding {
    Value(Handle),
    Constant(i32),
    Unbound,
}

/// Snapshot of the mutable depths, restored when an entry point fails half way.
#[derive(Clone, Copy)]
pub(crate) struct Checkpoint {
    stack: usize,
    roots: usize,
    frames: usize,
    depth: usize,
}

impl Checkpoint {
    pub(crate) fn stack_len(&self) -> usize {
        self.stack
    }
}

pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) stack: OperandStack,
    pub(crate) globals: Globals,
    pub(crate) symbols: InternTable,
    pub(crate) roots: RootList,
    pub(crate) frames: Vec<Frame>,
    pub(crate) constants: Vec<(&'static str, i32)>,
    pub(crate) depth: usize,
    config: Config,
}

impl Context {
    /// Builds an empty context, without builtins.
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            heap: Heap::new(&config),
            stack: OperandStack::new(config.stack_size),
            globals: Globals::new(config.globals),
            symbols: InternTable::new(config.intern_bytes),
            roots: RootList::default(),
            frames: Vec::with_capacity(config.max_depth),
            constants: Vec::new(),
            depth: 0,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn nil(&self) -> Handle {
        self.heap.nil()
    }

    pub fn tag(&self, value: Handle) -> Tag {
        self.heap.tag(value)
    }

    pub fn is_nil(&self, value: Handle) -> bool {
        self.tag(value) == Tag::Nil
    }

    pub fn is_error(&self, value: Handle) -> bool {
        self.tag(value) == Tag::Error
    }

    /// Everything except `nil` and the integer zero is true.
    pub fn is_true(&self, value: Handle) -> bool {
        !matches!(self.heap.data(value), Data::Nil | Data::Integer(0))
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            stack: self.stack.len(),
            roots: self.roots.len(),
            frames: self.frames.len(),
            depth: self.depth,
        }
    }

    /// Drops the roots, frames and nesting acquired since `checkpoint`.
    pub(crate) fn unwind(&mut self, checkpoint: Checkpoint) {
        self.roots.truncate(checkpoint.roots);
        self.frames.truncate(checkpoint.frames);
        self.depth = checkpoint.depth;
    }

    /// Unwinds to `checkpoint` and leaves the error for `code` as the single result.
    pub(crate) fn fail(&mut self, checkpoint: Checkpoint, code: ErrorCode) {
        self.unwind(checkpoint);
        let error = self.error_value(code);
        self.stack.truncate(checkpoint.stack);
        self.stack.land(error);
    }

    pub(crate) fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            log::warn!("evaluation nested deeper than {}", self.config.max_depth);
            return Err(ErrorCode::StackOverflow);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }

    // Allocation

    fn alloc(&mut self, data: Data) -> Result<Handle> {
        if let Some(handle) = self.heap.allocate(data) {
            return Ok(handle);
        }

        log::debug!("heap exhausted, collecting");
        self.collect();

        self.heap.allocate(data).ok_or_else(|| {
            log::warn!("heap exhausted after collection");
            ErrorCode::OutOfMemory
        })
    }

    /// Runs the collector over every root the context knows about.
    pub fn collect(&mut self) -> usize {
        let frames = self.frames.iter().map(|frame| frame.this);
        let roots = self
            .stack
            .iter()
            .chain(self.globals.values())
            .chain(self.roots.iter())
            .chain(frames);

        self.heap.collect(roots)
    }

    pub fn protect(&mut self, value: Handle) -> Protected {
        self.roots.protect(value)
    }

    pub fn release(&mut self, root: Protected) {
        self.roots.release(root)
    }

    pub fn make_integer(&mut self, value: i32) -> Result<Handle> {
        self.alloc(Data::Integer(value))
    }

    pub fn make_cons(&mut self, car: Handle, cdr: Handle) -> Result<Handle> {
        let data = Data::Cons {
            car: self.heap.compress(car),
            cdr: self.heap.compress(cdr),
        };

        let first = self.roots.protect(car);
        let second = self.roots.protect(cdr);
        let cons = self.alloc(data);
        self.roots.release(second);
        self.roots.release(first);

        cons
    }

    /// Builds an error value. Falls back to the preallocated out of memory error when even that
    /// cannot be allocated.
    pub fn make_error(&mut self, code: ErrorCode, context: Handle) -> Handle {
        if code == ErrorCode::OutOfMemory {
            return self.heap.oom();
        }

        let data = Data::Error {
            code,
            context: self.heap.compress(context),
        };

        let root = self.roots.protect(context);
        let error = self.alloc(data);
        self.roots.release(root);

        error.unwrap_or_else(|_| self.heap.oom())
    }

    pub fn error_value(&mut self, code: ErrorCode) -> Handle {
        let nil = self.nil();
        self.make_error(code, nil)
    }

    pub fn make_symbol(&mut self, name: &str) -> Result<Handle> {
        let offset = self.symbols.intern(name)?;
        self.alloc(Data::Symbol(Symbol::Interned(offset)))
    }

    /// Symbol backed by a name the host promises to keep alive, skipping the intern table.
    pub fn make_symbol_stable(&mut self, name: &'static str) -> Result<Handle> {
        self.alloc(Data::Symbol(Symbol::Stable(name)))
    }

    pub(crate) fn make_symbol_from(&mut self, symbol: Symbol) -> Result<Handle> {
        self.alloc(Data::Symbol(symbol))
    }

    pub fn make_native(&mut self, arity: Arity, call: NativeFn) -> Result<Handle> {
        self.alloc(Data::Function(Function::Native { arity, call }))
    }

    pub fn make_lisp_function(&mut self, body: Handle) -> Result<Handle> {
        let data = Data::Function(Function::Lisp {
            body: self.heap.compress(body),
        });

        let root = self.roots.protect(body);
        let function = self.alloc(data);
        self.roots.release(root);

        function
    }

    pub fn make_bytecode_function(&mut self, buffer: Handle, offset: u16) -> Result<Handle> {
        let data = Data::Function(Function::Bytecode {
            buffer: self.heap.compress(buffer),
            offset,
        });

        let root = self.roots.protect(buffer);
        let function = self.alloc(data);
        self.roots.release(root);

        function
    }

    pub fn make_userdata(&mut self, ptr: *mut libc::c_void, kind: HostKind) -> Result<Handle> {
        self.alloc(Data::UserData { ptr, kind })
    }

    /// Allocates a `data_buffer` value owning one of the scratch buffers.
    pub fn make_databuffer(&mut self) -> Result<Handle> {
        let id = match self.heap.claim_buffer() {
            Some(id) => id,
            None => {
                self.collect();
                self.heap.claim_buffer().ok_or(ErrorCode::OutOfMemory)?
            }
        };

        match self.alloc(Data::DataBuffer(id)) {
            Ok(handle) => {
                self.heap.buffer_mut(id).owner = Some(handle.slot);
                Ok(handle)
            }
            Err(code) => {
                self.heap.release_buffer(id);
                Err(code)
            }
        }
    }

    // Payload access. Reading a payload under the wrong tag is a programming error and panics.

    pub fn as_integer(&self, value: Handle) -> Option<i32> {
        match self.heap.data(value) {
            Data::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn integer(&self, value: Handle) -> i32 {
        match self.heap.data(value) {
            Data::Integer(n) => *n,
            other => panic!("integer payload read from a {:?} value", other.tag()),
        }
    }

    pub fn as_cons(&self, value: Handle) -> Option<(Handle, Handle)> {
        match self.heap.data(value) {
            Data::Cons { car, cdr } => {
                Some((self.heap.decompress(*car), self.heap.decompress(*cdr)))
            }
            _ => None,
        }
    }

    pub fn car(&self, value: Handle) -> Handle {
        match self.as_cons(value) {
            Some((car, _)) => car,
            None => panic!("car read from a {:?} value", self.tag(value)),
        }
    }

    pub fn cdr(&self, value: Handle) -> Handle {
        match self.as_cons(value) {
            Some((_, cdr)) => cdr,
            None => panic!("cdr read from a {:?} value", self.tag(value)),
        }
    }

    pub fn as_symbol(&self, value: Handle) -> Option<Symbol> {
        match self.heap.data(value) {
            Data::Symbol(symbol) => Some(*symbol),
            _ => None,
        }
    }

    pub fn symbol_text(&self, symbol: Symbol) -> &str {
        match symbol {
            Symbol::Interned(offset) => self.symbols.name(offset),
            Symbol::Stable(name) => name,
        }
    }

    pub fn as_function(&self, value: Handle) -> Option<Function> {
        match self.heap.data(value) {
            Data::Function(function) => Some(*function),
            _ => None,
        }
    }

    pub fn as_error(&self, value: Handle) -> Option<(ErrorCode, Handle)> {
        match self.heap.data(value) {
            Data::Error { code, context } => Some((*code, self.heap.decompress(*context))),
            _ => None,
        }
    }

    pub fn as_buffer(&self, value: Handle) -> Option<BufferId> {
        match self.heap.data(value) {
            Data::DataBuffer(id) => Some(*id),
            _ => None,
        }
    }

    pub fn symbols(&self) -> &InternTable {
        &self.symbols
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // Operand stack

    pub fn push_op(&mut self, value: Handle) -> Result<()> {
        self.stack.push(value)
    }

    /// Pops the top of the operand stack, `nil` when it is empty.
    pub fn pop_op(&mut self) -> Handle {
        self.stack.pop().unwrap_or(self.heap.nil())
    }

    /// Reads the operand `offset` slots below the top, `nil` when there is none.
    pub fn get_op(&self, offset: usize) -> Handle {
        self.stack.peek(offset).unwrap_or(self.heap.nil())
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // Global table

    fn binding(&self, name: &str) -> Binding {
        if let Some(index) = argument_index(name) {
            return Binding::Value(self.argument(index));
        }

        let global = self
            .symbols
            .find(name)
            .and_then(|offset| self.globals.get(offset));

        if let Some(value) = global {
            return Binding::Value(value);
        }

        match self.constants.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => Binding::Constant(*value),
            None => Binding::Unbound,
        }
    }

    fn materialize(&mut self, binding: Binding) -> Result<Option<Handle>> {
        match binding {
            Binding::Value(value) => Ok(Some(value)),
            Binding::Constant(value) => self.make_integer(value).map(Some),
            Binding::Unbound => Ok(None),
        }
    }

    /// Resolves a name against the current arguments, the globals and the constants, in order.
    pub fn resolve(&mut self, name: &str) -> Result<Option<Handle>> {
        let binding = self.binding(name);
        self.materialize(binding)
    }

    pub fn resolve_symbol(&mut self, symbol: Symbol) -> Result<Option<Handle>> {
        let binding = self.binding(self.symbol_text(symbol));
        self.materialize(binding)
    }

    /// Value of a global, or an `undefined-variable` error naming it.
    pub fn get_var(&mut self, name: &str) -> Handle {
        match self.resolve(name) {
            Ok(Some(value)) => value,
            Ok(None) => {
                let symbol = self.make_symbol(name).unwrap_or(self.heap.nil());
                self.make_error(ErrorCode::UndefinedVariable, symbol)
            }
            Err(code) => self.error_value(code),
        }
    }

    /// A new name is only interned once the global table is known to have room for it.
    pub fn set_var(&mut self, name: &str, value: Handle) -> Result<()> {
        let offset = match self.symbols.find(name) {
            Some(offset) => offset,
            None if self.globals.is_full() => {
                log::warn!("global table full, cannot bind {name}");
                return Err(ErrorCode::SymbolTableExhausted);
            }
            None => self.symbols.intern(name)?,
        };
        self.globals.set(offset, value)
    }

    pub fn set_var_symbol(&mut self, symbol: Symbol, value: Handle) -> Result<()> {
        match symbol {
            Symbol::Interned(offset) => self.globals.set(offset, value),
            Symbol::Stable(name) => self.set_var(name, value),
        }
    }

    pub fn remove_var(&mut self, symbol: Symbol) -> bool {
        match self.symbols.find(self.symbol_text(symbol)) {
            Some(offset) => self.globals.remove(offset),
            None => false,
        }
    }

    pub fn is_bound(&self, symbol: Symbol) -> bool {
        !matches!(self.binding(self.symbol_text(symbol)), Binding::Unbound)
    }

    // Frames

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The `index`-th argument of the running script function, in source order.
    pub fn argument(&self, index: usize) -> Handle {
        match self.frames.last() {
            Some(frame) if index < frame.argc as usize => self
                .stack
                .get(frame.base + index)
                .unwrap_or(self.heap.nil()),
            _ => self.heap.nil(),
        }
    }

    pub fn current_argc(&self) -> u8 {
        self.frames.last().map_or(0, |frame| frame.argc)
    }

    pub fn current_this(&self) -> Handle {
        self.frames.last().map_or(self.heap.nil(), |frame| frame.this)
    }

    // Lists

    /// Builds a list out of the top `count` operands, the deepest first, and pops them.
    pub fn list_from_stack(&mut self, count: usize) -> Result<Handle> {
        let count = count.min(self.stack.len());
        let mut list = self.nil();

        for offset in 0..count {
            let item = self.get_op(offset);
            list = self.make_cons(item, list)?;
        }

        self.stack.truncate(self.stack.len() - count);
        Ok(list)
    }

    /// Builds a list of `count` elements from back to front, `item` producing each element.
    pub fn build_list<F>(&mut self, count: usize, mut item: F) -> Result<Handle>
    where
        F: FnMut(&mut Context, usize) -> Result<Handle>,
    {
        let nil = self.nil();
        let root = self.roots.protect(nil);

        let mut result = Ok(nil);
        for index in (0..count).rev() {
            let cons = item(self, index).and_then(|value| {
                let list = self.roots.get(&root);
                self.make_cons(value, list)
            });

            match cons {
                Ok(list) => self.roots.set(&root, list),
                Err(code) => {
                    result = Err(code);
                    break;
                }
            }
        }

        let list = self.roots.get(&root);
        self.roots.release(root);

        result.map(|_| list)
    }

    /// A list of `count` nils.
    pub fn make_list(&mut self, count: usize) -> Result<Handle> {
        self.build_list(count, |ctx, _| Ok(ctx.nil()))
    }

    /// Replaces the `index`-th element. Returns false when the list is shorter.
    pub fn list_set(&mut self, mut list: Handle, index: usize, value: Handle) -> bool {
        for _ in 0..index {
            match self.as_cons(list) {
                Some((_, cdr)) => list = cdr,
                None => return false,
            }
        }

        let value = self.heap.compress(value);
        match self.heap.data_mut(list) {
            Data::Cons { car, .. } => {
                *car = value;
                true
            }
            _ => false,
        }
    }

    /// Length of a proper list, `None` for anything else.
    pub fn length(&self, mut list: Handle) -> Option<usize> {
        let mut length = 0;
        loop {
            match self.heap.data(list) {
                Data::Nil => return Some(length),
                Data::Cons { cdr, .. } => {
                    length += 1;
                    list = self.heap.decompress(*cdr);
                }
                _ => return None,
            }
        }
    }

    pub fn list_get(&self, mut list: Handle, index: usize) -> Handle {
        for _ in 0..index {
            match self.as_cons(list) {
                Some((_, cdr)) => list = cdr,
                None => return self.nil(),
            }
        }
        self.as_cons(list).map_or(self.nil(), |(car, _)| car)
    }

    /// Elements of a list, stopping at the first non cons cell.
    pub fn list_items(&self, list: Handle) -> impl Iterator<Item = Handle> + '_ {
        let mut cursor = list;
        std::iter::from_fn(move || {
            let (car, cdr) = self.as_cons(cursor)?;
            cursor = cdr;
            Some(car)
        })
    }

    /// Structural equality: lists, integers, symbols by name and error codes compare by content,
    /// everything else by identity.
    pub fn equal(&self, left: Handle, right: Handle) -> bool {
        match (self.heap.data(left), self.heap.data(right)) {
            (Data::Nil, Data::Nil) => true,
            (Data::Integer(a), Data::Integer(b)) => a == b,
            (Data::Symbol(a), Data::Symbol(b)) => self.symbol_text(*a) == self.symbol_text(*b),
            (Data::Error { code: a, .. }, Data::Error { code: b, .. }) => a == b,
            (Data::Cons { .. }, Data::Cons { .. }) => {
                let (mut left, mut right) = (left, right);
                while let (Some((a, left_rest)), Some((b, right_rest))) =
                    (self.as_cons(left), self.as_cons(right))
                {
                    if !self.equal(a, b) {
                        return false;
                    }
                    left = left_rest;
                    right = right_rest;
                }
                self.equal(left, right)
            }
            _ => left == right,
        }
    }
}

/// `$N` names the N-th argument of the running function.
fn argument_index(name: &str) -> Option<usize> {
    name.strip_prefix('$')?.parse::<u8>().ok().map(usize::from)
}
