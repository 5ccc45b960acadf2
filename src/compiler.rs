//! Lowers read forms into bytecode. Code is assembled in a local buffer bounded by
//! [BUFFER_SIZE], then copied into a `data_buffer` value: packed after existing code when some
//! live buffer still has room, or into a fresh one otherwise.

use crate::bytecode::Instruction;
use crate::config::BUFFER_SIZE;
use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::eval::{self, Position, Special};
use crate::value::{Data, Function, Handle, Symbol};

struct Compiler<'c> {
    ctx: &'c mut Context,
    code: Vec<u8>,
}

impl<'c> Compiler<'c> {
    fn new(ctx: &'c mut Context) -> Self {
        Self {
            ctx,
            code: Vec::new(),
        }
    }

    /// Appends an instruction and returns the position of its operand.
    fn emit(&mut self, instruction: Instruction) -> Result<usize> {
        let operand = self.code.len() + 1;
        instruction.encode(&mut self.code);

        if self.code.len() > BUFFER_SIZE {
            log::warn!("compiled code does not fit a {BUFFER_SIZE} byte buffer");
            return Err(ErrorCode::OutOfMemory);
        }

        Ok(operand)
    }

    fn here(&self, start: usize) -> Result<u16> {
        u16::try_from(self.code.len() - start).map_err(|_| ErrorCode::OutOfMemory)
    }

    fn patch(&mut self, operand: usize, target: u16) {
        self.code[operand..operand + 2].copy_from_slice(&target.to_le_bytes());
    }

    fn name(&mut self, symbol: Symbol) -> Result<u16> {
        match symbol {
            Symbol::Interned(offset) => Ok(offset),
            Symbol::Stable(name) => self.ctx.symbols.intern(name),
        }
    }

    fn integer(&mut self, value: i32) -> Result<()> {
        let instruction = match value {
            0 => Instruction::Push0,
            1 => Instruction::Push1,
            2 => Instruction::Push2,
            -126..=126 => Instruction::PushSmallInteger(value as i8),
            _ => Instruction::PushInteger(value),
        };
        self.emit(instruction).map(|_| ())
    }

    /// A function body: forms separated by `pop`, closed by `ret`.
    fn body(&mut self, forms: Handle, start: usize) -> Result<()> {
        let mut first = true;

        for form in self.ctx.list_items(forms).collect::<Vec<_>>() {
            if !first {
                self.emit(Instruction::Pop)?;
            }
            self.form(form, start, Position::Statement)?;
            first = false;
        }

        if first {
            self.emit(Instruction::PushNil)?;
        }

        self.emit(Instruction::Ret).map(|_| ())
    }

    fn form(&mut self, form: Handle, start: usize, position: Position) -> Result<()> {
        self.ctx.enter()?;
        let result = self.lower(form, start, position);
        self.ctx.leave();
        result
    }

    fn lower(&mut self, form: Handle, start: usize, position: Position) -> Result<()> {
        match *self.ctx.heap.data(form) {
            Data::Nil => self.emit(Instruction::PushNil).map(|_| ()),
            Data::Integer(value) => self.integer(value),
            Data::Symbol(symbol) => {
                let name = self.name(symbol)?;
                self.emit(Instruction::LoadVar(name)).map(|_| ())
            }
            Data::Cons { car, cdr } => {
                let head = self.ctx.heap.decompress(car);
                let rest = self.ctx.heap.decompress(cdr);
                self.application(head, rest, start, position)
            }
            _ => Err(ErrorCode::WrongArgumentType),
        }
    }

    fn application(
        &mut self,
        head: Handle,
        rest: Handle,
        start: usize,
        position: Position,
    ) -> Result<()> {
        let special = self
            .ctx
            .as_symbol(head)
            .and_then(|symbol| Special::from_name(self.ctx.symbol_text(symbol)));

        match special {
            Some(Special::If) => return self.conditional(rest, start, position),
            Some(Special::Lambda) => return self.lambda(rest, start),
            Some(Special::Let) => return self.binding(rest, start, position),
            Some(Special::Quote) => {
                let datum = eval::operands(self.ctx, rest, 1, 1)?[0];
                return self.quoted(datum);
            }
            Some(Special::Set) => {
                if position == Position::Expression {
                    return Err(ErrorCode::SetInExpressionContext);
                }
                let forms = eval::operands(self.ctx, rest, 2, 2)?;
                let symbol = eval::set_target(self.ctx, forms[0])?;
                let name = self.name(symbol)?;
                self.form(forms[1], start, Position::Expression)?;
                return self.emit(Instruction::SetVar(name)).map(|_| ());
            }
            None => {}
        }

        let arguments = match self.ctx.length(rest) {
            Some(length) if length > u8::MAX as usize => return Err(ErrorCode::WrongArgc),
            Some(_) => self.ctx.list_items(rest).collect::<Vec<_>>(),
            None => return Err(ErrorCode::NotCallable),
        };

        for &argument in &arguments {
            self.form(argument, start, Position::Expression)?;
        }

        self.form(head, start, Position::Expression)?;

        let instruction = match arguments.len() {
            1 => Instruction::Funcall1,
            2 => Instruction::Funcall2,
            3 => Instruction::Funcall3,
            argc => Instruction::Funcall(argc as u8),
        };
        self.emit(instruction).map(|_| ())
    }

    fn conditional(&mut self, rest: Handle, start: usize, position: Position) -> Result<()> {
        let forms = eval::operands(self.ctx, rest, 2, 3)?;

        self.form(forms[0], start, Position::Expression)?;
        let otherwise = self.emit(Instruction::JumpIfFalse(0))?;

        self.form(forms[1], start, position)?;
        let end = self.emit(Instruction::Jump(0))?;

        let target = self.here(start)?;
        self.patch(otherwise, target);

        match forms.get(2) {
            Some(&form) => self.form(form, start, position)?,
            None => {
                self.emit(Instruction::PushNil)?;
            }
        }

        let target = self.here(start)?;
        self.patch(end, target);

        Ok(())
    }

    /// Nested bodies are laid out inline and jumped over.
    fn lambda(&mut self, body: Handle, start: usize) -> Result<()> {
        let end = self.emit(Instruction::PushLambda(0))?;
        let inner = self.code.len();

        self.body(body, inner)?;

        let target = self.here(start)?;
        self.patch(end, target);

        Ok(())
    }

    /// Each binding keeps the old value on the stack and stores the new one with `set_var`. The
    /// `restore_var` chain at the end puts them back in reverse. A binding that cannot be stored
    /// jumps into the chain at its own entry, carrying its error as the value of the form.
    fn binding(&mut self, rest: Handle, start: usize, position: Position) -> Result<()> {
        let (bindings, body) = eval::let_parts(self.ctx, rest)?;
        let mut names = Vec::with_capacity(bindings.len());
        let mut failures = Vec::with_capacity(bindings.len());

        for (symbol, value) in bindings {
            let name = self.name(symbol)?;
            self.emit(Instruction::LoadVar(name))?;
            self.form(value, start, Position::Expression)?;
            self.emit(Instruction::SetVar(name))?;
            self.emit(Instruction::Dup)?;

            let stored = self.emit(Instruction::JumpIfFalse(0))?;
            failures.push(self.emit(Instruction::Jump(0))?);
            let target = self.here(start)?;
            self.patch(stored, target);

            self.emit(Instruction::Pop)?;
            names.push(name);
        }

        let forms = self.ctx.list_items(body).collect::<Vec<_>>();
        for (index, &form) in forms.iter().enumerate() {
            if index > 0 {
                self.emit(Instruction::Pop)?;
            }
            self.form(form, start, position)?;
        }
        if forms.is_empty() {
            self.emit(Instruction::PushNil)?;
        }

        let mut restores = Vec::with_capacity(names.len());
        for &name in names.iter().rev() {
            restores.push(self.here(start)?);
            self.emit(Instruction::RestoreVar(name))?;
        }

        for (failure, target) in failures.into_iter().zip(restores.into_iter().rev()) {
            self.patch(failure, target);
        }

        Ok(())
    }

    fn quoted(&mut self, datum: Handle) -> Result<()> {
        match *self.ctx.heap.data(datum) {
            Data::Nil => self.emit(Instruction::PushNil).map(|_| ()),
            Data::Integer(value) => self.integer(value),
            Data::Symbol(symbol) => {
                let name = self.name(symbol)?;
                self.emit(Instruction::PushSymbol(name)).map(|_| ())
            }
            Data::Cons { .. } => {
                if self.ctx.length(datum).is_none() {
                    return Err(ErrorCode::WrongArgumentType);
                }

                let items = self.ctx.list_items(datum).collect::<Vec<_>>();
                for &item in &items {
                    self.ctx.enter()?;
                    let result = self.quoted(item);
                    self.ctx.leave();
                    result?;
                }

                // `push_list` builds the last 255 items at most, the rest are consed on in front.
                let tail = items.len().min(u8::MAX as usize);
                self.emit(Instruction::PushList(tail as u8))?;
                for _ in tail..items.len() {
                    self.emit(Instruction::MakePair)?;
                }

                Ok(())
            }
            _ => Err(ErrorCode::WrongArgumentType),
        }
    }
}

/// Compiles a single form into a bytecode function of no parameters.
pub fn compile(ctx: &mut Context, form: Handle) -> Result<Handle> {
    let mut compiler = Compiler::new(ctx);
    compiler.form(form, 0, Position::Statement)?;
    compiler.emit(Instruction::Ret)?;

    let code = compiler.code;
    install(ctx, &code)
}

/// Compiles the body of an interpreted function.
pub fn compile_function(ctx: &mut Context, function: Handle) -> Result<Handle> {
    let Some(Function::Lisp { body }) = ctx.as_function(function) else {
        return Err(ErrorCode::WrongArgumentType);
    };

    let body = ctx.heap.decompress(body);
    let mut compiler = Compiler::new(ctx);
    compiler.body(body, 0)?;

    let code = compiler.code;
    install(ctx, &code)
}

pub(crate) fn install(ctx: &mut Context, code: &[u8]) -> Result<Handle> {
    let packed = ctx.heap.buffers().find_map(|(id, buffer)| {
        buffer
            .owner
            .filter(|_| buffer.remaining() >= code.len())
            .map(|owner| (id, owner))
    });

    let (id, buffer) = match packed {
        Some((id, owner)) => (id, ctx.heap.decompress(owner)),
        None => {
            let buffer = ctx.make_databuffer()?;
            let id = ctx.as_buffer(buffer).ok_or(ErrorCode::OutOfMemory)?;
            (id, buffer)
        }
    };

    // The space is only taken once the function cell exists.
    let offset = ctx.heap.buffer(id).used;
    let function = ctx.make_bytecode_function(buffer, offset as u16)?;

    let target = ctx.heap.buffer_mut(id);
    target.bytes[offset..offset + code.len()].copy_from_slice(code);
    target.used += code.len();

    log::debug!("compiled {} bytes into {id:?} at offset {offset}", code.len());

    Ok(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassemble;
    use crate::config::Config;
    use crate::reader;

    fn compiled(ctx: &mut Context, source: &str) -> Handle {
        reader::read(ctx, source);
        let form = ctx.get_op(0);
        let function = compile(ctx, form).unwrap();
        ctx.pop_op();
        ctx.push_op(function).unwrap();
        function
    }

    #[test]
    fn lowers_an_application() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = compiled(&mut ctx, "(+ 48 1000)");

        let listing = disassemble(&ctx, function).unwrap();
        let lines = listing.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "0000: PUSH_SMALL_INTEGER(48)");
        assert_eq!(lines[1], "0002: PUSH_INTEGER(1000)");
        assert!(lines[2].starts_with("0007: LOAD_VAR("));
        assert!(lines[2].ends_with("; +"));
        assert_eq!(lines[3], "0010: FUNCALL_2");
        assert_eq!(lines[4], "0011: RET");
    }

    #[test]
    fn small_literals_use_fast_opcodes() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = compiled(&mut ctx, "(list 0 1 2 -1 nil)");

        let listing = disassemble(&ctx, function).unwrap();

        assert!(listing.contains("PUSH_0"));
        assert!(listing.contains("PUSH_1"));
        assert!(listing.contains("PUSH_2"));
        assert!(listing.contains("PUSH_SMALL_INTEGER(-1)"));
        assert!(listing.contains("PUSH_NIL"));
        assert!(listing.contains("FUNCALL(5)"));
    }

    #[test]
    fn code_is_packed_into_one_buffer() {
        let mut ctx = crate::init(Config::default()).unwrap();

        compiled(&mut ctx, "(+ 1 2)");
        compiled(&mut ctx, "(+ 3 4)");

        assert_eq!(ctx.heap.buffers().count(), 1);
    }

    #[test]
    fn set_inside_an_expression_is_rejected() {
        let mut ctx = crate::init(Config::default()).unwrap();

        reader::read(&mut ctx, "(+ 1 (set x 2))");
        let form = ctx.get_op(0);

        assert_eq!(
            compile(&mut ctx, form),
            Err(ErrorCode::SetInExpressionContext)
        );
    }

    #[test]
    fn long_quoted_lists_are_built_in_chunks() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let items = (0..300).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let function = compiled(&mut ctx, &format!("'({items})"));

        let listing = disassemble(&ctx, function).unwrap();
        assert!(listing.contains("PUSH_LIST(255)"));
        assert_eq!(listing.matches("MAKE_PAIR").count(), 45);

        ctx.funcall(function, 0);
        let list = ctx.pop_op();
        assert_eq!(ctx.length(list), Some(300));
        assert_eq!(ctx.as_integer(ctx.list_get(list, 0)), Some(0));
        assert_eq!(ctx.as_integer(ctx.list_get(list, 299)), Some(299));
    }

    #[test]
    fn let_restores_in_reverse() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = compiled(&mut ctx, "(let ((a 1) (b 2)) (+ a b))");

        let listing = disassemble(&ctx, function).unwrap();
        let restores = listing
            .lines()
            .filter(|line| line.contains("RESTORE_VAR"))
            .collect::<Vec<_>>();

        assert_eq!(restores.len(), 2);
        assert!(restores[0].ends_with("; b"));
        assert!(restores[1].ends_with("; a"));
    }

    #[test]
    fn failed_install_leaves_the_buffer_untouched() {
        let mut ctx = Context::new(Config {
            pool_size: 8,
            ..Config::default()
        })
        .unwrap();

        // Two cells are always resident; five more leave room for the buffer but not the
        // function.
        for n in 0..5 {
            let integer = ctx.make_integer(n).unwrap();
            ctx.push_op(integer).unwrap();
        }

        assert_eq!(install(&mut ctx, &[6, 21]), Err(ErrorCode::OutOfMemory));
        assert!(ctx.heap.buffers().all(|(_, buffer)| buffer.used == 0));

        for _ in 0..5 {
            ctx.pop_op();
        }

        install(&mut ctx, &[6, 21]).unwrap();
        let used = ctx.heap.buffers().map(|(_, buffer)| buffer.used).sum::<usize>();
        assert_eq!(used, 2);
    }

    #[test]
    fn oversized_code_is_an_error() {
        let mut ctx = crate::init(Config::default()).unwrap();

        let source = format!("(progn {})", "(+ 100000 100000) ".repeat(200));
        reader::read(&mut ctx, &source);
        let form = ctx.get_op(0);

        assert_eq!(compile(&mut ctx, form), Err(ErrorCode::OutOfMemory));
    }
}
