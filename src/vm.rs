//! Stack machine running compiled functions against the shared operand stack and global table.

use crate::bytecode::Instruction;
use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::value::{Handle, Symbol};

/// Runs the function starting at `start` inside `buffer` until its `ret`, returning the value on
/// top of the stack. The caller owns the frame.
pub(crate) fn execute(ctx: &mut Context, buffer: Handle, start: u16) -> Result<Handle> {
    let id = ctx.as_buffer(buffer).ok_or(ErrorCode::InvalidBytecode)?;
    let start = start as usize;
    let base = ctx.stack.len();
    let mut pc = start;

    loop {
        let (instruction, next) = Instruction::decode(&ctx.heap.buffer(id).bytes, pc)?;
        log::trace!("{pc:04}: {instruction}");
        pc = next;

        match instruction {
            Instruction::Fatal => {
                log::warn!("fatal instruction at offset {}", pc - 1 - start);
                return Err(ErrorCode::InvalidBytecode);
            }
            Instruction::LoadVar(name) => {
                let value = load_var(ctx, name)?;
                ctx.push_op(value)?;
            }
            Instruction::PushNil => {
                let nil = ctx.nil();
                ctx.push_op(nil)?;
            }
            Instruction::PushInteger(value) => push_integer(ctx, value)?,
            Instruction::PushSmallInteger(value) => push_integer(ctx, value as i32)?,
            Instruction::Push0 => push_integer(ctx, 0)?,
            Instruction::Push1 => push_integer(ctx, 1)?,
            Instruction::Push2 => push_integer(ctx, 2)?,
            Instruction::PushSymbol(name) => {
                let symbol = ctx.make_symbol_from(Symbol::Interned(name))?;
                ctx.push_op(symbol)?;
            }
            Instruction::PushList(count) => {
                let list = ctx.list_from_stack(count as usize)?;
                ctx.push_op(list)?;
            }
            Instruction::Funcall(argc) => call(ctx, argc),
            Instruction::Funcall1 => call(ctx, 1),
            Instruction::Funcall2 => call(ctx, 2),
            Instruction::Funcall3 => call(ctx, 3),
            Instruction::Jump(target) => pc = start + target as usize,
            Instruction::JumpSmall(target) => pc = start + target as usize,
            Instruction::JumpIfFalse(target) => {
                let condition = ctx.pop_op();
                if !ctx.is_true(condition) {
                    pc = start + target as usize;
                }
            }
            Instruction::JumpSmallIfFalse(target) => {
                let condition = ctx.pop_op();
                if !ctx.is_true(condition) {
                    pc = start + target as usize;
                }
            }
            Instruction::PushLambda(end) => {
                let offset = u16::try_from(pc).map_err(|_| ErrorCode::InvalidBytecode)?;
                let function = ctx.make_bytecode_function(buffer, offset)?;
                ctx.push_op(function)?;
                pc = start + end as usize;
            }
            Instruction::Pop => {
                ctx.pop_op();
            }
            Instruction::Dup => {
                let top = ctx.get_op(0);
                ctx.push_op(top)?;
            }
            Instruction::Ret => {
                let result = if ctx.stack.len() > base {
                    ctx.pop_op()
                } else {
                    ctx.nil()
                };
                return Ok(result);
            }
            Instruction::SetVar(name) => {
                let value = ctx.get_op(0);
                let result = match ctx.globals.set(name, value) {
                    Ok(()) => ctx.nil(),
                    Err(code) => ctx.error_value(code),
                };
                ctx.pop_op();
                ctx.push_op(result)?;
            }
            Instruction::MakePair => {
                let car = ctx.get_op(1);
                let cdr = ctx.get_op(0);
                let pair = ctx.make_cons(car, cdr)?;
                ctx.pop_op();
                ctx.pop_op();
                ctx.push_op(pair)?;
            }
            Instruction::RestoreVar(name) => {
                let result = ctx.pop_op();
                let previous = ctx.pop_op();
                if ctx.is_error(previous) {
                    ctx.globals.remove(name);
                } else {
                    ctx.globals.set(name, previous)?;
                }
                ctx.push_op(result)?;
            }
        }
    }
}

fn push_integer(ctx: &mut Context, value: i32) -> Result<()> {
    let integer = ctx.make_integer(value)?;
    ctx.push_op(integer)
}

fn load_var(ctx: &mut Context, name: u16) -> Result<Handle> {
    let symbol = Symbol::Interned(name);

    match ctx.resolve_symbol(symbol)? {
        Some(value) => Ok(value),
        None => {
            let context = ctx.make_symbol_from(symbol)?;
            Ok(ctx.make_error(ErrorCode::UndefinedVariable, context))
        }
    }
}

/// The callee sits above its arguments. It is off the stack during the call, so it is protected
/// instead.
fn call(ctx: &mut Context, argc: u8) {
    let function = ctx.pop_op();
    let root = ctx.protect(function);
    ctx.funcall(function, argc);
    ctx.release(root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler;
    use crate::config::Config;

    fn assemble(ctx: &mut Context, instructions: &[Instruction]) -> Handle {
        let mut code = Vec::new();
        for instruction in instructions {
            instruction.encode(&mut code);
        }
        compiler::install(ctx, &code).unwrap()
    }

    fn run(ctx: &mut Context, function: Handle) -> String {
        ctx.push_op(function).unwrap();
        ctx.funcall(function, 0);
        let result = ctx.pop_op();
        ctx.pop_op();
        ctx.display(result).to_string()
    }

    #[test]
    fn small_jumps_are_relative_to_the_function() {
        let mut ctx = crate::init(Config::default()).unwrap();

        // Pad the buffer so the function does not start at zero.
        assemble(&mut ctx, &[Instruction::PushNil, Instruction::Ret]);

        let function = assemble(
            &mut ctx,
            &[
                Instruction::Push0,
                Instruction::JumpSmallIfFalse(5),
                Instruction::Push1,
                Instruction::Ret,
                Instruction::Push2,
                Instruction::Dup,
                Instruction::Pop,
                Instruction::JumpSmall(11),
                Instruction::Fatal,
                Instruction::Ret,
            ],
        );

        assert_eq!(run(&mut ctx, function), "2");
    }

    #[test]
    fn long_conditional_jumps_pop_the_condition() {
        let mut ctx = crate::init(Config::default()).unwrap();

        let taken = assemble(
            &mut ctx,
            &[
                Instruction::PushNil,
                Instruction::JumpIfFalse(6),
                Instruction::Push1,
                Instruction::Ret,
                Instruction::Push2,
                Instruction::Ret,
            ],
        );
        assert_eq!(run(&mut ctx, taken), "2");
        assert_eq!(ctx.stack_depth(), 0);

        let skipped = assemble(
            &mut ctx,
            &[
                Instruction::PushSmallInteger(-3),
                Instruction::JumpIfFalse(7),
                Instruction::Push1,
                Instruction::Ret,
                Instruction::Push2,
                Instruction::Ret,
            ],
        );
        assert_eq!(run(&mut ctx, skipped), "1");
        assert_eq!(ctx.stack_depth(), 0);
    }

    #[test]
    fn make_pair_conses_the_top_two() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = assemble(
            &mut ctx,
            &[
                Instruction::Push2,
                Instruction::PushNil,
                Instruction::PushList(1),
                Instruction::Push1,
                Instruction::MakePair,
                Instruction::Ret,
            ],
        );

        assert_eq!(run(&mut ctx, function), "((2) . 1)");
    }

    #[test]
    fn restore_var_puts_back_or_unbinds() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let kept = ctx.symbols.intern("kept").unwrap();
        let fresh = ctx.symbols.intern("fresh").unwrap();

        let function = assemble(
            &mut ctx,
            &[
                Instruction::Push1,
                Instruction::SetVar(kept),
                Instruction::Pop,
                Instruction::LoadVar(kept),
                Instruction::LoadVar(fresh),
                Instruction::Push2,
                Instruction::SetVar(fresh),
                Instruction::Pop,
                Instruction::Push0,
                Instruction::RestoreVar(fresh),
                Instruction::RestoreVar(kept),
                Instruction::Ret,
            ],
        );

        assert_eq!(run(&mut ctx, function), "0");
        assert_eq!(ctx.globals.get(fresh), None);
        assert!(ctx.globals.get(kept).is_some());
    }

    #[test]
    fn fatal_halts_with_an_error() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = assemble(&mut ctx, &[Instruction::Push1, Instruction::Fatal]);

        assert_eq!(run(&mut ctx, function), "[ERR: Invalid bytecode : nil]");
        assert_eq!(ctx.stack_depth(), 0);
    }

    #[test]
    fn unknown_opcodes_halt_with_an_error() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = compiler::install(&mut ctx, &[6, 200]).unwrap();

        assert_eq!(run(&mut ctx, function), "[ERR: Invalid bytecode : nil]");
    }

    #[test]
    fn push_list_keeps_element_order() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let function = assemble(
            &mut ctx,
            &[
                Instruction::Push1,
                Instruction::Push2,
                Instruction::PushSmallInteger(3),
                Instruction::PushList(3),
                Instruction::Ret,
            ],
        );

        assert_eq!(run(&mut ctx, function), "(1 2 3)");
    }

    #[test]
    fn undefined_variables_load_as_errors() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let name = ctx.symbols.intern("nowhere").unwrap();
        let function = assemble(&mut ctx, &[Instruction::LoadVar(name), Instruction::Ret]);

        assert_eq!(
            run(&mut ctx, function),
            "[ERR: Access to undefined variable : nowhere]"
        );
    }
}
