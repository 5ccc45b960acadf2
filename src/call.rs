//! The single calling primitive shared by both evaluators, the builtins and the host.

use crate::context::{Context, Frame};
use crate::error::{ErrorCode, Result};
use crate::value::{Data, Function, Handle};
use crate::{eval, vm};

impl Context {
    /// Calls `function` with the top `argc` operands as arguments. The arguments are popped and
    /// exactly one result is pushed in their place; failures are pushed as error values.
    pub fn funcall(&mut self, function: Handle, argc: u8) {
        let checkpoint = self.checkpoint();
        let available = (argc as usize).min(self.stack.len());

        match self.call(function, argc) {
            Ok(result) => {
                self.stack.truncate(checkpoint.stack_len() - available);
                self.stack.land(result);
            }
            Err(code) => {
                self.unwind(checkpoint);
                let error = self.error_value(code);
                self.stack.truncate(checkpoint.stack_len() - available);
                self.stack.land(error);
            }
        }
    }

    fn call(&mut self, function: Handle, argc: u8) -> Result<Handle> {
        let callable = match *self.heap.data(function) {
            Data::Function(callable) => callable,
            // Calling through an unbound name.
            Data::Error {
                code: ErrorCode::UndefinedVariable,
                context,
            } => {
                let name = self.heap.decompress(context);
                return Ok(self.make_error(ErrorCode::ValueNotCallable, name));
            }
            Data::Error { .. } => return Ok(function),
            _ => return Ok(self.make_error(ErrorCode::ValueNotCallable, function)),
        };

        let required = match callable {
            Function::Native { arity, .. } => arity.required(),
            _ => 0,
        };

        if argc.max(required) as usize > self.stack.len() {
            return Ok(self.make_error(ErrorCode::TooFewArguments, function));
        }

        if let Function::Native { arity, .. } = callable {
            if !arity.accepts(argc) {
                return Ok(self.make_error(ErrorCode::WrongArgc, function));
            }
        }

        // An error passed as an argument is the result of the call.
        for offset in (0..argc as usize).rev() {
            let argument = self.get_op(offset);
            if self.is_error(argument) {
                return Ok(argument);
            }
        }

        match callable {
            Function::Native { call, .. } => call(self, argc),
            Function::Lisp { body } => {
                let body = self.heap.decompress(body);
                self.in_frame(function, argc, |ctx| eval::eval_body(ctx, body))
            }
            Function::Bytecode { buffer, offset } => {
                let buffer = self.heap.decompress(buffer);
                self.in_frame(function, argc, |ctx| vm::execute(ctx, buffer, offset))
            }
        }
    }

    fn in_frame<F>(&mut self, function: Handle, argc: u8, body: F) -> Result<Handle>
    where
        F: FnOnce(&mut Context) -> Result<Handle>,
    {
        self.enter()?;
        self.frames.push(Frame {
            this: function,
            base: self.stack.len() - argc as usize,
            argc,
        });

        let result = body(self);

        self.frames.pop();
        self.leave();

        result
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;
    use crate::error::{ErrorCode, Result};
    use crate::value::{Arity, Handle};

    fn double(ctx: &mut Context, _argc: u8) -> Result<Handle> {
        let value = ctx.integer(ctx.get_op(0));
        ctx.make_integer(value * 2)
    }

    fn context() -> Context {
        Context::new(Config::default()).unwrap()
    }

    #[test]
    fn pops_arguments_and_pushes_the_result() {
        let mut ctx = context();
        let function = ctx.make_native(Arity::Exactly(1), double).unwrap();

        let keep = ctx.make_integer(7).unwrap();
        ctx.push_op(keep).unwrap();
        let argument = ctx.make_integer(48).unwrap();
        ctx.push_op(argument).unwrap();

        ctx.funcall(function, 1);

        assert_eq!(ctx.stack_depth(), 2);
        assert_eq!(ctx.as_integer(ctx.get_op(0)), Some(96));
        assert_eq!(ctx.get_op(1), keep);
    }

    #[test]
    fn too_few_arguments_on_the_stack() {
        let mut ctx = context();
        let function = ctx.make_native(Arity::Exactly(1), double).unwrap();

        ctx.funcall(function, 1);

        let result = ctx.pop_op();
        assert_eq!(ctx.as_error(result).unwrap().0, ErrorCode::TooFewArguments);
        assert_eq!(ctx.stack_depth(), 0);
    }

    #[test]
    fn wrong_argc_for_a_fixed_arity() {
        let mut ctx = context();
        let function = ctx.make_native(Arity::Exactly(1), double).unwrap();

        for n in 0..2 {
            let value = ctx.make_integer(n).unwrap();
            ctx.push_op(value).unwrap();
        }

        ctx.funcall(function, 2);

        let result = ctx.pop_op();
        assert_eq!(ctx.as_error(result).unwrap().0, ErrorCode::WrongArgc);
        assert_eq!(ctx.stack_depth(), 0);
    }

    #[test]
    fn calling_a_non_function() {
        let mut ctx = context();
        let value = ctx.make_integer(3).unwrap();

        ctx.funcall(value, 0);

        let result = ctx.pop_op();
        let (code, context) = ctx.as_error(result).unwrap();
        assert_eq!(code, ErrorCode::ValueNotCallable);
        assert_eq!(context, value);
    }

    #[test]
    fn error_arguments_short_circuit() {
        let mut ctx = context();
        let function = ctx.make_native(Arity::Exactly(1), double).unwrap();
        let error = ctx.error_value(ErrorCode::WrongArgumentType);

        ctx.push_op(error).unwrap();
        ctx.funcall(function, 1);

        assert_eq!(ctx.pop_op(), error);
    }
}
