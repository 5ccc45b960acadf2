use std::fmt::{Display, Formatter, Result};

use crate::context::Context;
use crate::value::{Data, Function, Handle};

/// Printable view of a value.
pub struct Printer<'a> {
    ctx: &'a Context,
    value: Handle,
}

impl Context {
    pub fn display(&self, value: Handle) -> Printer<'_> {
        Printer { ctx: self, value }
    }
}

impl Display for Printer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let ctx = self.ctx;

        match ctx.heap.data(self.value) {
            Data::Free { .. } => write!(f, "<free>"),
            Data::Nil => write!(f, "nil"),
            Data::Integer(n) => write!(f, "{n}"),
            Data::Symbol(symbol) => write!(f, "{}", ctx.symbol_text(*symbol)),
            Data::Function(Function::Native { .. }) => write!(f, "<native>"),
            Data::Function(Function::Lisp { .. }) => write!(f, "<lambda>"),
            Data::Function(Function::Bytecode { .. }) => write!(f, "<bytecode>"),
            Data::UserData { kind, .. } => write!(f, "<ud:{}>", kind.0),
            Data::DataBuffer(_) => write!(f, "<sbr>"),
            Data::Error { code, context } => {
                write!(f, "[ERR: {code} : {}]", ctx.display(ctx.heap.decompress(*context)))
            }
            Data::Cons { .. } => {
                write!(f, "(")?;

                let mut cursor = self.value;
                let mut first = true;

                while let Some((car, cdr)) = ctx.as_cons(cursor) {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", ctx.display(car))?;
                    first = false;
                    cursor = cdr;
                }

                if !ctx.is_nil(cursor) {
                    write!(f, " . {}", ctx.display(cursor))?;
                }

                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;
    use crate::error::ErrorCode;

    #[test]
    fn lists_and_pairs() {
        let mut ctx = Context::new(Config::default()).unwrap();

        let one = ctx.make_integer(1).unwrap();
        let two = ctx.make_integer(2).unwrap();
        let nil = ctx.nil();

        let pair = ctx.make_cons(one, two).unwrap();
        assert_eq!(ctx.display(pair).to_string(), "(1 . 2)");

        let tail = ctx.make_cons(two, nil).unwrap();
        let list = ctx.make_cons(one, tail).unwrap();
        assert_eq!(ctx.display(list).to_string(), "(1 2)");
    }

    #[test]
    fn errors_show_their_context() {
        let mut ctx = Context::new(Config::default()).unwrap();

        let symbol = ctx.make_symbol("ghost").unwrap();
        let error = ctx.make_error(ErrorCode::UndefinedVariable, symbol);

        assert_eq!(
            ctx.display(error).to_string(),
            "[ERR: Access to undefined variable : ghost]"
        );
    }
}
