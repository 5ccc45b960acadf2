//! The two ways of running source text. Both share the operand stack, the globals and
//! [Context::funcall], and must produce the same values for the same program.

use miette::SourceSpan;

use crate::compiler;
use crate::context::Context;
use crate::eval;
use crate::reader::{self, Cursor};

pub trait Engine {
    fn name(&self) -> &'static str;

    /// Evaluates the first form of `source`, leaving exactly one value on the operand stack.
    /// Returns the number of bytes consumed.
    fn eval(&mut self, ctx: &mut Context, source: &str) -> usize;

    /// Evaluates every form of `source` in order, leaving the value of the last one on the
    /// operand stack. Stops at the first form whose value is an error, leaving that error and
    /// returning where the form is.
    fn run(&mut self, ctx: &mut Context, source: &str) -> Result<(), SourceSpan> {
        let mut offset = 0;
        let mut evaluated = false;

        loop {
            let mut cursor = Cursor::new(&source[offset..]);
            cursor.skip_blank();
            if cursor.at_end() {
                break;
            }

            let start = offset + cursor.position();
            if evaluated {
                ctx.pop_op();
            }

            let used = self.eval(ctx, &source[start..]);
            evaluated = true;

            if ctx.is_error(ctx.get_op(0)) {
                return Err(SourceSpan::from((start, used)));
            }

            if used == 0 {
                break;
            }
            offset = start + used;
        }

        if !evaluated {
            let nil = ctx.nil();
            ctx.stack.land(nil);
        }

        Ok(())
    }
}

/// Evaluates straight off the source text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeWalker;

impl Engine for TreeWalker {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn eval(&mut self, ctx: &mut Context, source: &str) -> usize {
        eval::eval(ctx, source)
    }
}

/// Reads each form, compiles it into a function of no arguments and calls it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bytecode;

impl Engine for Bytecode {
    fn name(&self) -> &'static str {
        "bytecode"
    }

    fn eval(&mut self, ctx: &mut Context, source: &str) -> usize {
        let used = reader::read(ctx, source);
        let form = ctx.get_op(0);

        if ctx.is_error(form) {
            return used;
        }

        // The form stays on the stack while it is compiled, then gives its slot to the result.
        let result = match compiler::compile(ctx, form) {
            Ok(function) => {
                let root = ctx.protect(function);
                ctx.funcall(function, 0);
                ctx.release(root);
                ctx.pop_op()
            }
            Err(code) => ctx.error_value(code),
        };

        ctx.pop_op();
        ctx.stack.land(result);

        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn run_with(engine: &mut dyn Engine, source: &str) -> (String, Option<(usize, usize)>) {
        let mut ctx = crate::init(Config::default()).unwrap();
        let outcome = engine.run(&mut ctx, source);
        let value = ctx.pop_op();
        assert_eq!(ctx.stack_depth(), 0);

        let span = outcome.err().map(|span| (span.offset(), span.len()));
        (ctx.display(value).to_string(), span)
    }

    fn agree(source: &str) -> String {
        let (tree, tree_span) = run_with(&mut TreeWalker, source);
        let (bytecode, bytecode_span) = run_with(&mut Bytecode, source);

        assert_eq!(tree, bytecode, "engines disagree on {source:?}");
        assert_eq!(tree_span, bytecode_span);
        tree
    }

    #[test]
    fn empty_source_is_nil() {
        assert_eq!(agree(""), "nil");
        assert_eq!(agree("  ; nothing here\n"), "nil");
    }

    #[test]
    fn last_value_wins() {
        assert_eq!(agree("(set x 2) (set y 3) (* x y)"), "6");
    }

    #[test]
    fn functions_and_conditionals() {
        let source = "
            (set fact (lambda (if (< $0 2) 1 (* $0 (fact (- $0 1))))))
            (fact 10)
        ";
        assert_eq!(agree(source), "3628800");
    }

    #[test]
    fn nested_lambdas() {
        let source = "
            (set adder (lambda (lambda (+ $0 100))))
            (set add (adder))
            (map add '(1 2))
        ";
        assert_eq!(agree(source), "(101 102)");
    }

    #[test]
    fn stops_at_the_first_error() {
        let (value, span) = run_with(&mut TreeWalker, "(set a 1)\n(car 5)\n(set a 2)");
        assert_eq!(value, "[ERR: Invalid argument type : nil]");
        assert_eq!(span, Some((10, 7)));

        assert_eq!(agree("(set a 1) (car 5) (set a 2)"), "[ERR: Invalid argument type : nil]");
    }

    #[test]
    fn errors_agree() {
        assert_eq!(agree("(frobnicate 1 2)"), "[ERR: Value not callable : frobnicate]");
        assert_eq!(agree("(+ 1 (set x 2))"), "[ERR: Set used in expression context : nil]");
        assert_eq!(agree("(+ 1 2"), "[ERR: Mismatched parentheses : nil]");
        assert_eq!(agree("(if 1)"), "[ERR: Wrong number of arguments : nil]");
        assert_eq!(agree("(1 2)"), "[ERR: Value not callable : 1]");
    }

    #[test]
    fn limits_agree() {
        let call = format!("(list {})", "1 ".repeat(256));
        assert_eq!(agree(&call), "[ERR: Wrong number of arguments : nil]");
        assert_eq!(agree(&format!("(list {})", "1 ".repeat(255))).len(), 2 + 255 * 2 - 1);

        let nested = format!("{}1{}", "(+ 1 ".repeat(200), ")".repeat(200));
        assert_eq!(agree(&nested), "[ERR: Stack overflow : nil]");
        assert_eq!(agree(&format!("{nested} (+ 1 2)")), "[ERR: Stack overflow : nil]");
    }

    #[test]
    fn operators_are_expressions() {
        assert_eq!(agree("((lambda (+ $0 $1)) 1 2)"), "3");
        assert_eq!(agree("((if nil car cdr) '(1 2))"), "(2)");
    }

    #[test]
    fn long_quoted_lists() {
        let items = (0..300).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(agree(&format!("(length '({items}))")), "300");
        assert_eq!(agree(&format!("(car (reverse '({items})))")), "299");
    }

    #[test]
    fn let_agrees() {
        assert_eq!(agree("(set x 1) (let ((x 10) (y (+ x 5))) (+ x y))"), "25");
        assert_eq!(agree("(set x 1) (let ((x 10)) x) x"), "1");
        assert_eq!(agree("(let ((y 2)) y) (bound 'y)"), "0");
        assert_eq!(agree("(set sq (lambda (let ((n $0)) (* n n)))) (sq 7)"), "49");
        assert_eq!(agree("(let ((a 1)) (set a 2) a)"), "2");
        assert_eq!(agree("(let ((a 1)))"), "nil");
        assert_eq!(agree("(let (a) 1)"), "[ERR: Mismatched parentheses : nil]");
    }

    #[test]
    fn let_binding_that_cannot_be_stored() {
        // One slot left after the builtins.
        let config = Config {
            globals: 38,
            ..Config::default()
        };
        let engines: [&mut dyn Engine; 2] = [&mut TreeWalker, &mut Bytecode];

        for engine in engines {
            let mut ctx = crate::init(config.clone()).unwrap();

            let outcome = engine.run(&mut ctx, "(set a 1) (let ((a 5) (b 2)) b)");
            let value = ctx.pop_op();
            assert!(outcome.is_err());
            assert_eq!(
                ctx.display(value).to_string(),
                "[ERR: No more room in symbol table : nil]"
            );

            engine.run(&mut ctx, "a").unwrap();
            let value = ctx.pop_op();
            assert_eq!(ctx.as_integer(value), Some(1), "{} engine", engine.name());
            assert_eq!(ctx.stack_depth(), 0);
        }
    }
}
