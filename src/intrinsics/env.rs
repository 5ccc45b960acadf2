use crate::bytecode;
use crate::compiler;
use crate::context::Context;
use crate::error::Result;
use crate::eval::{self, Position};
use crate::macros::{boolean, expect_integer, expect_op, expect_symbol};
use crate::value::{Function, Handle, Symbol};

/// arg : int -> a
pub fn arg(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let index = expect_integer!(ctx, 0);

    match usize::try_from(index) {
        Ok(index) => Ok(ctx.argument(index)),
        Err(_) => Ok(ctx.nil()),
    }
}

/// argc : int
pub fn argc(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let count = ctx.current_argc();
    ctx.make_integer(count as i32)
}

/// this : function
pub fn this(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    Ok(ctx.current_this())
}

/// progn : a... -> a
///
/// Arguments are already evaluated in order, so the last one is the result.
pub fn progn(ctx: &mut Context, argc: u8) -> Result<Handle> {
    if argc == 0 {
        return Ok(ctx.nil());
    }
    Ok(ctx.get_op(0))
}

/// bound : symbol -> bool
pub fn bound(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let symbol = expect_symbol!(ctx, 0);

    let bound = match ctx.resolve_symbol(symbol)? {
        Some(value) => !ctx.is_error(value),
        None => false,
    };

    boolean!(ctx, bound)
}

/// unbind : symbol -> nil
pub fn unbind(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let symbol = expect_symbol!(ctx, 0);

    ctx.remove_var(symbol);
    Ok(ctx.nil())
}

/// eval : form -> a
pub fn eval(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let form = ctx.get_op(0);
    eval::eval_form(ctx, form, Position::Statement)?;
    Ok(ctx.pop_op())
}

/// gc : int
///
/// Number of cells reclaimed.
pub fn gc(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let reclaimed = ctx.collect();
    ctx.make_integer(reclaimed as i32)
}

fn push_stat(ctx: &mut Context, name: &'static str, value: usize) -> Result<()> {
    let name = ctx.make_symbol_stable(name)?;
    ctx.push_op(name)?;

    let value = ctx.make_integer(value as i32)?;
    let pair = ctx.make_cons(name, value)?;

    ctx.pop_op();
    ctx.push_op(pair)
}

/// interp-stat : list (symbol . int)
pub fn interp_stat(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let vars = ctx.globals.len();
    let stack = ctx.stack_depth();
    let interned = ctx.symbols.used();
    let free = ctx.heap.capacity() - ctx.heap.live();
    let buffers = ctx.heap.buffers().count();

    push_stat(ctx, "vars", vars)?;
    push_stat(ctx, "stk", stack)?;
    push_stat(ctx, "internb", interned)?;
    push_stat(ctx, "free", free)?;
    push_stat(ctx, "sbr", buffers)?;

    ctx.list_from_stack(5)
}

/// env : list symbol
///
/// Every bound global, in binding order.
pub fn env(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let names = ctx.globals.names().collect::<Vec<_>>();

    for &name in &names {
        let symbol = ctx.make_symbol_from(Symbol::Interned(name))?;
        ctx.push_op(symbol)?;
    }

    ctx.list_from_stack(names.len())
}

/// globals : list (symbol . a)
///
/// Every bound global with its value, in binding order.
pub fn globals(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let bindings = ctx
        .globals
        .names()
        .zip(ctx.globals.values())
        .collect::<Vec<_>>();

    for &(name, value) in &bindings {
        let symbol = ctx.make_symbol_from(Symbol::Interned(name))?;
        ctx.push_op(symbol)?;

        let pair = ctx.make_cons(symbol, value)?;
        ctx.pop_op();
        ctx.push_op(pair)?;
    }

    ctx.list_from_stack(bindings.len())
}

/// compile : function -> function
///
/// Interpreted functions are compiled from their body, any other form is compiled into a
/// function of no arguments. Native and compiled functions are returned unchanged.
pub fn compile(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let value = ctx.get_op(0);

    match ctx.as_function(value) {
        Some(Function::Lisp { .. }) => compiler::compile_function(ctx, value),
        Some(_) => Ok(value),
        None if ctx.is_nil(value) => Ok(value),
        None => compiler::compile(ctx, value),
    }
}

/// disassemble : function -> nil
pub fn disassemble(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let function = expect_op!(ctx, 0, Function);

    if let Some(Function::Bytecode { .. }) = ctx.as_function(function) {
        for line in bytecode::disassemble(ctx, function)?.lines() {
            log::info!("{line}");
        }
    }

    Ok(ctx.nil())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;
    use crate::eval;

    fn run(ctx: &mut Context, source: &str) -> String {
        eval::eval(ctx, source);
        let value = ctx.pop_op();
        assert_eq!(ctx.stack_depth(), 0);
        ctx.display(value).to_string()
    }

    #[test]
    fn arguments_of_the_running_function() {
        let mut ctx = crate::init(Config::default()).unwrap();

        assert_eq!(run(&mut ctx, "(apply (lambda (arg 1)) '(7 8 9))"), "8");
        assert_eq!(run(&mut ctx, "(apply (lambda (argc)) '(7 8 9))"), "3");
        assert_eq!(run(&mut ctx, "(apply (lambda (arg 5)) '(7))"), "nil");
        assert_eq!(run(&mut ctx, "(argc)"), "0");
        assert_eq!(run(&mut ctx, "(this)"), "nil");
    }

    #[test]
    fn progn_returns_the_last_value() {
        let mut ctx = crate::init(Config::default()).unwrap();

        assert_eq!(run(&mut ctx, "(progn 1 2 3)"), "3");
        assert_eq!(run(&mut ctx, "(progn)"), "nil");
    }

    #[test]
    fn binding_and_unbinding() {
        let mut ctx = crate::init(Config::default()).unwrap();

        assert_eq!(run(&mut ctx, "(bound 'x)"), "0");
        run(&mut ctx, "(set x 1)");
        assert_eq!(run(&mut ctx, "(bound 'x)"), "1");
        run(&mut ctx, "(unbind 'x)");
        assert_eq!(run(&mut ctx, "(bound 'x)"), "0");
        assert_eq!(run(&mut ctx, "x"), "[ERR: Access to undefined variable : x]");
    }

    #[test]
    fn eval_runs_data() {
        let mut ctx = crate::init(Config::default()).unwrap();

        assert_eq!(run(&mut ctx, "(eval '(+ 1 2))"), "3");
        assert_eq!(run(&mut ctx, "(eval '(set y 5))"), "nil");
        assert_eq!(run(&mut ctx, "y"), "5");
    }

    #[test]
    fn environment_listing() {
        let mut ctx = crate::init(Config::default()).unwrap();

        let listing = run(&mut ctx, "(env)");
        assert!(listing.starts_with("(cons car cdr"));

        let stats = run(&mut ctx, "(interp-stat)");
        assert!(stats.starts_with("((vars . "));
        assert!(stats.contains("(sbr . 0)"));
    }

    #[test]
    fn globals_pairs_names_with_values() {
        let mut ctx = crate::init(Config::default()).unwrap();

        let listing = run(&mut ctx, "(globals)");
        assert!(listing.starts_with("((cons . <native>) (car . <native>)"));

        run(&mut ctx, "(set hp 3)");
        let listing = run(&mut ctx, "(globals)");
        assert!(listing.ends_with("(hp . 3))"));
        assert_eq!(run(&mut ctx, "(length (globals))"), run(&mut ctx, "(length (env))"));
    }

    #[test]
    fn compiled_functions_behave_like_interpreted_ones() {
        let mut ctx = crate::init(Config::default()).unwrap();

        run(&mut ctx, "(set sq (lambda (* $0 $0)))");
        run(&mut ctx, "(set fast-sq (compile sq))");

        assert_eq!(run(&mut ctx, "fast-sq"), "<bytecode>");
        assert_eq!(run(&mut ctx, "(fast-sq 12)"), "144");
        assert_eq!(run(&mut ctx, "(map fast-sq '(1 2 3))"), "(1 4 9)");
        assert_eq!(run(&mut ctx, "(apply (compile '(+ 40 2)) nil)"), "42");
        assert_eq!(run(&mut ctx, "(compile +)"), "<native>");
    }
}
