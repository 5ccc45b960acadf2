use pocket::{
    Bytecode, Config, Context, Engine, ErrorCode, Handle, ScriptError, TreeWalker,
};

fn context() -> Context {
    pocket::init(Config::default()).unwrap()
}

fn eval_with(ctx: &mut Context, engine: &mut dyn Engine, source: &str) -> String {
    engine.eval(ctx, source);
    let value = ctx.pop_op();
    assert_eq!(ctx.stack_depth(), 0);
    ctx.display(value).to_string()
}

fn eval(source: &str) -> String {
    eval_with(&mut context(), &mut TreeWalker, source)
}

fn double(ctx: &mut Context, _argc: u8) -> pocket::error::Result<Handle> {
    let value = ctx.get_op(0);
    match ctx.as_integer(value) {
        Some(n) => ctx.make_integer(n.wrapping_mul(2)),
        None if ctx.is_nil(value) => Ok(value),
        None => Err(ErrorCode::WrongArgumentType),
    }
}

const SAMPLES: [i32; 9] = [0, 1, -1, 48, -96, 1000, i32::MAX, i32::MIN, 0x7fff];

#[test]
fn scenario() {
    assert_eq!(eval("(+ 2 3)"), "5");
    assert_eq!(eval("(- 48 96)"), "-48");
    assert_eq!(eval("(car (cons 1 2))"), "1");

    let mut ctx = context();
    ctx.register_native("double", 1, double).unwrap();
    assert_eq!(eval_with(&mut ctx, &mut TreeWalker, "(double 48)"), "96");
}

#[test]
fn arithmetic_is_wrapping_i32() {
    let mut ctx = context();

    for a in SAMPLES {
        for b in SAMPLES {
            let sum = eval_with(&mut ctx, &mut TreeWalker, &format!("(+ {a} {b})"));
            let difference = eval_with(&mut ctx, &mut TreeWalker, &format!("(- {a} {b})"));

            assert_eq!(sum, a.wrapping_add(b).to_string());
            assert_eq!(difference, a.wrapping_sub(b).to_string());
        }
    }
}

#[test]
fn cons_round_trip() {
    let mut ctx = context();

    for (a, b) in [("1", "2"), ("'a", "'(b c)"), ("'(1 (2))", "nil")] {
        let car = eval_with(&mut ctx, &mut TreeWalker, &format!("(equal (car (cons {a} {b})) {a})"));
        let cdr = eval_with(&mut ctx, &mut TreeWalker, &format!("(equal (cdr (cons {a} {b})) {b})"));

        assert_eq!(car, "1");
        assert_eq!(cdr, "1");
    }
}

#[test]
fn nil_operands_are_not_errors() {
    let mut ctx = context();
    ctx.register_native("double", 1, double).unwrap();

    assert_eq!(eval_with(&mut ctx, &mut TreeWalker, "(double nil)"), "nil");
    assert_eq!(
        eval_with(&mut ctx, &mut TreeWalker, "(double 'five)"),
        "[ERR: Invalid argument type : nil]"
    );
    assert_eq!(eval_with(&mut ctx, &mut Bytecode, "(double nil)"), "nil");
}

#[test]
fn rebinding_overwrites() {
    let mut ctx = context();

    let value = ctx.dostring("rebind.lisp", "(set hp 3) (set hp 4) hp").unwrap();
    assert_eq!(ctx.as_integer(value), Some(4));

    let first = ctx.make_integer(1).unwrap();
    ctx.set_var("lives", first).unwrap();
    let second = ctx.make_integer(2).unwrap();
    ctx.set_var("lives", second).unwrap();

    assert_eq!(ctx.get_var("lives"), second);
}

#[test]
fn full_global_table_keeps_existing_bindings() {
    let mut ctx = Context::new(Config {
        globals: 2,
        ..Config::default()
    })
    .unwrap();

    ctx.dostring("full.lisp", "(set a 1) (set b 2)").unwrap();

    let error = ctx.dostring("full.lisp", "(set c 3)").unwrap_err();
    assert!(matches!(
        error,
        ScriptError::Failed {
            code: ErrorCode::SymbolTableExhausted,
            ..
        }
    ));

    let value = ctx.dostring("full.lisp", "(set a 10) a").unwrap();
    assert_eq!(ctx.as_integer(value), Some(10));

    let value = ctx.dostring("full.lisp", "b").unwrap();
    assert_eq!(ctx.as_integer(value), Some(2));
}

#[test]
fn compiled_calls_match_interpreted_calls() {
    let functions = ["+", "-", "*", "/", "<", ">", "cons", "list", "equal"];
    let arguments = ["0", "1", "-7", "300", "2147483647", "nil", "'sym", "'(1 2)"];

    let mut tree_ctx = context();
    let mut bytecode_ctx = context();

    for function in functions {
        for a in arguments {
            for b in arguments {
                let source = format!("({function} {a} {b})");

                let tree = eval_with(&mut tree_ctx, &mut TreeWalker, &source);
                let bytecode = eval_with(&mut bytecode_ctx, &mut Bytecode, &source);

                assert_eq!(tree, bytecode, "engines disagree on {source}");
            }
        }
    }
}

#[test]
fn interning_is_canonical() {
    let mut ctx = context();

    let first = ctx.make_symbol("goblin").unwrap();
    let second = ctx.make_symbol("goblin").unwrap();
    let other = ctx.make_symbol("goblins").unwrap();

    assert_eq!(ctx.as_symbol(first), ctx.as_symbol(second));
    assert_ne!(ctx.as_symbol(first), ctx.as_symbol(other));
    assert_ne!(first, second);
}

#[test]
fn stable_symbols_compare_by_name() {
    let mut ctx = context();

    let stable = ctx.make_symbol_stable("heart").unwrap();
    let interned = ctx.make_symbol("heart").unwrap();

    assert!(ctx.equal(stable, interned));
}
