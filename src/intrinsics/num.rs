use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::macros::{boolean, expect_integer};
use crate::value::Handle;

/// + : int... -> int
pub fn add(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let mut result = 0i32;

    for offset in 0..argc as usize {
        result = result.wrapping_add(expect_integer!(ctx, offset));
    }

    ctx.make_integer(result)
}

/// - : int -> int -> int
pub fn sub(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let left = expect_integer!(ctx, 1);
    let right = expect_integer!(ctx, 0);

    ctx.make_integer(left.wrapping_sub(right))
}

/// * : int... -> int
pub fn mul(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let mut result = 1i32;

    for offset in 0..argc as usize {
        result = result.wrapping_mul(expect_integer!(ctx, offset));
    }

    ctx.make_integer(result)
}

/// / : int -> int -> int
pub fn div(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let left = expect_integer!(ctx, 1);
    let right = expect_integer!(ctx, 0);

    if right == 0 {
        return Err(ErrorCode::WrongArgumentType);
    }

    ctx.make_integer(left.wrapping_div(right))
}

/// < : int -> int -> bool
pub fn less(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let left = expect_integer!(ctx, 1);
    let right = expect_integer!(ctx, 0);

    boolean!(ctx, left < right)
}

/// > : int -> int -> bool
pub fn greater(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let left = expect_integer!(ctx, 1);
    let right = expect_integer!(ctx, 0);

    boolean!(ctx, left > right)
}

/// not : a -> bool
pub fn not(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let value = ctx.get_op(0);
    boolean!(ctx, !ctx.is_true(value))
}

/// equal : a -> b -> bool
pub fn equal(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let (left, right) = (ctx.get_op(1), ctx.get_op(0));
    boolean!(ctx, ctx.equal(left, right))
}

/// any-true : a... -> a
///
/// The first true argument, in source order.
pub fn any_true(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let found = (0..argc as usize)
        .rev()
        .map(|offset| ctx.get_op(offset))
        .find(|&value| ctx.is_true(value));

    Ok(found.unwrap_or(ctx.nil()))
}

/// all-true : a... -> bool
pub fn all_true(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let all = (0..argc as usize).all(|offset| ctx.is_true(ctx.get_op(offset)));

    if all {
        ctx.make_integer(1)
    } else {
        Ok(ctx.nil())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::eval;

    fn run(source: &str) -> String {
        let mut ctx = crate::init(Config::default()).unwrap();
        eval::eval(&mut ctx, source);
        let value = ctx.pop_op();
        ctx.display(value).to_string()
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(run("(+ 2147483647 1)"), "-2147483648");
        assert_eq!(run("(* 65536 65536)"), "0");
        assert_eq!(run("(+)"), "0");
        assert_eq!(run("(*)"), "1");
    }

    #[test]
    fn division() {
        assert_eq!(run("(/ 7 2)"), "3");
        assert_eq!(run("(/ -7 2)"), "-3");
        assert_eq!(run("(/ 1 0)"), "[ERR: Invalid argument type : nil]");
    }

    #[test]
    fn nil_operands_are_lenient() {
        assert_eq!(run("(+ 1 nil)"), "nil");
        assert_eq!(run("(- 1 'a)"), "[ERR: Invalid argument type : nil]");
    }

    #[test]
    fn comparisons_are_integers() {
        assert_eq!(run("(< 1 2)"), "1");
        assert_eq!(run("(> 1 2)"), "0");
        assert_eq!(run("(not 0)"), "1");
        assert_eq!(run("(not nil)"), "1");
        assert_eq!(run("(not 5)"), "0");
        assert_eq!(run("(equal '(1 (2)) (list 1 (list 2)))"), "1");
        assert_eq!(run("(equal 'a 'b)"), "0");
    }

    #[test]
    fn any_and_all() {
        assert_eq!(run("(any-true 0 nil 7 8)"), "7");
        assert_eq!(run("(any-true 0 nil)"), "nil");
        assert_eq!(run("(all-true 1 2 3)"), "1");
        assert_eq!(run("(all-true 1 0 3)"), "nil");
    }
}
