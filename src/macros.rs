/// Operand `$offset` of a native call, checked against `$tag`. A `nil` operand makes the native
/// return `nil`, any other mismatch is a `wrong-argument-type` error.
macro_rules! expect_op {
    ($ctx:ident, $offset:expr, $tag:ident) => {{
        let operand = $ctx.get_op($offset);
        match $ctx.tag(operand) {
            $crate::value::Tag::$tag => operand,
            $crate::value::Tag::Nil => return Ok($ctx.nil()),
            _ => return Err($crate::error::ErrorCode::WrongArgumentType),
        }
    }};
}

macro_rules! expect_integer {
    ($ctx:ident, $offset:expr) => {{
        let operand = $crate::macros::expect_op!($ctx, $offset, Integer);
        $ctx.integer(operand)
    }};
}

macro_rules! expect_symbol {
    ($ctx:ident, $offset:expr) => {{
        let operand = $crate::macros::expect_op!($ctx, $offset, Symbol);
        match $ctx.as_symbol(operand) {
            Some(symbol) => symbol,
            None => return Err($crate::error::ErrorCode::WrongArgumentType),
        }
    }};
}

macro_rules! boolean {
    ($ctx:ident, $value:expr) => {
        $ctx.make_integer(if $value { 1 } else { 0 })
    };
}

pub(crate) use boolean;
pub(crate) use expect_integer;
pub(crate) use expect_op;
pub(crate) use expect_symbol;
