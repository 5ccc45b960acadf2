use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::macros::{expect_integer, expect_op};
use crate::value::{Handle, Tag};

/// cons : a -> list a -> list a
pub fn cons(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let (car, cdr) = (ctx.get_op(1), ctx.get_op(0));
    ctx.make_cons(car, cdr)
}

/// car : list a -> a
pub fn car(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let list = expect_op!(ctx, 0, Cons);
    Ok(ctx.car(list))
}

/// cdr : list a -> list a
pub fn cdr(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let list = expect_op!(ctx, 0, Cons);
    Ok(ctx.cdr(list))
}

/// list : a... -> list a
pub fn list(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let argc = argc as usize;
    ctx.build_list(argc, |ctx, index| Ok(ctx.get_op(argc - 1 - index)))
}

/// length : list a -> int
pub fn length(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let list = ctx.get_op(0);

    let length = match ctx.tag(list) {
        Tag::Nil => 0,
        Tag::Cons => ctx.length(list).ok_or(ErrorCode::WrongArgumentType)?,
        _ => return Err(ErrorCode::WrongArgumentType),
    };

    ctx.make_integer(length as i32)
}

/// get : list a -> int -> a
pub fn get(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let list = expect_op!(ctx, 1, Cons);
    let index = expect_integer!(ctx, 0);

    match usize::try_from(index) {
        Ok(index) => Ok(ctx.list_get(list, index)),
        Err(_) => Ok(ctx.nil()),
    }
}

/// reverse : list a -> list a
pub fn reverse(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let list = expect_op!(ctx, 0, Cons);
    let items = ctx.list_items(list).collect::<Vec<_>>();

    // Elements stay reachable through the argument.
    ctx.build_list(items.len(), |_, index| Ok(items[items.len() - 1 - index]))
}

/// Pushes the elements of a proper list, returning how many there were.
fn spread(ctx: &mut Context, list: Handle) -> Result<u8> {
    let length = ctx.length(list).ok_or(ErrorCode::WrongArgumentType)?;
    let count = u8::try_from(length).map_err(|_| ErrorCode::WrongArgc)?;

    for item in ctx.list_items(list).collect::<Vec<_>>() {
        ctx.push_op(item)?;
    }

    Ok(count)
}

/// apply : (a... -> b) -> list a -> b
///
/// An empty argument list calls the function with no arguments.
pub fn apply(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let function = expect_op!(ctx, 1, Function);
    let arguments = ctx.get_op(0);

    let count = match ctx.tag(arguments) {
        Tag::Nil => 0,
        Tag::Cons => spread(ctx, arguments)?,
        _ => return Err(ErrorCode::WrongArgumentType),
    };

    ctx.funcall(function, count);
    Ok(ctx.pop_op())
}

/// map : (a... -> b) -> list a... -> list b
///
/// Lists are walked in step and must have the same length.
pub fn map(ctx: &mut Context, argc: u8) -> Result<Handle> {
    if argc < 2 {
        return Err(ErrorCode::WrongArgc);
    }

    let inputs = argc as usize - 1;
    let function = expect_op!(ctx, inputs, Function);

    let mut lists = Vec::with_capacity(inputs);
    for offset in (0..inputs).rev() {
        let list = expect_op!(ctx, offset, Cons);
        let items = ctx.list_items(list).collect::<Vec<_>>();
        if ctx.length(list) != Some(items.len()) {
            return Err(ErrorCode::WrongArgumentType);
        }
        lists.push(items);
    }

    let length = lists[0].len();
    if lists.iter().any(|items| items.len() != length) {
        return Err(ErrorCode::WrongArgumentType);
    }

    // Results accumulate on the stack until the list is built.
    for index in 0..length {
        for items in &lists {
            ctx.push_op(items[index])?;
        }
        ctx.funcall(function, inputs as u8);
    }

    ctx.list_from_stack(length)
}

/// filter : (a -> bool) -> list a -> list a
pub fn filter(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let function = expect_op!(ctx, 1, Function);
    let list = expect_op!(ctx, 0, Cons);

    let mut kept = 0;
    for item in ctx.list_items(list).collect::<Vec<_>>() {
        ctx.push_op(item)?;
        ctx.funcall(function, 1);

        let verdict = ctx.pop_op();
        if ctx.is_error(verdict) {
            return Ok(verdict);
        }
        if ctx.is_true(verdict) {
            ctx.push_op(item)?;
            kept += 1;
        }
    }

    ctx.list_from_stack(kept)
}

/// select : list a -> list bool -> list a
///
/// Items whose flag is true. Lists of different lengths select nothing.
pub fn select(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let input = expect_op!(ctx, 1, Cons);
    let flags = expect_op!(ctx, 0, Cons);

    match (ctx.length(input), ctx.length(flags)) {
        (Some(items), Some(count)) if items == count => {}
        _ => return Ok(ctx.nil()),
    }

    let chosen = ctx
        .list_items(input)
        .zip(ctx.list_items(flags))
        .filter(|&(_, flag)| ctx.is_true(flag))
        .map(|(item, _)| item)
        .collect::<Vec<_>>();

    for &item in &chosen {
        ctx.push_op(item)?;
    }

    ctx.list_from_stack(chosen.len())
}

/// range : int -> int -> int? -> list int
///
/// Counts from the start up to, and excluding, the end. A negative step counts down.
pub fn range(ctx: &mut Context, argc: u8) -> Result<Handle> {
    let (start, end, step) = match argc {
        2 => (expect_integer!(ctx, 1), expect_integer!(ctx, 0), 1),
        3 => (
            expect_integer!(ctx, 2),
            expect_integer!(ctx, 1),
            expect_integer!(ctx, 0),
        ),
        _ => return Err(ErrorCode::WrongArgc),
    };

    let (start, end, step) = (start as i64, end as i64, step as i64);

    let count = match step {
        0 => 0,
        step if step > 0 && end > start => (end - start + step - 1) / step,
        step if step < 0 && end < start => (start - end - step - 1) / -step,
        _ => 0,
    };

    ctx.build_list(count as usize, |ctx, index| {
        ctx.make_integer((start + index as i64 * step) as i32)
    })
}

/// fill : int -> a -> list a
pub fn fill(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let count = expect_integer!(ctx, 1).max(0) as usize;
    let value = ctx.get_op(0);

    let list = ctx.make_list(count)?;
    for index in 0..count {
        ctx.list_set(list, index, value);
    }

    Ok(list)
}

/// gen : int -> (int -> a) -> list a
pub fn gen(ctx: &mut Context, _argc: u8) -> Result<Handle> {
    let count = expect_integer!(ctx, 1).max(0) as usize;
    let function = expect_op!(ctx, 0, Function);

    for index in 0..count {
        let index = ctx.make_integer(index as i32)?;
        ctx.push_op(index)?;
        ctx.funcall(function, 1);
    }

    ctx.list_from_stack(count)
}
