//! Tree walking evaluation. [eval] evaluates straight off the source text, pushing each argument
//! as soon as it is scanned, without building the form first. [eval_value] evaluates heap data,
//! which is how lambda bodies and the `eval` builtin run.

use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::reader::{self, Atom, Cursor};
use crate::value::{Data, Handle, Symbol};

/// Where a form appears. `set` is a statement and is rejected inside expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Statement,
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Special {
    If,
    Lambda,
    Let,
    Quote,
    Set,
}

impl Special {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Special::If),
            "lambda" => Some(Special::Lambda),
            "let" => Some(Special::Let),
            "quote" => Some(Special::Quote),
            "set" => Some(Special::Set),
            _ => None,
        }
    }
}

/// Evaluates one top-level form of `source` and pushes its value. Returns the number of bytes
/// consumed.
pub fn eval(ctx: &mut Context, source: &str) -> usize {
    let checkpoint = ctx.checkpoint();
    let mut cursor = Cursor::new(source);

    cursor.skip_blank();

    let result = if cursor.at_end() {
        let nil = ctx.nil();
        ctx.push_op(nil)
    } else {
        eval_source(ctx, &mut cursor, Position::Statement)
    };

    if let Err(code) = result {
        ctx.fail(checkpoint, code);

        // A well formed form is consumed whole even when evaluating it failed halfway.
        let mut form = Cursor::new(source);
        form.skip_blank();
        if form.skip_datum().is_ok() {
            return form.position();
        }
    }

    cursor.position()
}

fn eval_source(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    ctx.enter()?;
    let result = eval_text(ctx, cursor, position);
    ctx.leave();
    result
}

fn eval_text(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    cursor.skip_blank();

    match cursor.peek() {
        None | Some(b')') => Err(ErrorCode::MismatchedParentheses),
        Some(b'\'') => {
            cursor.advance();
            reader::read_datum(ctx, cursor)
        }
        Some(b'(') => {
            cursor.advance();
            eval_application(ctx, cursor, position)
        }
        Some(_) => {
            let value = match Atom::classify(cursor.token()) {
                Atom::Integer(value) => ctx.make_integer(value)?,
                Atom::Nil => ctx.nil(),
                Atom::Name(name) => ctx.get_var(name),
            };
            ctx.push_op(value)
        }
    }
}

fn eval_application(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    cursor.skip_blank();

    match cursor.peek() {
        None => return Err(ErrorCode::MismatchedParentheses),
        Some(b')') => {
            cursor.advance();
            let nil = ctx.nil();
            return ctx.push_op(nil);
        }
        Some(_) => {}
    }

    let mut head = cursor.clone();
    if let Atom::Name(name) = Atom::classify(head.token()) {
        if let Some(special) = Special::from_name(name) {
            *cursor = head;
            return match special {
                Special::If => eval_if(ctx, cursor, position),
                Special::Lambda => eval_lambda(ctx, cursor),
                Special::Let => eval_let(ctx, cursor, position),
                Special::Quote => {
                    operand(cursor)?;
                    reader::read_datum(ctx, cursor)?;
                    cursor.close()
                }
                Special::Set => eval_set(ctx, cursor, position),
            };
        }
    }

    // Any expression may name the function.
    eval_source(ctx, cursor, Position::Expression)?;
    let function = ctx.get_op(0);

    let mut argc = 0u8;

    loop {
        cursor.skip_blank();

        match cursor.peek() {
            None => return Err(ErrorCode::MismatchedParentheses),
            Some(b')') => {
                cursor.advance();
                break;
            }
            Some(_) => {
                if argc == u8::MAX {
                    return Err(ErrorCode::WrongArgc);
                }
                eval_source(ctx, cursor, Position::Expression)?;
                argc += 1;
            }
        }
    }

    ctx.funcall(function, argc);

    let result = ctx.pop_op();
    ctx.pop_op();
    ctx.push_op(result)
}

/// Fails when the form closes before its next operand.
fn operand(cursor: &mut Cursor) -> Result<()> {
    cursor.skip_blank();
    match cursor.peek() {
        Some(b')') => Err(ErrorCode::WrongArgc),
        _ => Ok(()),
    }
}

/// `(if condition then else)`, skipping the branch that is not taken.
fn eval_if(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    operand(cursor)?;
    eval_source(ctx, cursor, Position::Expression)?;
    let condition = ctx.pop_op();

    operand(cursor)?;

    if ctx.is_true(condition) {
        eval_source(ctx, cursor, position)?;
        cursor.skip_blank();
        if cursor.peek() != Some(b')') {
            cursor.skip_datum()?;
        }
    } else {
        cursor.skip_datum()?;
        cursor.skip_blank();
        if cursor.peek() == Some(b')') {
            let nil = ctx.nil();
            ctx.push_op(nil)?;
        } else {
            eval_source(ctx, cursor, position)?;
        }
    }

    cursor.close()
}

/// `(lambda body...)`: the body is read, not evaluated.
fn eval_lambda(ctx: &mut Context, cursor: &mut Cursor) -> Result<()> {
    let count = read_rest(ctx, cursor)?;
    let body = ctx.list_from_stack(count)?;
    let function = ctx.make_lisp_function(body)?;
    ctx.push_op(function)
}

/// `let` is read whole and run from the data.
fn eval_let(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    let count = read_rest(ctx, cursor)?;
    let rest = ctx.list_from_stack(count)?;
    ctx.push_op(rest)?;

    eval_let_form(ctx, rest, position)?;

    let result = ctx.pop_op();
    ctx.pop_op();
    ctx.push_op(result)
}

/// Pushes the remaining data of a form up to its `)`, returning how many there were.
fn read_rest(ctx: &mut Context, cursor: &mut Cursor) -> Result<usize> {
    let mut count = 0;

    loop {
        cursor.skip_blank();

        match cursor.peek() {
            None => return Err(ErrorCode::MismatchedParentheses),
            Some(b')') => {
                cursor.advance();
                break;
            }
            Some(_) => {
                reader::read_datum(ctx, cursor)?;
                count += 1;
            }
        }
    }

    Ok(count)
}

/// `(set name value)`. The name may be quoted.
fn eval_set(ctx: &mut Context, cursor: &mut Cursor, position: Position) -> Result<()> {
    if position == Position::Expression {
        return Err(ErrorCode::SetInExpressionContext);
    }

    operand(cursor)?;
    if cursor.peek() == Some(b'\'') {
        cursor.advance();
    }

    let name = match Atom::classify(cursor.token()) {
        Atom::Name(name) if !name.is_empty() => name,
        _ => return Err(ErrorCode::WrongArgumentType),
    };

    operand(cursor)?;
    eval_source(ctx, cursor, Position::Expression)?;
    cursor.close()?;

    let value = ctx.get_op(0);
    let result = match ctx.set_var(name, value) {
        Ok(()) => ctx.nil(),
        Err(code) => ctx.error_value(code),
    };

    ctx.pop_op();
    ctx.push_op(result)
}

/// Evaluates a heap form and pushes its value.
pub fn eval_value(ctx: &mut Context, form: Handle) {
    let checkpoint = ctx.checkpoint();

    if let Err(code) = eval_form(ctx, form, Position::Statement) {
        ctx.fail(checkpoint, code);
    }
}

pub(crate) fn eval_form(ctx: &mut Context, form: Handle, position: Position) -> Result<()> {
    ctx.enter()?;
    let result = eval_data(ctx, form, position);
    ctx.leave();
    result
}

fn eval_data(ctx: &mut Context, form: Handle, position: Position) -> Result<()> {
    match *ctx.heap.data(form) {
        Data::Symbol(symbol) => {
            let value = match ctx.resolve_symbol(symbol)? {
                Some(value) => value,
                None => ctx.make_error(ErrorCode::UndefinedVariable, form),
            };
            ctx.push_op(value)
        }
        Data::Cons { car, cdr } => {
            let head = ctx.heap.decompress(car);
            let rest = ctx.heap.decompress(cdr);
            apply_form(ctx, head, rest, position)
        }
        _ => ctx.push_op(form),
    }
}

fn apply_form(ctx: &mut Context, head: Handle, rest: Handle, position: Position) -> Result<()> {
    let special = ctx
        .as_symbol(head)
        .and_then(|symbol| Special::from_name(ctx.symbol_text(symbol)));

    match special {
        Some(Special::If) => return eval_if_form(ctx, rest, position),
        Some(Special::Lambda) => {
            let function = ctx.make_lisp_function(rest)?;
            return ctx.push_op(function);
        }
        Some(Special::Let) => return eval_let_form(ctx, rest, position),
        Some(Special::Quote) => {
            let datum = single_operand(ctx, rest)?;
            return ctx.push_op(datum);
        }
        Some(Special::Set) => return eval_set_form(ctx, rest, position),
        None => {}
    }

    eval_form(ctx, head, Position::Expression)?;
    let function = ctx.get_op(0);

    let mut argc = 0u8;
    let mut arguments = rest;

    loop {
        match *ctx.heap.data(arguments) {
            Data::Nil => break,
            Data::Cons { car, cdr } => {
                if argc == u8::MAX {
                    return Err(ErrorCode::WrongArgc);
                }
                let argument = ctx.heap.decompress(car);
                eval_form(ctx, argument, Position::Expression)?;
                argc += 1;
                arguments = ctx.heap.decompress(cdr);
            }
            _ => return Err(ErrorCode::NotCallable),
        }
    }

    ctx.funcall(function, argc);

    let result = ctx.pop_op();
    ctx.pop_op();
    ctx.push_op(result)
}

/// Operands of a special form, checking it has between `min` and `max` of them.
pub(crate) fn operands(
    ctx: &Context,
    rest: Handle,
    min: usize,
    max: usize,
) -> Result<Vec<Handle>> {
    match ctx.length(rest) {
        Some(length) if (min..=max).contains(&length) => Ok(ctx.list_items(rest).collect()),
        Some(_) => Err(ErrorCode::WrongArgc),
        None => Err(ErrorCode::NotCallable),
    }
}

fn single_operand(ctx: &Context, rest: Handle) -> Result<Handle> {
    Ok(operands(ctx, rest, 1, 1)?[0])
}

fn eval_if_form(ctx: &mut Context, rest: Handle, position: Position) -> Result<()> {
    let forms = operands(ctx, rest, 2, 3)?;

    eval_form(ctx, forms[0], Position::Expression)?;
    let condition = ctx.pop_op();

    if ctx.is_true(condition) {
        eval_form(ctx, forms[1], position)
    } else if let Some(&otherwise) = forms.get(2) {
        eval_form(ctx, otherwise, position)
    } else {
        let nil = ctx.nil();
        ctx.push_op(nil)
    }
}

/// Name operand of `set`: a symbol, possibly quoted.
pub(crate) fn set_target(ctx: &Context, name: Handle) -> Result<Symbol> {
    if let Some(symbol) = ctx.as_symbol(name) {
        return Ok(symbol);
    }

    let quoted = ctx
        .as_cons(name)
        .filter(|(head, _)| {
            ctx.as_symbol(*head)
                .map_or(false, |symbol| ctx.symbol_text(symbol) == "quote")
        })
        .and_then(|(_, rest)| ctx.as_cons(rest))
        .and_then(|(datum, _)| ctx.as_symbol(datum));

    quoted.ok_or(ErrorCode::WrongArgumentType)
}

fn eval_set_form(ctx: &mut Context, rest: Handle, position: Position) -> Result<()> {
    if position == Position::Expression {
        return Err(ErrorCode::SetInExpressionContext);
    }

    let forms = operands(ctx, rest, 2, 2)?;
    let symbol = set_target(ctx, forms[0])?;

    eval_form(ctx, forms[1], Position::Expression)?;

    let value = ctx.get_op(0);
    let result = match ctx.set_var_symbol(symbol, value) {
        Ok(()) => ctx.nil(),
        Err(code) => ctx.error_value(code),
    };

    ctx.pop_op();
    ctx.push_op(result)
}

/// Splits `((name value)...) body...`. Anything else is unbalanced.
pub(crate) fn let_parts(ctx: &Context, rest: Handle) -> Result<(Vec<(Symbol, Handle)>, Handle)> {
    let (bindings, body) = ctx
        .as_cons(rest)
        .ok_or(ErrorCode::MismatchedParentheses)?;

    if ctx.length(bindings).is_none() || ctx.length(body).is_none() {
        return Err(ErrorCode::MismatchedParentheses);
    }

    let bindings = ctx
        .list_items(bindings)
        .map(|binding| {
            let parts = operands(ctx, binding, 2, 2).map_err(|_| ErrorCode::MismatchedParentheses)?;
            ctx.as_symbol(parts[0])
                .map(|symbol| (symbol, parts[1]))
                .ok_or(ErrorCode::MismatchedParentheses)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((bindings, body))
}

/// `(let ((name value)...) body...)`. Each binding is made in turn as a global, so later values
/// see earlier names. Once the body is done every name gets its old value back, and a name that
/// was unbound is removed again. A binding that cannot be stored becomes the value of the form.
fn eval_let_form(ctx: &mut Context, rest: Handle, position: Position) -> Result<()> {
    let (bindings, body) = let_parts(ctx, rest)?;
    let base = ctx.stack.len();
    let mut stashed = 0;

    let outcome = bind_and_run(ctx, &bindings, body, position, &mut stashed);
    if outcome.is_err() {
        ctx.stack.truncate(base + stashed);
    }

    for (index, &(symbol, _)) in bindings.iter().enumerate().take(stashed).rev() {
        let previous = ctx.stack.get(base + index).unwrap_or(ctx.nil());
        if ctx.is_error(previous) {
            ctx.remove_var(symbol);
        } else {
            ctx.set_var_symbol(symbol, previous)?;
        }
    }

    outcome?;

    let result = ctx.pop_op();
    ctx.stack.truncate(base);
    ctx.push_op(result)
}

/// Old values stay on the stack below the body, one per binding made.
fn bind_and_run(
    ctx: &mut Context,
    bindings: &[(Symbol, Handle)],
    body: Handle,
    position: Position,
    stashed: &mut usize,
) -> Result<()> {
    for &(symbol, value) in bindings {
        let previous = match ctx.resolve_symbol(symbol)? {
            Some(previous) => previous,
            None => {
                let name = ctx.make_symbol_from(symbol)?;
                ctx.make_error(ErrorCode::UndefinedVariable, name)
            }
        };
        ctx.push_op(previous)?;
        *stashed += 1;

        eval_form(ctx, value, Position::Expression)?;

        let value = ctx.get_op(0);
        let stored = ctx.set_var_symbol(symbol, value);
        ctx.pop_op();

        if let Err(code) = stored {
            let error = ctx.error_value(code);
            return ctx.push_op(error);
        }
    }

    let forms = ctx.list_items(body).collect::<Vec<_>>();
    if forms.is_empty() {
        let nil = ctx.nil();
        return ctx.push_op(nil);
    }

    for (index, &form) in forms.iter().enumerate() {
        if index > 0 {
            ctx.pop_op();
        }
        eval_form(ctx, form, position)?;
    }

    Ok(())
}

/// Runs the body of an interpreted function. Every form is a statement; the value of the last
/// one is the result.
pub(crate) fn eval_body(ctx: &mut Context, body: Handle) -> Result<Handle> {
    let mut result = ctx.nil();
    let mut cursor = body;

    while let Some((form, rest)) = ctx.as_cons(cursor) {
        eval_form(ctx, form, Position::Statement)?;
        result = ctx.pop_op();
        cursor = rest;
    }

    Ok(result)
}
