//! The reader scans S-expressions straight out of the source bytes. It is shared by the textual
//! evaluator, which consumes tokens as it evaluates, and by [read], which turns a datum into heap
//! values (quoted data, lambda bodies and the input of the compiler).

use crate::context::Context;
use crate::error::{ErrorCode, Result};

/// Scanning position over a borrowed source text.
#[derive(Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.position).copied()
    }

    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    fn accumulate_while<F>(&mut self, mut f: F) -> &'a str
    where
        F: FnMut(u8) -> bool,
    {
        let start = self.position;
        while let Some(byte) = self.peek() {
            if !f(byte) {
                break;
            }
            self.position += 1;
        }
        &self.source[start..self.position]
    }

    /// Skips whitespace and `;` comments.
    pub fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.position += 1;
                }
                Some(b';') => {
                    self.accumulate_while(|byte| byte != b'\n');
                }
                _ => break,
            }
        }
    }

    /// Reads an atom: everything up to the next delimiter.
    pub fn token(&mut self) -> &'a str {
        self.accumulate_while(|byte| !is_delimiter(byte))
    }

    /// Moves past one datum without evaluating it.
    pub fn skip_datum(&mut self) -> Result<()> {
        let mut level = 0usize;

        loop {
            self.skip_blank();

            match self.peek() {
                None => return Err(ErrorCode::MismatchedParentheses),
                Some(b'(') => {
                    self.position += 1;
                    level += 1;
                }
                Some(b')') => {
                    if level == 0 {
                        return Err(ErrorCode::MismatchedParentheses);
                    }
                    self.position += 1;
                    level -= 1;
                }
                Some(b'\'') => {
                    // The quoted datum follows.
                    self.position += 1;
                    continue;
                }
                Some(_) => {
                    self.token();
                }
            }

            if level == 0 {
                return Ok(());
            }
        }
    }

    /// Consumes the `)` closing a form. Anything else left in the form is an extra operand.
    pub fn close(&mut self) -> Result<()> {
        self.skip_blank();

        match self.peek() {
            Some(b')') => {
                self.position += 1;
                Ok(())
            }
            None => Err(ErrorCode::MismatchedParentheses),
            Some(_) => Err(ErrorCode::WrongArgc),
        }
    }
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'\'' | b';'
    )
}

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom<'a> {
    Integer(i32),
    Nil,
    Name(&'a str),
}

impl<'a> Atom<'a> {
    pub fn classify(token: &'a str) -> Self {
        if token == "nil" {
            return Atom::Nil;
        }

        match parse_integer(token) {
            Some(value) => Atom::Integer(value),
            None => Atom::Name(token),
        }
    }
}

/// Decimal or `0x` hexadecimal literal with an optional sign, wrapping into 32 bits.
fn parse_integer(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let (radix, digits) = match digits.strip_prefix("0x") {
        Some(rest) => (16, rest),
        None => (10, digits),
    };

    if digits.is_empty() {
        return None;
    }

    let value = digits.chars().try_fold(0i32, |acc, char| {
        let digit = char.to_digit(radix)?;
        Some(acc.wrapping_mul(radix as i32).wrapping_add(digit as i32))
    })?;

    Some(if negative { value.wrapping_neg() } else { value })
}

/// Reads one datum from `source` and pushes it. Returns the number of bytes consumed.
pub fn read(ctx: &mut Context, source: &str) -> usize {
    let checkpoint = ctx.checkpoint();
    let mut cursor = Cursor::new(source);

    cursor.skip_blank();

    let result = if cursor.at_end() {
        let nil = ctx.nil();
        ctx.push_op(nil)
    } else {
        read_datum(ctx, &mut cursor)
    };

    if let Err(code) = result {
        ctx.fail(checkpoint, code);

        // Consume a well formed datum whole even when reading it failed, like `eval` does.
        let mut datum = Cursor::new(source);
        datum.skip_blank();
        if datum.skip_datum().is_ok() {
            return datum.position();
        }
    }

    cursor.position()
}

/// Reads one datum and pushes it as heap data.
pub(crate) fn read_datum(ctx: &mut Context, cursor: &mut Cursor) -> Result<()> {
    cursor.skip_blank();

    match cursor.peek() {
        None | Some(b')') => Err(ErrorCode::MismatchedParentheses),
        Some(b'(') => {
            cursor.advance();
            ctx.enter()?;
            let result = read_list(ctx, cursor);
            ctx.leave();
            result
        }
        Some(b'\'') => {
            cursor.advance();
            let quote = ctx.make_symbol("quote")?;
            ctx.push_op(quote)?;
            read_datum(ctx, cursor)?;
            let quoted = ctx.list_from_stack(2)?;
            ctx.push_op(quoted)
        }
        Some(_) => {
            let value = match Atom::classify(cursor.token()) {
                Atom::Integer(value) => ctx.make_integer(value)?,
                Atom::Nil => ctx.nil(),
                Atom::Name(name) => ctx.make_symbol(name)?,
            };
            ctx.push_op(value)
        }
    }
}

fn read_list(ctx: &mut Context, cursor: &mut Cursor) -> Result<()> {
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
                read_datum(ctx, cursor)?;
                count += 1;
            }
        }
    }

    let list = ctx.list_from_stack(count)?;
    ctx.push_op(list)
}
