//! Instruction set of the bytecode VM. An instruction is one opcode byte followed by its operand,
//! little endian. Jump targets and lambda ends are offsets from the start of the enclosing
//! function.

use std::fmt::{Display, Formatter};

use crate::context::Context;
use crate::error::{ErrorCode, Result};
use crate::value::{Function, Handle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Fatal = 0,
    LoadVar = 1,
    PushNil = 2,
    PushInteger = 3,
    PushSmallInteger = 4,
    Push0 = 5,
    Push1 = 6,
    Push2 = 7,
    PushSymbol = 8,
    PushList = 9,
    Funcall = 10,
    Funcall1 = 11,
    Funcall2 = 12,
    Funcall3 = 13,
    Jump = 14,
    JumpSmall = 15,
    JumpIfFalse = 16,
    JumpSmallIfFalse = 17,
    PushLambda = 18,
    Pop = 19,
    Dup = 20,
    Ret = 21,
    MakePair = 22,
    SetVar = 25,
    RestoreVar = 26,
}

impl TryFrom<u8> for Opcode {
    type Error = ErrorCode;

    fn try_from(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Opcode::Fatal,
            1 => Opcode::LoadVar,
            2 => Opcode::PushNil,
            3 => Opcode::PushInteger,
            4 => Opcode::PushSmallInteger,
            5 => Opcode::Push0,
            6 => Opcode::Push1,
            7 => Opcode::Push2,
            8 => Opcode::PushSymbol,
            9 => Opcode::PushList,
            10 => Opcode::Funcall,
            11 => Opcode::Funcall1,
            12 => Opcode::Funcall2,
            13 => Opcode::Funcall3,
            14 => Opcode::Jump,
            15 => Opcode::JumpSmall,
            16 => Opcode::JumpIfFalse,
            17 => Opcode::JumpSmallIfFalse,
            18 => Opcode::PushLambda,
            19 => Opcode::Pop,
            20 => Opcode::Dup,
            21 => Opcode::Ret,
            22 => Opcode::MakePair,
            25 => Opcode::SetVar,
            26 => Opcode::RestoreVar,
            _ => return Err(ErrorCode::InvalidBytecode),
        })
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Fatal,
    LoadVar(u16),
    PushNil,
    PushInteger(i32),
    PushSmallInteger(i8),
    Push0,
    Push1,
    Push2,
    PushSymbol(u16),
    PushList(u8),
    Funcall(u8),
    Funcall1,
    Funcall2,
    Funcall3,
    Jump(u16),
    JumpSmall(u8),
    JumpIfFalse(u16),
    JumpSmallIfFalse(u8),
    PushLambda(u16),
    Pop,
    Dup,
    Ret,
    MakePair,
    SetVar(u16),

    /// Closes a `let`: the value below the top goes back into the global, or the global is
    /// removed when that value is an error.
    RestoreVar(u16),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Fatal => Opcode::Fatal,
            Instruction::LoadVar(_) => Opcode::LoadVar,
            Instruction::PushNil => Opcode::PushNil,
            Instruction::PushInteger(_) => Opcode::PushInteger,
            Instruction::PushSmallInteger(_) => Opcode::PushSmallInteger,
            Instruction::Push0 => Opcode::Push0,
            Instruction::Push1 => Opcode::Push1,
            Instruction::Push2 => Opcode::Push2,
            Instruction::PushSymbol(_) => Opcode::PushSymbol,
            Instruction::PushList(_) => Opcode::PushList,
            Instruction::Funcall(_) => Opcode::Funcall,
            Instruction::Funcall1 => Opcode::Funcall1,
            Instruction::Funcall2 => Opcode::Funcall2,
            Instruction::Funcall3 => Opcode::Funcall3,
            Instruction::Jump(_) => Opcode::Jump,
            Instruction::JumpSmall(_) => Opcode::JumpSmall,
            Instruction::JumpIfFalse(_) => Opcode::JumpIfFalse,
            Instruction::JumpSmallIfFalse(_) => Opcode::JumpSmallIfFalse,
            Instruction::PushLambda(_) => Opcode::PushLambda,
            Instruction::Pop => Opcode::Pop,
            Instruction::Dup => Opcode::Dup,
            Instruction::Ret => Opcode::Ret,
            Instruction::MakePair => Opcode::MakePair,
            Instruction::SetVar(_) => Opcode::SetVar,
            Instruction::RestoreVar(_) => Opcode::RestoreVar,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);

        match *self {
            Instruction::LoadVar(operand)
            | Instruction::PushSymbol(operand)
            | Instruction::Jump(operand)
            | Instruction::JumpIfFalse(operand)
            | Instruction::PushLambda(operand)
            | Instruction::SetVar(operand)
            | Instruction::RestoreVar(operand) => out.extend_from_slice(&operand.to_le_bytes()),
            Instruction::PushInteger(value) => out.extend_from_slice(&value.to_le_bytes()),
            Instruction::PushSmallInteger(value) => out.push(value as u8),
            Instruction::PushList(operand)
            | Instruction::Funcall(operand)
            | Instruction::JumpSmall(operand)
            | Instruction::JumpSmallIfFalse(operand) => out.push(operand),
            _ => {}
        }
    }

    /// Decodes the instruction at `pc`, returning it with the position of the next one.
    pub fn decode(code: &[u8], pc: usize) -> Result<(Instruction, usize)> {
        let opcode = Opcode::try_from(*code.get(pc).ok_or(ErrorCode::InvalidBytecode)?)?;
        let operand = pc + 1;

        let byte = || code.get(operand).copied().ok_or(ErrorCode::InvalidBytecode);
        let short = || {
            code.get(operand..operand + 2)
                .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
                .ok_or(ErrorCode::InvalidBytecode)
        };
        let word = || {
            code.get(operand..operand + 4)
                .map(|bytes| i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .ok_or(ErrorCode::InvalidBytecode)
        };

        let (instruction, size) = match opcode {
            Opcode::Fatal => (Instruction::Fatal, 0),
            Opcode::LoadVar => (Instruction::LoadVar(short()?), 2),
            Opcode::PushNil => (Instruction::PushNil, 0),
            Opcode::PushInteger => (Instruction::PushInteger(word()?), 4),
            Opcode::PushSmallInteger => (Instruction::PushSmallInteger(byte()? as i8), 1),
            Opcode::Push0 => (Instruction::Push0, 0),
            Opcode::Push1 => (Instruction::Push1, 0),
            Opcode::Push2 => (Instruction::Push2, 0),
            Opcode::PushSymbol => (Instruction::PushSymbol(short()?), 2),
            Opcode::PushList => (Instruction::PushList(byte()?), 1),
            Opcode::Funcall => (Instruction::Funcall(byte()?), 1),
            Opcode::Funcall1 => (Instruction::Funcall1, 0),
            Opcode::Funcall2 => (Instruction::Funcall2, 0),
            Opcode::Funcall3 => (Instruction::Funcall3, 0),
            Opcode::Jump => (Instruction::Jump(short()?), 2),
            Opcode::JumpSmall => (Instruction::JumpSmall(byte()?), 1),
            Opcode::JumpIfFalse => (Instruction::JumpIfFalse(short()?), 2),
            Opcode::JumpSmallIfFalse => (Instruction::JumpSmallIfFalse(byte()?), 1),
            Opcode::PushLambda => (Instruction::PushLambda(short()?), 2),
            Opcode::Pop => (Instruction::Pop, 0),
            Opcode::Dup => (Instruction::Dup, 0),
            Opcode::Ret => (Instruction::Ret, 0),
            Opcode::MakePair => (Instruction::MakePair, 0),
            Opcode::SetVar => (Instruction::SetVar(short()?), 2),
            Opcode::RestoreVar => (Instruction::RestoreVar(short()?), 2),
        };

        Ok((instruction, operand + size))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Fatal => write!(f, "FATAL"),
            Instruction::LoadVar(name) => write!(f, "LOAD_VAR({name})"),
            Instruction::PushNil => write!(f, "PUSH_NIL"),
            Instruction::PushInteger(value) => write!(f, "PUSH_INTEGER({value})"),
            Instruction::PushSmallInteger(value) => write!(f, "PUSH_SMALL_INTEGER({value})"),
            Instruction::Push0 => write!(f, "PUSH_0"),
            Instruction::Push1 => write!(f, "PUSH_1"),
            Instruction::Push2 => write!(f, "PUSH_2"),
            Instruction::PushSymbol(name) => write!(f, "PUSH_SYMBOL({name})"),
            Instruction::PushList(count) => write!(f, "PUSH_LIST({count})"),
            Instruction::Funcall(argc) => write!(f, "FUNCALL({argc})"),
            Instruction::Funcall1 => write!(f, "FUNCALL_1"),
            Instruction::Funcall2 => write!(f, "FUNCALL_2"),
            Instruction::Funcall3 => write!(f, "FUNCALL_3"),
            Instruction::Jump(target) => write!(f, "JUMP({target})"),
            Instruction::JumpSmall(target) => write!(f, "JUMP_SMALL({target})"),
            Instruction::JumpIfFalse(target) => write!(f, "JUMP_IF_FALSE({target})"),
            Instruction::JumpSmallIfFalse(target) => write!(f, "JUMP_SMALL_IF_FALSE({target})"),
            Instruction::PushLambda(end) => write!(f, "PUSH_LAMBDA({end})"),
            Instruction::Pop => write!(f, "POP"),
            Instruction::Dup => write!(f, "DUP"),
            Instruction::Ret => write!(f, "RET"),
            Instruction::MakePair => write!(f, "MAKE_PAIR"),
            Instruction::SetVar(name) => write!(f, "SET_VAR({name})"),
            Instruction::RestoreVar(name) => write!(f, "RESTORE_VAR({name})"),
        }
    }
}

/// Renders a compiled function one instruction per line, nested lambdas indented. Names are
/// shown after their intern offset.
pub fn disassemble(ctx: &Context, function: Handle) -> Result<String> {
    let Some(Function::Bytecode { buffer, offset }) = ctx.as_function(function) else {
        return Err(ErrorCode::WrongArgumentType);
    };

    let buffer = ctx.heap.decompress(buffer);
    let id = ctx.as_buffer(buffer).ok_or(ErrorCode::WrongArgumentType)?;
    let code = &ctx.heap.buffer(id).bytes;

    let start = offset as usize;
    let mut pc = start;
    let mut lambdas: Vec<usize> = Vec::new();
    let mut output = String::new();

    loop {
        while lambdas.last() == Some(&pc) {
            lambdas.pop();
        }

        let (instruction, next) = Instruction::decode(code, pc)?;
        let indent = "  ".repeat(lambdas.len());

        let name = match instruction {
            Instruction::LoadVar(name)
            | Instruction::PushSymbol(name)
            | Instruction::SetVar(name)
            | Instruction::RestoreVar(name) => {
                format!(" ; {}", ctx.symbols.name(name))
            }
            _ => String::new(),
        };

        output.push_str(&format!("{:04}: {indent}{instruction}{name}\n", pc - start));

        match instruction {
            Instruction::PushLambda(end) => lambdas.push(start + end as usize),
            Instruction::Ret if lambdas.is_empty() => break,
            Instruction::Fatal => break,
            _ => {}
        }

        pc = next;
    }

    Ok(output)
}
