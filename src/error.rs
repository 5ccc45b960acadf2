//! Failure kinds of the runtime. Script level failures are not exceptions: every [ErrorCode]
//! eventually becomes an `error` tagged value on the operand stack, and the host decides what to
//! do with it. [ScriptError] is the host facing report built from such a value.

use miette::{NamedSource, SourceSpan};
use thiserror::Error;

/// The closed set of failures a script can observe.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("Not callable")]
    NotCallable,

    #[error("Wrong number of arguments")]
    WrongArgc,

    #[error("No more room in symbol table")]
    SymbolTableExhausted,

    #[error("Access to undefined variable")]
    UndefinedVariable,

    #[error("Invalid argument type")]
    WrongArgumentType,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Set used in expression context")]
    SetInExpressionContext,

    #[error("Mismatched parentheses")]
    MismatchedParentheses,

    #[error("Too few arguments for function")]
    TooFewArguments,

    #[error("Value not callable")]
    ValueNotCallable,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Invalid bytecode")]
    InvalidBytecode,
}

pub type Result<T, E = ErrorCode> = std::result::Result<T, E>;

/// Rejected interpreter geometry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool size must be between {min} and {max} cells, got {got}")]
    PoolSize { min: usize, max: usize, got: usize },

    #[error("pool count must be between 1 and {max}, got {got}")]
    PoolCount { max: usize, got: usize },

    #[error("intern table must hold between 1 and {max} bytes, got {got}")]
    InternBytes { max: usize, got: usize },

    #[error("at most {max} scratch buffers are supported, got {got}")]
    Buffers { max: usize, got: usize },

    #[error("{0} must not be zero")]
    Zero(&'static str),

    #[error("the builtins do not fit: {0}")]
    Builtins(ErrorCode),
}

#[derive(Error, miette::Diagnostic, Debug)]
pub enum ScriptError {
    #[error("{message}")]
    #[diagnostic(code(pocket::script))]
    Failed {
        code: ErrorCode,
        message: String,

        #[source_code]
        source_code: NamedSource,

        #[label("{code}")]
        span: SourceSpan,
    },

    #[error("cannot read '{path}'")]
    #[diagnostic(code(pocket::io))]
    Io {
        path: String,

        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(pocket::config))]
    Config(#[from] ConfigError),
}
