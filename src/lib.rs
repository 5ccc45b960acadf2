//! pocket is a small embeddable lisp built for machines with a few hundred kilobytes of memory.
//! Everything lives in fixed capacity pools owned by a [Context]: the value cells, the operand
//! stack, the global table and the symbol intern table. Scripts run either through the tree
//! walking evaluator or through the bytecode compiler and VM, and both talk to the host through
//! the operand stack.
//!
//! ```lisp
//! (set square (lambda (* $0 $0)))
//! (map square (range 0 5))
//! (if (< (length '(1 2)) 3) 'short 'long)
//! ```
//!
//! Failures are values: a call that goes wrong leaves an `error` value where its result would be.

pub mod bytecode;
pub mod call;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod context;
pub mod display;
pub mod engine;
pub mod error;
pub mod eval;
pub mod globals;
pub mod heap;
pub mod host;
pub mod intern;
pub mod intrinsics;
pub mod reader;
pub mod repl;
pub mod roots;
pub mod stack;
pub mod value;

mod macros;
mod vm;

pub use config::Config;
pub use context::Context;
pub use engine::{Bytecode, Engine, TreeWalker};
pub use error::{ConfigError, ErrorCode, ScriptError};
pub use value::{Arity, Handle, HostKind, NativeFn, Tag};

/// Builds a context with every builtin registered.
pub fn init(config: Config) -> Result<Context, ConfigError> {
    let mut ctx = Context::new(config)?;
    ctx.register_intrinsics().map_err(ConfigError::Builtins)?;
    Ok(ctx)
}
