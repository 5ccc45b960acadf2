use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Config;
use crate::engine::{Bytecode, Engine, TreeWalker};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Evaluate straight off the source text.
    #[default]
    Tree,

    /// Compile every form and run it on the VM.
    Bytecode,
}

impl EngineKind {
    pub fn engine(self) -> Box<dyn Engine> {
        match self {
            EngineKind::Tree => Box::new(TreeWalker),
            EngineKind::Bytecode => Box::new(Bytecode),
        }
    }
}

/// A tiny lisp for memory constrained handhelds.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Options {
    /// Loads a file and prints the value of its last form.
    #[arg(short, long)]
    pub load: Option<PathBuf>,

    /// Starts a repl session, after loading the file if there is one.
    #[arg(short, long)]
    pub repl: bool,

    /// Prints the bytecode of every form of the loaded file instead of running it.
    #[arg(short, long)]
    pub disassemble: bool,

    #[arg(short, long, value_enum, default_value_t = EngineKind::Tree)]
    pub engine: EngineKind,

    /// Cells per pool.
    #[arg(long, default_value_t = 4096)]
    pub pool_size: usize,

    #[arg(long, default_value_t = 1)]
    pub pools: usize,

    /// Operand stack slots.
    #[arg(long, default_value_t = 512)]
    pub stack_size: usize,

    /// Global table entries.
    #[arg(long, default_value_t = 128)]
    pub globals: usize,

    /// Bytes of the symbol intern table.
    #[arg(long, default_value_t = 1999)]
    pub intern_bytes: usize,

    #[arg(long, default_value_t = 128)]
    pub max_depth: usize,
}

impl Options {
    pub fn config(&self) -> Config {
        Config {
            pool_size: self.pool_size,
            pools: self.pools,
            stack_size: self.stack_size,
            globals: self.globals,
            intern_bytes: self.intern_bytes,
            max_depth: self.max_depth,
            ..Config::default()
        }
    }
}
