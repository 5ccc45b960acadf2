//! Builtins every context starts with. Each one is a plain native function reading its arguments
//! from the operand stack.

pub mod env;
pub mod list;
pub mod num;

use crate::context::Context;
use crate::error::Result;
use crate::value::Arity;

const VARIADIC: Arity = Arity::AtLeast(0);

impl Context {
    pub fn register_intrinsics(&mut self) -> Result<()> {
        self.register_native("cons", 2, list::cons)?;
        self.register_native("car", 1, list::car)?;
        self.register_native("cdr", 1, list::cdr)?;
        self.register_native("list", VARIADIC, list::list)?;
        self.register_native("arg", 1, env::arg)?;
        self.register_native("argc", 0, env::argc)?;
        self.register_native("this", 0, env::this)?;
        self.register_native("progn", VARIADIC, env::progn)?;
        self.register_native("not", 1, num::not)?;
        self.register_native("equal", 2, num::equal)?;
        self.register_native("any-true", VARIADIC, num::any_true)?;
        self.register_native("all-true", VARIADIC, num::all_true)?;
        self.register_native("+", VARIADIC, num::add)?;
        self.register_native("-", 2, num::sub)?;
        self.register_native("*", VARIADIC, num::mul)?;
        self.register_native("/", 2, num::div)?;
        self.register_native("<", 2, num::less)?;
        self.register_native(">", 2, num::greater)?;
        self.register_native("length", 1, list::length)?;
        self.register_native("get", 2, list::get)?;
        self.register_native("apply", 2, list::apply)?;
        self.register_native("map", VARIADIC, list::map)?;
        self.register_native("filter", 2, list::filter)?;
        self.register_native("select", 2, list::select)?;
        self.register_native("reverse", 1, list::reverse)?;
        self.register_native("range", VARIADIC, list::range)?;
        self.register_native("fill", 2, list::fill)?;
        self.register_native("gen", 2, list::gen)?;
        self.register_native("bound", 1, env::bound)?;
        self.register_native("unbind", 1, env::unbind)?;
        self.register_native("eval", 1, env::eval)?;
        self.register_native("gc", 0, env::gc)?;
        self.register_native("interp-stat", 0, env::interp_stat)?;
        self.register_native("env", 0, env::env)?;
        self.register_native("globals", 0, env::globals)?;
        self.register_native("compile", 1, env::compile)?;
        self.register_native("disassemble", 1, env::disassemble)?;

        log::debug!("registered {} builtins", self.globals.len());

        Ok(())
    }
}
