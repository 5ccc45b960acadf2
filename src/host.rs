//! The surface a host program embeds: installing natives and constants, handing pointers to
//! scripts and running whole scripts.

use miette::NamedSource;

use crate::context::Context;
use crate::engine::{Engine, TreeWalker};
use crate::error::{ErrorCode, Result, ScriptError};
use crate::value::{Arity, Data, Handle, HostKind, NativeFn};

impl Context {
    /// Binds `name` to a native function.
    pub fn register_native(
        &mut self,
        name: &str,
        arity: impl Into<Arity>,
        call: NativeFn,
    ) -> Result<()> {
        let function = self.make_native(arity.into(), call)?;
        self.set_var(name, function)
    }

    /// Wraps a host pointer. The runtime never looks behind it; `kind` is only checked again by
    /// [Context::host_pointer].
    pub fn wrap_host_pointer(&mut self, ptr: *mut libc::c_void, kind: HostKind) -> Result<Handle> {
        self.make_userdata(ptr, kind)
    }

    pub fn host_pointer(&self, value: Handle, kind: HostKind) -> Result<*mut libc::c_void> {
        match *self.heap.data(value) {
            Data::UserData { ptr, kind: found } if found == kind => Ok(ptr),
            _ => Err(ErrorCode::WrongArgumentType),
        }
    }

    /// Installs named integers. They are looked up after the globals, so a global of the same
    /// name shadows them.
    pub fn declare_constants(&mut self, table: &[(&'static str, i32)]) {
        for &(name, value) in table {
            match self.constants.iter_mut().find(|(key, _)| *key == name) {
                Some(entry) => entry.1 = value,
                None => self.constants.push((name, value)),
            }
        }
    }

    /// Runs a script with the tree walker. See [Context::run_script].
    pub fn dostring(&mut self, name: &str, source: &str) -> Result<Handle, ScriptError> {
        self.run_script(&mut TreeWalker, name, source)
    }

    /// Runs every form of a script and returns the value of the last one. The value is no longer
    /// on the operand stack, so it must be stored or protected before anything else allocates.
    pub fn run_script(
        &mut self,
        engine: &mut dyn Engine,
        name: &str,
        source: &str,
    ) -> Result<Handle, ScriptError> {
        let outcome = engine.run(self, source);
        let value = self.pop_op();

        match outcome {
            Ok(()) => Ok(value),
            Err(span) => {
                let code = self
                    .as_error(value)
                    .map_or(ErrorCode::InvalidBytecode, |(code, _)| code);

                log::debug!("{name} failed at {}: {code}", span.offset());

                Err(ScriptError::Failed {
                    code,
                    message: self.display(value).to_string(),
                    source_code: NamedSource::new(name, source.to_string()),
                    span,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const ITEM: HostKind = HostKind(3);

    fn double(ctx: &mut Context, _argc: u8) -> Result<Handle> {
        let value = ctx.get_op(0);
        match ctx.as_integer(value) {
            Some(n) => ctx.make_integer(n * 2),
            None if ctx.is_nil(value) => Ok(value),
            None => Err(ErrorCode::WrongArgumentType),
        }
    }

    #[test]
    fn natives_are_callable_from_scripts() {
        let mut ctx = crate::init(Config::default()).unwrap();
        ctx.register_native("double", 1, double).unwrap();

        let value = ctx.dostring("double.lisp", "(double 21)").unwrap();
        assert_eq!(ctx.as_integer(value), Some(42));

        let value = ctx.dostring("double.lisp", "(double nil)").unwrap();
        assert!(ctx.is_nil(value));

        let error = ctx.dostring("double.lisp", "(double 'a)").unwrap_err();
        assert!(matches!(
            error,
            ScriptError::Failed {
                code: ErrorCode::WrongArgumentType,
                ..
            }
        ));
    }

    #[test]
    fn host_pointers_keep_their_kind() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let mut item = 7u32;
        let ptr = &mut item as *mut u32 as *mut libc::c_void;

        let value = ctx.wrap_host_pointer(ptr, ITEM).unwrap();
        ctx.set_var("item", value).unwrap();

        let value = ctx.get_var("item");
        assert_eq!(ctx.host_pointer(value, ITEM), Ok(ptr));
        assert_eq!(
            ctx.host_pointer(value, HostKind::OPAQUE),
            Err(ErrorCode::WrongArgumentType)
        );
        assert_eq!(ctx.display(value).to_string(), "<ud:3>");
    }

    #[test]
    fn constants_are_shadowed_by_globals() {
        let mut ctx = crate::init(Config::default()).unwrap();
        ctx.declare_constants(&[("heart", 4), ("coin", 9)]);

        let value = ctx.dostring("items.lisp", "(+ heart coin)").unwrap();
        assert_eq!(ctx.as_integer(value), Some(13));

        let value = ctx.dostring("items.lisp", "(set coin 1) (+ heart coin)").unwrap();
        assert_eq!(ctx.as_integer(value), Some(5));
    }

    #[test]
    fn failures_point_at_the_form() {
        let mut ctx = crate::init(Config::default()).unwrap();
        let source = "(set a 1)\n(car a)";

        let Err(ScriptError::Failed { span, message, .. }) = ctx.dostring("bad.lisp", source)
        else {
            panic!("expected a script failure");
        };

        assert_eq!(span.offset(), 10);
        assert_eq!(span.len(), 7);
        assert_eq!(message, "[ERR: Invalid argument type : nil]");
        assert_eq!(ctx.stack_depth(), 0);
    }
}
