use std::path::Path;

use clap::Parser;
use miette::IntoDiagnostic;
use pocket::cli::Options;
use pocket::reader::{self, Cursor};
use pocket::{bytecode, compiler, Context, ScriptError};

fn main() -> miette::Result<()> {
    // Install the panic handler.
    bupropion::install(bupropion::BupropionHandlerOpts::new).into_diagnostic()?;

    env_logger::init();

    // Parse the command line arguments.
    let options = Options::parse();

    let mut ctx = pocket::init(options.config()).map_err(ScriptError::from)?;
    let mut engine = options.engine.engine();

    log::debug!("running with the {} engine", engine.name());

    if let Some(path) = &options.load {
        let source = read_source(path)?;
        let name = path.display().to_string();

        if options.disassemble {
            disassemble(&mut ctx, &source)?;
        } else {
            let value = ctx.run_script(engine.as_mut(), &name, &source)?;
            println!("{}", ctx.display(value));
        }
    }

    if options.repl {
        pocket::repl::run(&mut ctx, engine.as_mut())?;
    }

    Ok(())
}

fn read_source(path: &Path) -> Result<String, ScriptError> {
    std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Compiles every top-level form and prints its bytecode.
fn disassemble(ctx: &mut Context, source: &str) -> miette::Result<()> {
    let mut offset = 0;

    loop {
        let mut cursor = Cursor::new(&source[offset..]);
        cursor.skip_blank();
        if cursor.at_end() {
            return Ok(());
        }

        let start = offset + cursor.position();
        let used = reader::read(ctx, &source[start..]);
        let form = ctx.get_op(0);

        if ctx.is_error(form) {
            miette::bail!("cannot read form at {start}: {}", ctx.display(form));
        }

        match compiler::compile(ctx, form) {
            Ok(function) => match bytecode::disassemble(ctx, function) {
                Ok(listing) => print!("{listing}"),
                Err(code) => miette::bail!("cannot disassemble form at {start}: {code}"),
            },
            Err(code) => miette::bail!("cannot compile form at {start}: {code}"),
        }

        ctx.pop_op();
        println!();

        if used == 0 {
            return Ok(());
        }
        offset = start + used;
    }
}
