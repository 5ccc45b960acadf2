use std::path::PathBuf;

use miette::IntoDiagnostic;
use rustyline::error::ReadlineError;
use rustyline::validate::MatchingBracketValidator;
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter, Validator};

use crate::context::Context;
use crate::engine::Engine;

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputValidator {
    #[rustyline(Validator)]
    brackets: MatchingBracketValidator,
}

fn get_history_path() -> Option<PathBuf> {
    let home_env = std::env::var("HOME").ok()?;
    let path = format!("{home_env}/.pocket.history");
    Some(PathBuf::from(path))
}

pub fn run(ctx: &mut Context, engine: &mut dyn Engine) -> miette::Result<()> {
    let mut rl = Editor::new().into_diagnostic()?;
    let path = get_history_path();
    let h = InputValidator {
        brackets: MatchingBracketValidator::new(),
    };

    rl.set_helper(Some(h));

    if let Some(path) = path.clone() {
        if rl.load_history(&path).is_err() {
            println!("No previous history.");
        }
    }

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str()).into_diagnostic()?;

                match ctx.run_script(engine, "repl", &line) {
                    Ok(value) => println!("{}", ctx.display(value)),
                    Err(error) => println!("{:?}", miette::Report::new(error)),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Bye bye...");
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(path) = path {
        let _ = rl.append_history(&path);
    }

    Ok(())
}
