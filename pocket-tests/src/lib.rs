//! Golden file runner. Every `*.lisp` file of a suite directory is run and its transcript is
//! compared with the `*.expect` file next to it. A missing `*.expect` file is written from the
//! current transcript.

use std::fs::{self, read_to_string};
use std::path::{Path, PathBuf};

pub struct Test {
    pub directory: &'static str,

    /// Produces the transcript of a file, or a description of why it could not.
    pub run: fn(source: &str, file_name: &str) -> Result<String, String>,
}

pub fn split_name(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_string_lossy();
    let mut parts = name.split('.').collect::<Vec<_>>();

    let typ = parts.pop()?;
    Some((parts.join("."), typ.to_string()))
}

fn sources(directory: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(directory) else {
        panic!("cannot read the suite directory {directory}");
    };

    let mut files = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| matches!(split_name(path), Some((_, typ)) if typ == "lisp"))
        .collect::<Vec<_>>();

    files.sort();
    files
}

fn check(test: &Test, path: &Path, file_name: &str) -> Result<(), String> {
    let content = read_to_string(path).map_err(|err| err.to_string())?;
    let result = (test.run)(&content, &format!("{file_name}.lisp"))?;

    let expect = path.with_extension("expect");

    match read_to_string(&expect) {
        Ok(expects) if expects == result => Ok(()),
        Ok(expects) => Err(format!("Expected:\n\n{expects}\n\ngot:\n\n{result}")),
        Err(_) => fs::write(expect, result).map_err(|err| err.to_string()),
    }
}

/// Runs every suite, printing one line per file. Panics when any file fails.
pub fn test_runner(tests: &[&Test]) {
    let filters = std::env::args()
        .skip(1)
        .filter(|arg| !arg.starts_with('-'))
        .collect::<Vec<_>>();

    let mut passed = 0;
    let mut failed = Vec::new();

    for test in tests {
        for path in sources(test.directory) {
            let Some((file_name, _)) = split_name(&path) else {
                continue;
            };

            if !filters.is_empty() && !filters.iter().any(|filter| file_name.contains(filter)) {
                continue;
            }

            match check(test, &path, &file_name) {
                Ok(()) => {
                    println!("test {file_name} ... ok");
                    passed += 1;
                }
                Err(message) => {
                    println!("test {file_name} ... FAILED");
                    failed.push((file_name, message));
                }
            }
        }
    }

    for (file_name, message) in &failed {
        println!("\n---- {file_name} ----\n{message}");
    }

    println!(
        "\ntest result: {}. {passed} passed; {} failed\n",
        if failed.is_empty() { "ok" } else { "FAILED" },
        failed.len()
    );

    if !failed.is_empty() {
        panic!("some tests failed");
    }
}

#[macro_export]
macro_rules! mk_suite {
    ($($directory:expr => $code:expr),* $(,)?) => {
        fn main() {
            $crate::test_runner(&[$(&$crate::Test {
                directory: concat!(env!("CARGO_MANIFEST_DIR"), $directory),
                run: $code,
            }),*]);
        }
    };
}
