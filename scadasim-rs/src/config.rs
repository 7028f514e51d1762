//! Startup and listing files.
//!
//! A listing file is a sequence of operator statements, one per line, in
//! the same syntax accepted at the prompt (usually the output of `save`):
//!
//! | Line | Action |
//! |------|--------|
//! | blank, or starting with `#` | ignored |
//! | `name = expr [:point …]` | define a variable |
//! | any other statement | run as typed |
//!
//! A failing line is recorded and loading carries on with the next one.
//! A `load` line switches to another file rather than nesting it; a file
//! already run in the same chain is refused.

use std::path::{Path, PathBuf};

use log::warn;

use crate::command::{self, Outcome};
use crate::listing;
use crate::var::VarStore;

/// Startup file looked for in the working directory.
pub const LOCAL_STARTUP: &str = "scadasim.scada";
/// Startup file looked for in the home directory.
pub const HOME_STARTUP: &str = ".scadasim";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Run every statement in `s` against `store`.
///
/// Returns the number of statements run and the errors of those that failed.
/// A `load` line abandons the rest of `s`: the store is cleared and loading
/// carries on in the named file.
pub fn load_str(store: &mut VarStore, s: &str) -> (usize, Vec<ConfigError>) {
    let mut load = Load::default();
    let next = load.run(store, s);
    load.follow(store, next);
    (load.count, load.errors)
}

/// Read `path` and run it through [`load_str`].
pub fn load_file(store: &mut VarStore, path: &Path) -> std::io::Result<(usize, Vec<ConfigError>)> {
    let s = std::fs::read_to_string(path)?;
    Ok(load_text(store, path, &s))
}

/// The `load` command: read `path`, then replace the store with its contents.
/// The store is left alone when the file cannot be read.
pub fn reload(store: &mut VarStore, path: &Path) -> std::io::Result<(usize, Vec<ConfigError>)> {
    let s = std::fs::read_to_string(path)?;
    store.clear();
    Ok(load_text(store, path, &s))
}

fn load_text(store: &mut VarStore, path: &Path, s: &str) -> (usize, Vec<ConfigError>) {
    let mut load = Load::default();
    load.visited.push(file_key(path));
    let next = load.run(store, s);
    load.follow(store, next);
    (load.count, load.errors)
}

// ── Load state ────────────────────────────────────────────────────────────────

/// One chain of listing files, each `load` line switching to the next.
#[derive(Default)]
struct Load {
    count: usize,
    errors: Vec<ConfigError>,
    /// Files already run in this chain.
    visited: Vec<PathBuf>,
}

impl Load {
    /// Run the statements of `s`, stopping at the first `load` line.
    /// Returns that line's number and path.
    fn run(&mut self, store: &mut VarStore, s: &str) -> Option<(usize, PathBuf)> {
        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.count += 1;

            let message = match command::statement(store, line) {
                Outcome::Load(path) => return Some((lineno, path)),
                Outcome::Error { pos, kind } => {
                    format!("{kind}\n{line}\n{}", listing::caret(0, pos))
                }
                Outcome::Failed(msg) => msg,
                Outcome::Unsupported(name) => format!("{name} is not available"),
                _ => continue,
            };
            self.error(lineno, message);
        }
        None
    }

    /// Switch to each file named by a `load` line in turn.
    fn follow(&mut self, store: &mut VarStore, mut next: Option<(usize, PathBuf)>) {
        while let Some((lineno, path)) = next.take() {
            let key = file_key(&path);
            if self.visited.contains(&key) {
                self.error(lineno, format!("{}: already loaded", path.display()));
                return;
            }
            let s = match std::fs::read_to_string(&path) {
                Ok(s) => s,
                Err(e) => {
                    self.error(lineno, format!("{}: {e}", path.display()));
                    return;
                }
            };
            self.visited.push(key);
            store.clear();
            next = self.run(store, &s);
        }
    }

    fn error(&mut self, line: usize, message: String) {
        warn!("line {line}: {message}");
        self.errors.push(ConfigError { line, message });
    }
}

fn file_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The startup file to load when none is named on the command line:
/// `./scadasim.scada`, then `~/.scadasim`.
pub fn find_startup_file() -> Option<PathBuf> {
    let home = directories::BaseDirs::new().map(|d| d.home_dir().join(HOME_STARTUP));
    std::iter::once(PathBuf::from(LOCAL_STARTUP))
        .chain(home)
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
