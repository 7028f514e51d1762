//! Operator statements.
//!
//! One line is one statement:
//!
//! | Form | Action |
//! |------|--------|
//! | `?expr` | evaluate once and report the value |
//! | `new`, `list`, `state`, `undef name`, `save path`, `load path`, `exit` | store commands |
//! | `name = expr` | set a live formula and its current value |
//! | `name :do N` / `:di N` / `:ao N` / `:ai N` | bind a point |
//! | `name :ao scaled N min max` / `:ai scaled N min max` | bind a scaled point |
//!
//! Assignment and point clauses may be chained on one line.  Everything
//! after `#` is a comment.  Keywords are matched case-insensitively and take
//! precedence over variable names.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};

use crate::config::{self, ConfigError};
use crate::cursor::{Cursor, ErrorKind, EvalError, Result};
use crate::expr;
use crate::listing;
use crate::point::{PointBinding, PointKind, POINT_TAGS};
use crate::table::KeywordTable;
use crate::value::Value;
use crate::var::VarStore;

// ── Keywords ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    New,
    List,
    Undef,
    State,
    Exit,
    Save,
    Load,
    /// Belongs to a protocol adapter or display not built into this binary.
    External(&'static str),
}

const COMMANDS: &[(&str, Command)] = &[
    ("new", Command::New),
    ("list", Command::List),
    ("undef", Command::Undef),
    ("modbus", Command::External("modbus")),
    ("state", Command::State),
    ("exit", Command::Exit),
    ("save", Command::Save),
    ("load", Command::Load),
    ("gfx", Command::External("gfx")),
    ("run", Command::External("run")),
    ("stop", Command::External("stop")),
    ("modbustcp", Command::External("modbustcp")),
    ("iec61850", Command::External("iec61850")),
    ("gsed", Command::External("gsed")),
    ("gsea", Command::External("gsea")),
    ("icd", Command::External("icd")),
    ("scd", Command::External("scd")),
];

static COMMAND_TABLE: LazyLock<KeywordTable> =
    LazyLock::new(|| KeywordTable::new(&COMMANDS.iter().map(|(w, _)| *w).collect::<Vec<_>>()));
static POINT_TABLE: LazyLock<KeywordTable> = LazyLock::new(|| KeywordTable::new(POINT_TAGS));
static SCALED_TABLE: LazyLock<KeywordTable> = LazyLock::new(|| KeywordTable::new(&["scaled"]));

fn command(word: &str) -> Option<Command> {
    COMMAND_TABLE.scan(word).map(|i| COMMANDS[i].1)
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Result of running one statement.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to report.
    Done,
    /// A `?expr` result.
    Value(Value),
    /// Output of `list` or `state`.
    Lines(Vec<String>),
    /// A `load` line read by [`statement`]; the caller switches to `path`.
    Load(PathBuf),
    /// A `load` finished; `count` statements ran.
    Loaded { count: usize, errors: Vec<ConfigError> },
    /// A recognised command whose subsystem is not available.
    Unsupported(&'static str),
    /// `save`/`load` could not touch the file.
    Failed(String),
    Exit,
    /// The statement failed at byte `pos` of the line.
    Error { pos: usize, kind: ErrorKind },
}

impl From<EvalError> for Outcome {
    fn from(e: EvalError) -> Self {
        Outcome::Error { pos: e.pos, kind: e.kind }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Run one statement against `store`, carrying out a `load` in place.
pub fn execute(store: &mut VarStore, line: &str) -> Outcome {
    match statement(store, line) {
        Outcome::Load(path) => match config::reload(store, &path) {
            Ok((count, errors)) => Outcome::Loaded { count, errors },
            Err(e) => Outcome::Failed(format!("{}: {e}", path.display())),
        },
        other => other,
    }
}

/// Run one statement against `store`, handing a `load` back to the caller
/// as [`Outcome::Load`].
pub fn statement(store: &mut VarStore, line: &str) -> Outcome {
    let line = line.split_once('#').map_or(line, |(code, _)| code);
    let line = line.trim_end_matches(['\r', '\n']);
    let mut cur = Cursor::new(line);
    cur.skip_blanks();
    if cur.at_end() {
        return Outcome::Done;
    }

    if cur.eat(b'?') {
        return match query(&mut cur, store) {
            Ok(v) => Outcome::Value(v),
            Err(e) => e.into(),
        };
    }

    let Some(name) = cur.scan_name() else {
        return Outcome::Error { pos: cur.pos(), kind: ErrorKind::Syntax };
    };
    cur.skip_blanks();
    if let Some(cmd) = command(name) {
        return run_command(cmd, &mut cur, store);
    }
    if cur.at_end() {
        // A lone word is most likely a mistyped command.
        return Outcome::Error { pos: cur.pos(), kind: ErrorKind::UnknownName };
    }
    match define(&mut cur, store, name) {
        Ok(()) => Outcome::Done,
        Err(e) => e.into(),
    }
}

fn query(cur: &mut Cursor<'_>, store: &mut VarStore) -> Result<Value> {
    let v = expr::eval_prefix(cur, store)?;
    if !cur.at_end() {
        return cur.fail(ErrorKind::Trailing);
    }
    Ok(v)
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_command(cmd: Command, cur: &mut Cursor<'_>, store: &mut VarStore) -> Outcome {
    match cmd {
        Command::New => {
            store.clear();
            info!("store cleared");
            Outcome::Done
        }
        Command::List => Outcome::Lines(listing::list(store)),
        Command::State => Outcome::Lines(listing::state(store)),
        Command::Undef => {
            if let Some(idx) = cur.scan_name().and_then(|n| store.lookup(n)) {
                store.delete(idx);
            }
            Outcome::Done
        }
        Command::Exit => Outcome::Exit,
        Command::Save => match path_arg(cur) {
            Ok(path) => match listing::save(store, Path::new(path)) {
                Ok(()) => Outcome::Done,
                Err(e) => Outcome::Failed(format!("{path}: {e}")),
            },
            Err(e) => e.into(),
        },
        Command::Load => match path_arg(cur) {
            Ok(path) => Outcome::Load(PathBuf::from(path)),
            Err(e) => e.into(),
        },
        Command::External(name) => {
            debug!("ignoring {name} command");
            Outcome::Unsupported(name)
        }
    }
}

fn path_arg<'a>(cur: &mut Cursor<'a>) -> Result<&'a str> {
    let path = cur.rest().trim();
    if path.is_empty() {
        return cur.fail(ErrorKind::Syntax);
    }
    Ok(path)
}

// ── Definitions ───────────────────────────────────────────────────────────────

/// Apply `= expr` and `:point` clauses to `name`.  A variable created here
/// is removed again if any clause fails.
fn define(cur: &mut Cursor<'_>, store: &mut VarStore, name: &str) -> Result<()> {
    // A variable named like a built-in could never be read back.
    if expr::is_function(name) {
        return cur.fail_at(0, ErrorKind::UnknownName);
    }
    let (idx, created) = match store.lookup(name) {
        Some(idx) => (idx, false),
        None => match store.create(name) {
            Ok(idx) => (idx, true),
            Err(_) => return cur.fail_at(0, ErrorKind::StoreFull),
        },
    };
    let result = clauses(cur, store, idx);
    if result.is_err() && created {
        // set_formula may already have dropped the slot.
        if let Some(idx) = store.lookup(name) {
            store.delete(idx);
        }
    }
    result
}

fn clauses(cur: &mut Cursor<'_>, store: &mut VarStore, idx: usize) -> Result<()> {
    loop {
        cur.skip_blanks();
        match cur.peek() {
            None => return Ok(()),
            Some(b'=') => {
                cur.advance(1);
                assign(cur, store, idx)?;
            }
            Some(b':') => {
                cur.advance(1);
                let binding = point_clause(cur)?;
                if let Some(var) = store.get_mut(idx) {
                    var.point = Some(binding);
                }
            }
            Some(_) => return cur.fail(ErrorKind::Syntax),
        }
    }
}

fn assign(cur: &mut Cursor<'_>, store: &mut VarStore, idx: usize) -> Result<()> {
    cur.skip_blanks();
    let start = cur.pos();
    let value = expr::eval_prefix(cur, store)?;
    let text = cur.slice(start, cur.pos());
    if store.set_formula(idx, Some(text)).is_err() {
        return cur.fail_at(start, ErrorKind::StoreFull);
    }
    if let Some(var) = store.get_mut(idx) {
        var.value = value;
    }
    Ok(())
}

fn point_clause(cur: &mut Cursor<'_>) -> Result<PointBinding> {
    cur.skip_blanks();
    let tag_pos = cur.pos();
    let Some(tag) = cur.scan_name().and_then(|t| POINT_TABLE.scan(t)) else {
        return cur.fail_at(tag_pos, ErrorKind::UnknownName);
    };
    cur.skip_blanks();
    let scaled_pos = cur.pos();
    let scaled = match cur.scan_name() {
        Some(word) if SCALED_TABLE.scan(word).is_some() => true,
        Some(_) => return cur.fail_at(scaled_pos, ErrorKind::UnknownName),
        None => false,
    };
    let Some(kind) = PointKind::from_tag(tag, scaled) else {
        return cur.fail_at(scaled_pos, ErrorKind::Syntax);
    };

    cur.skip_blanks();
    let addr_pos = cur.pos();
    let address = match u16::try_from(cur.scan_unsigned()?) {
        Ok(a) => a,
        Err(_) => return cur.fail_at(addr_pos, ErrorKind::BadNumber),
    };
    if !scaled {
        return Ok(PointBinding::new(kind, address));
    }
    cur.skip_blanks();
    let min = cur.scan_float()?;
    cur.skip_blanks();
    let max = cur.scan_float()?;
    Ok(PointBinding::scaled(kind, address, min, max))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::StoreConfig;

    fn store() -> VarStore {
        VarStore::with_seed(StoreConfig::default(), 1)
    }

    fn value_of(s: &VarStore, name: &str) -> Value {
        s.get(s.lookup(name).unwrap()).unwrap().value
    }

    fn error_at(outcome: Outcome) -> (usize, ErrorKind) {
        match outcome {
            Outcome::Error { pos, kind } => (pos, kind),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn blank_and_comment_lines() {
        let mut s = store();
        assert!(matches!(execute(&mut s, "   "), Outcome::Done));
        assert!(matches!(execute(&mut s, "# just a note"), Outcome::Done));
        assert!(s.is_empty());
    }

    #[test]
    fn query_prints_value() {
        let mut s = store();
        assert!(matches!(execute(&mut s, "? 2 + 3 * 4"), Outcome::Value(Value::Int(14))));
        assert!(matches!(execute(&mut s, "?7/2.0"), Outcome::Value(Value::Float(x)) if x == 3.5));
    }

    #[test]
    fn query_error_position_is_line_relative() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "? 1 / 0")), (7, ErrorKind::DivideByZero));
        assert_eq!(error_at(execute(&mut s, "?(1 + 2")).1, ErrorKind::Unmatched);
    }

    #[test]
    fn assignment_stores_formula_and_value() {
        let mut s = store();
        assert!(matches!(execute(&mut s, "level = 10 * 2 + 1  # comment"), Outcome::Done));
        let idx = s.lookup("level").unwrap();
        assert_eq!(s.get(idx).unwrap().value, Value::Int(21));
        assert_eq!(s.formula(idx).as_deref(), Some("10*2+1"));
    }

    #[test]
    fn reassignment_replaces_formula() {
        let mut s = store();
        execute(&mut s, "a = 1");
        execute(&mut s, "a = a + 5");
        assert_eq!(s.len(), 1);
        assert_eq!(value_of(&s, "a"), Value::Int(6));
        assert_eq!(s.formula(0).as_deref(), Some("a+5"));
    }

    #[test]
    fn failed_assignment_rolls_back_new_variable() {
        let mut s = store();
        let (_, kind) = error_at(execute(&mut s, "x = 1 / 0"));
        assert_eq!(kind, ErrorKind::DivideByZero);
        assert_eq!(s.lookup("x"), None);
    }

    #[test]
    fn failed_assignment_keeps_existing_variable() {
        let mut s = store();
        execute(&mut s, "x = 4");
        error_at(execute(&mut s, "x = (1"));
        assert_eq!(value_of(&s, "x"), Value::Int(4));
        assert_eq!(s.formula(0).as_deref(), Some("4"));
    }

    #[test]
    fn trailing_junk_is_an_error() {
        let mut s = store();
        let (pos, kind) = error_at(execute(&mut s, "y = 1 foo"));
        assert_eq!((pos, kind), (6, ErrorKind::Syntax));
        assert_eq!(s.lookup("y"), None);
    }

    #[test]
    fn bare_name_is_an_error() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "lsit")), (4, ErrorKind::UnknownName));
        assert!(s.is_empty());
    }

    #[test]
    fn builtin_names_cannot_be_defined() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "T = 5")), (0, ErrorKind::UnknownName));
        assert!(s.is_empty());
    }

    #[test]
    fn point_declarations() {
        let mut s = store();
        execute(&mut s, "pump :do 3");
        execute(&mut s, "temp = 21.5 :ai scaled 0x10 -40 125.5");
        execute(&mut s, "raw :AO 7");
        let pump = s.get(s.lookup("pump").unwrap()).unwrap();
        assert_eq!(pump.point, Some(PointBinding::new(PointKind::Do, 3)));
        let temp = s.get(s.lookup("temp").unwrap()).unwrap();
        assert_eq!(
            temp.point,
            Some(PointBinding::scaled(PointKind::AiScaled, 16, -40.0, 125.5))
        );
        assert_eq!(temp.value, Value::Float(21.5));
        let raw = s.get(s.lookup("raw").unwrap()).unwrap();
        assert_eq!(raw.point, Some(PointBinding::new(PointKind::Ao, 7)));
    }

    #[test]
    fn bad_point_declarations() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "a :xx 1")), (3, ErrorKind::UnknownName));
        assert_eq!(error_at(execute(&mut s, "a :do scaled 1 0 1")), (6, ErrorKind::Syntax));
        assert_eq!(error_at(execute(&mut s, "a :ai 70000")), (6, ErrorKind::BadNumber));
        assert_eq!(error_at(execute(&mut s, "a :ao scaled 1 0")).1, ErrorKind::BadNumber);
        assert!(s.is_empty());
    }

    #[test]
    fn redeclaring_point_replaces_binding() {
        let mut s = store();
        execute(&mut s, "v :di 1");
        execute(&mut s, "v :do 2");
        let v = s.get(0).unwrap();
        assert_eq!(v.point, Some(PointBinding::new(PointKind::Do, 2)));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let mut s = store();
        execute(&mut s, "a = 1");
        execute(&mut s, "b = 2");
        assert!(matches!(execute(&mut s, "UNDEF a"), Outcome::Done));
        assert_eq!(s.lookup("a"), None);
        assert_eq!(s.lookup("b"), Some(0));
        assert!(matches!(execute(&mut s, "New"), Outcome::Done));
        assert!(s.is_empty());
    }

    #[test]
    fn list_and_state() {
        let mut s = store();
        execute(&mut s, "a = 1 + 1 :do 4");
        execute(&mut s, "_hidden = 3");
        match execute(&mut s, "list") {
            Outcome::Lines(lines) => assert_eq!(lines, ["a = 1+1 :do 4", "_hidden = 3"]),
            other => panic!("{other:?}"),
        }
        match execute(&mut s, "state") {
            Outcome::Lines(lines) => assert_eq!(lines, ["a:2"]),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn external_commands_are_reported() {
        let mut s = store();
        assert!(matches!(execute(&mut s, "modbustcp 502"), Outcome::Unsupported("modbustcp")));
        assert!(matches!(execute(&mut s, "gfx panel.txt"), Outcome::Unsupported("gfx")));
        assert!(s.is_empty());
    }

    #[test]
    fn exit_command() {
        assert!(matches!(execute(&mut store(), "exit"), Outcome::Exit));
    }

    #[test]
    fn save_requires_path() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "save   ")).1, ErrorKind::Syntax);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.scada");
        let mut s = store();
        execute(&mut s, "n = n + 1");
        execute(&mut s, "level = n * 2.5 :ai scaled 1 0 100");
        let out = execute(&mut s, &format!("save {}", path.display()));
        assert!(matches!(out, Outcome::Done), "{out:?}");

        let mut fresh = store();
        execute(&mut fresh, "junk = 9");
        match execute(&mut fresh, &format!("load {}", path.display())) {
            Outcome::Loaded { count, errors } => {
                assert_eq!(count, 2);
                assert!(errors.is_empty());
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(fresh.lookup("junk"), None);
        assert_eq!(fresh.formula(1).as_deref(), Some("n*2.5"));
        assert_eq!(
            fresh.get(1).unwrap().point,
            Some(PointBinding::scaled(PointKind::AiScaled, 1, 0.0, 100.0))
        );
    }

    #[test]
    fn load_missing_file_fails() {
        let mut s = store();
        let out = execute(&mut s, "load /nonexistent/scadasim/file");
        assert!(matches!(out, Outcome::Failed(_)));
    }

    #[test]
    fn load_of_self_loading_file_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.scada");
        std::fs::write(&path, format!("a = 1\nload {}\n", path.display())).unwrap();
        let mut s = store();
        match execute(&mut s, &format!("load {}", path.display())) {
            Outcome::Loaded { count, errors } => {
                assert_eq!(count, 2);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(s.lookup("a"), Some(0));
    }

    #[test]
    fn load_missing_file_keeps_store() {
        let mut s = store();
        execute(&mut s, "a = 1");
        execute(&mut s, "load /nonexistent/scadasim/file");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn statement_hands_load_back() {
        let mut s = store();
        execute(&mut s, "a = 1");
        match statement(&mut s, "load plant.scada") {
            Outcome::Load(path) => assert_eq!(path, PathBuf::from("plant.scada")),
            other => panic!("{other:?}"),
        }
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn non_ascii_formula_rejected() {
        let mut s = store();
        assert_eq!(error_at(execute(&mut s, "x = if(1, 2, é)")), (13, ErrorKind::Syntax));
        assert!(s.is_empty());

        execute(&mut s, "y = 4");
        assert_eq!(error_at(execute(&mut s, "y = if(0, é, 1)")).1, ErrorKind::Syntax);
        assert_eq!(listing::list(&s), vec!["y = 4".to_owned()]);
    }
}
