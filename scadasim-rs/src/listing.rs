//! Text renderings of the store: `list` / `save` lines, `state` lines and
//! error carets.

use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::var::{FormulaError, VarStore};

/// `name = formula-or-value[ :point …]`, replayable as a statement.
pub fn var_line(store: &VarStore, idx: usize) -> Option<String> {
    let var = store.get(idx)?;
    let mut line = store.name(idx)?;
    line.push_str(" = ");
    match store.formula(idx) {
        Some(f) => line.push_str(&f),
        None => line.push_str(&var.value.to_string()),
    }
    if let Some(point) = var.point {
        line.push_str(&point.to_string());
    }
    Some(line)
}

pub fn list(store: &VarStore) -> Vec<String> {
    (0..store.len()).filter_map(|i| var_line(store, i)).collect()
}

/// `name:value` for every variable not starting with `_`.
pub fn state(store: &VarStore) -> Vec<String> {
    (0..store.len())
        .filter_map(|i| Some((store.name(i)?, store.get(i)?.value)))
        .filter(|(name, _)| !name.starts_with('_'))
        .map(|(name, value)| format!("{name}:{value}"))
        .collect()
}

/// A marker under byte `pos` of a line that starts `indent` columns in.
pub fn caret(indent: usize, pos: usize) -> String {
    format!("{}^ Error Here", " ".repeat(indent + pos))
}

/// The failing formula followed by a caret under the failure.
pub fn formula_error(err: &FormulaError) -> [String; 2] {
    let head = format!("{} = ", err.name);
    let indent = head.len();
    [format!("{head}{}", err.formula), caret(indent, err.error.pos)]
}

/// Write the `list` lines to `path`.
pub fn save(store: &VarStore, path: &Path) -> io::Result<()> {
    let mut text = list(store).join("\n");
    text.push('\n');
    fs::write(path, text)?;
    info!("saved {} variables to {}", store.len(), path.display());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
