//! Variable store and tick scheduler.
//!
//! Variables live in a bounded slot array and are found by a linear,
//! case-insensitive name scan.  Names and formula text are kept in two
//! fixed-capacity [`Arena`]s.  Names are appended in slot order and removed
//! together with their slot, so the name arena's storage index *is* the slot
//! index.
//!
//! Deleting a variable shifts every later slot down by one; that is the only
//! operation that changes a variable's index.
//!
//! [`VarStore::poll`] drives re-evaluation: once per tick interval it bumps
//! the tick counter and re-evaluates every live formula in slot order.

use std::fmt;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cursor::EvalError;
use crate::expr::{self, EvalContext};
use crate::point::PointBinding;
use crate::table::{Arena, EntryId};
use crate::value::Value;

// ── Limits ────────────────────────────────────────────────────────────────────

pub const VARS_MAX: usize = 100;
pub const NAMES_MAX: usize = 1024;
pub const FORMULAS_MAX: usize = 5120;
pub const TICK_DELAY_MS: u64 = 250;

/// Capacity bounds and tick interval of a [`VarStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub vars_max: usize,
    pub names_max: usize,
    pub formulas_max: usize,
    pub tick_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            vars_max: VARS_MAX,
            names_max: NAMES_MAX,
            formulas_max: FORMULAS_MAX,
            tick_ms: TICK_DELAY_MS,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a variable or formula could not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    SlotsFull,
    NamesFull,
    FormulasFull,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::SlotsFull => write!(f, "no free variable slots"),
            StoreError::NamesFull => write!(f, "name table full"),
            StoreError::FormulasFull => write!(f, "formula table full"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A live formula that failed during a tick sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaError {
    pub name: String,
    pub formula: String,
    /// Position is relative to `formula`.
    pub error: EvalError,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ={}: {}", self.name, self.formula, self.error)
    }
}

// ── Variable ──────────────────────────────────────────────────────────────────

/// One occupied slot.
#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub point: Option<PointBinding>,
    name: EntryId,
    formula: Option<EntryId>,
}

impl Variable {
    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }
}

// ── VarStore ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VarStore {
    vars: Vec<Variable>,
    names: Arena,
    formulas: Arena,
    config: StoreConfig,
    ticks: u32,
    last_tick_ms: u64,
    now_ms: u64,
    changed: bool,
    rng: StdRng,
}

impl Default for VarStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl VarStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// A store whose `rand()` sequence is reproducible.
    pub fn with_seed(config: StoreConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: StoreConfig, rng: StdRng) -> Self {
        VarStore {
            vars: Vec::with_capacity(config.vars_max),
            names: Arena::with_capacity(config.names_max),
            formulas: Arena::with_capacity(config.formulas_max),
            config,
            ticks: 0,
            last_tick_ms: 0,
            now_ms: 0,
            changed: false,
            rng,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Drop every variable and reset the scheduler.
    pub fn clear(&mut self) {
        self.vars.clear();
        self.names.clear();
        self.formulas.clear();
        self.ticks = 0;
        self.last_tick_ms = self.now_ms;
        self.changed = false;
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn get(&self, idx: usize) -> Option<&Variable> {
        self.vars.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Variable> {
        self.vars.get_mut(idx)
    }

    pub fn name(&self, idx: usize) -> Option<String> {
        self.names.text(self.vars.get(idx)?.name)
    }

    /// Stored formula text (whitespace stripped).
    pub fn formula(&self, idx: usize) -> Option<String> {
        self.formulas.text(self.vars.get(idx)?.formula?)
    }

    /// Bytes used in the name and formula tables.
    pub fn table_usage(&self) -> (usize, usize) {
        (self.names.used(), self.formulas.used())
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Allocate a new zero-valued variable at the end of the slot array.
    ///
    /// Does not check for an existing variable of the same name.
    pub fn create(&mut self, name: &str) -> Result<usize, StoreError> {
        if self.vars.len() >= self.config.vars_max {
            warn!("cannot create {name}: {}", StoreError::SlotsFull);
            return Err(StoreError::SlotsFull);
        }
        let Some(id) = self.names.add(name, false) else {
            warn!("cannot create {name}: {}", StoreError::NamesFull);
            return Err(StoreError::NamesFull);
        };
        self.vars.push(Variable {
            value: Value::ZERO,
            point: None,
            name: id,
            formula: None,
        });
        debug!("created variable {name} in slot {}", self.vars.len() - 1);
        Ok(self.vars.len() - 1)
    }

    /// Slot index of `name` (ASCII case-insensitive).
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.names.scan(name)
    }

    /// Remove a variable; later slots move down one place.
    pub fn delete(&mut self, idx: usize) {
        if idx >= self.vars.len() {
            return;
        }
        let var = self.vars.remove(idx);
        self.names.delete(var.name);
        if let Some(f) = var.formula {
            self.formulas.delete(f);
        }
        debug!("deleted variable in slot {idx}");
    }

    /// Replace (`Some`) or remove (`None`) a variable's formula.
    ///
    /// If the new text does not fit, the variable itself is deleted and
    /// `FormulasFull` is returned.
    pub fn set_formula(&mut self, idx: usize, text: Option<&str>) -> Result<(), StoreError> {
        let Some(var) = self.vars.get_mut(idx) else {
            return Ok(());
        };
        if let Some(old) = var.formula.take() {
            self.formulas.delete(old);
        }
        let Some(text) = text else {
            return Ok(());
        };
        match self.formulas.add(text, true) {
            Some(id) => {
                self.vars[idx].formula = Some(id);
                Ok(())
            }
            None => {
                warn!("formula table full; dropping slot {idx}");
                self.delete(idx);
                Err(StoreError::FormulasFull)
            }
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate a complete expression against the current variables.
    pub fn evaluate(&mut self, text: &str) -> Result<Value, EvalError> {
        expr::eval_str(text, self)
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Did the most recent [`poll`](Self::poll) run a tick sweep?
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Advance the clock to `now_ms` (milliseconds since start).
    ///
    /// When a tick interval has elapsed, the tick counter advances by one and
    /// every formula is re-evaluated in slot order.  A failing formula keeps
    /// its previous value and is returned; the sweep carries on.
    pub fn poll(&mut self, now_ms: u64) -> Vec<FormulaError> {
        self.now_ms = now_ms;
        let due = self.last_tick_ms + self.config.tick_ms;
        if now_ms < due {
            self.changed = false;
            return Vec::new();
        }
        // Keep to the tick grid unless a whole interval was missed.
        self.last_tick_ms = if now_ms - due >= self.config.tick_ms {
            now_ms
        } else {
            due
        };
        self.ticks = self.ticks.wrapping_add(1);

        let mut errors = Vec::new();
        let mut idx = 0;
        while idx < self.vars.len() {
            if let Some(text) = self.formula(idx) {
                match expr::eval_str(&text, self) {
                    Ok(v) => self.vars[idx].value = v,
                    Err(error) => {
                        let name = self.name(idx).unwrap_or_default();
                        warn!("tick {}: {name} ={text}: {error}", self.ticks);
                        errors.push(FormulaError { name, formula: text, error });
                    }
                }
            }
            idx += 1;
        }
        self.changed = true;
        errors
    }
}

impl EvalContext for VarStore {
    fn fetch_var(&mut self, name: &str) -> Option<Value> {
        if let Some(idx) = self.lookup(name) {
            return Some(self.vars[idx].value);
        }
        self.create(name).ok().map(|_| Value::ZERO)
    }

    fn ticks(&self) -> u32 {
        self.ticks
    }

    fn millis(&self) -> u32 {
        self.now_ms as u32
    }

    fn random(&mut self, lo: i32, hi: i32) -> i32 {
        if hi > lo {
            self.rng.gen_range(lo..hi)
        } else {
            lo
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ErrorKind;

    fn store() -> VarStore {
        VarStore::with_seed(StoreConfig::default(), 7)
    }

    fn define(s: &mut VarStore, name: &str, formula: &str) -> usize {
        let idx = s.create(name).unwrap();
        let v = s.evaluate(formula).unwrap();
        s.set_formula(idx, Some(formula)).unwrap();
        s.vars[idx].value = v;
        idx
    }

    #[test]
    fn create_and_lookup() {
        let mut s = store();
        let a = s.create("alpha").unwrap();
        let b = s.create("beta").unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(s.lookup("BETA"), Some(1));
        assert_eq!(s.lookup("gamma"), None);
        assert_eq!(s.get(a).unwrap().value, Value::ZERO);
    }

    #[test]
    fn create_fails_when_slots_exhausted() {
        let cfg = StoreConfig { vars_max: 2, ..Default::default() };
        let mut s = VarStore::new(cfg);
        s.create("a").unwrap();
        s.create("b").unwrap();
        assert_eq!(s.create("c"), Err(StoreError::SlotsFull));
    }

    #[test]
    fn create_fails_when_names_exhausted() {
        let cfg = StoreConfig { names_max: 6, ..Default::default() };
        let mut s = VarStore::new(cfg);
        s.create("abcd").unwrap();
        assert_eq!(s.create("xyz"), Err(StoreError::NamesFull));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn set_formula_replaces_and_clears() {
        let mut s = store();
        let a = define(&mut s, "a", "1 + 2");
        assert_eq!(s.formula(a).as_deref(), Some("1+2"));
        s.set_formula(a, Some("t * 10")).unwrap();
        assert_eq!(s.formula(a).as_deref(), Some("t*10"));
        s.set_formula(a, None).unwrap();
        assert_eq!(s.formula(a), None);
        assert_eq!(s.table_usage().1, 0);
    }

    #[test]
    fn set_formula_overflow_deletes_variable() {
        let cfg = StoreConfig { formulas_max: 8, ..Default::default() };
        let mut s = VarStore::new(cfg);
        let a = s.create("a").unwrap();
        s.create("b").unwrap();
        assert_eq!(s.set_formula(a, Some("1+2+3+4+5")), Err(StoreError::FormulasFull));
        assert_eq!(s.len(), 1);
        assert_eq!(s.lookup("a"), None);
        assert_eq!(s.lookup("b"), Some(0));
    }

    #[test]
    fn delete_compacts_in_order() {
        let mut s = store();
        define(&mut s, "a", "1");
        define(&mut s, "b", "a + 1");
        define(&mut s, "c", "b * 2");
        define(&mut s, "d", "c - a");
        s.delete(1);
        let names: Vec<_> = (0..s.len()).map(|i| s.name(i).unwrap()).collect();
        assert_eq!(names, ["a", "c", "d"]);
        assert_eq!(s.formula(1).as_deref(), Some("b*2"));
        assert_eq!(s.formula(2).as_deref(), Some("c-a"));
        assert_eq!(s.lookup("d"), Some(2));
    }

    #[test]
    fn evaluate_auto_vivifies() {
        let mut s = store();
        assert_eq!(s.evaluate("ghost + 2"), Ok(Value::Int(2)));
        assert_eq!(s.lookup("ghost"), Some(0));
        assert_eq!(s.get(0).unwrap().value, Value::ZERO);
    }

    #[test]
    fn evaluate_with_full_store_fails() {
        let cfg = StoreConfig { vars_max: 0, ..Default::default() };
        let mut s = VarStore::new(cfg);
        assert_eq!(s.evaluate("ghost").unwrap_err().kind, ErrorKind::StoreFull);
    }

    #[test]
    fn poll_ticks_once_per_interval() {
        let mut s = store();
        assert!(s.poll(0).is_empty());
        assert_eq!(s.ticks(), 0);
        assert!(!s.changed());
        s.poll(249);
        assert_eq!(s.ticks(), 0);
        s.poll(250);
        assert_eq!(s.ticks(), 1);
        assert!(s.changed());
        s.poll(251);
        s.poll(499);
        assert_eq!(s.ticks(), 1);
        assert!(!s.changed());
        s.poll(500);
        assert_eq!(s.ticks(), 2);
    }

    #[test]
    fn late_poll_does_not_burst() {
        let mut s = store();
        s.poll(10_000);
        assert_eq!(s.ticks(), 1);
        s.poll(10_001);
        assert_eq!(s.ticks(), 1);
        s.poll(10_250);
        assert_eq!(s.ticks(), 2);
    }

    #[test]
    fn sweep_reevaluates_in_slot_order() {
        let mut s = store();
        let counter = define(&mut s, "n", "n + 1");
        let double = define(&mut s, "d", "n * 2");
        s.poll(250);
        assert_eq!(s.get(counter).unwrap().value, Value::Int(2));
        assert_eq!(s.get(double).unwrap().value, Value::Int(4));
    }

    #[test]
    fn failing_formula_keeps_value_and_sweep_continues() {
        let mut s = store();
        let bad = define(&mut s, "bad", "10 / (2 - z)");
        let good = define(&mut s, "good", "t");
        let z = s.lookup("z").unwrap();
        s.get_mut(z).unwrap().value = Value::Int(2);
        let errors = s.poll(250);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "bad");
        assert_eq!(errors[0].formula, "10/(2-z)");
        assert_eq!(errors[0].error.kind, ErrorKind::DivideByZero);
        assert_eq!(s.get(bad).unwrap().value, Value::Int(5));
        assert_eq!(s.get(good).unwrap().value, Value::Int(1));
    }

    #[test]
    fn millis_follows_poll_clock() {
        let mut s = store();
        s.poll(1234);
        assert_eq!(s.evaluate("ms"), Ok(Value::Int(1234)));
    }

    #[test]
    fn rand_stays_in_range() {
        let mut s = store();
        for _ in 0..50 {
            let v = s.evaluate("rand(3, 6)").unwrap().as_int();
            assert!((3..6).contains(&v));
        }
        assert_eq!(s.evaluate("rand(5, 5)"), Ok(Value::Int(5)));
    }

    #[test]
    fn clear_resets_everything() {
        let mut s = store();
        define(&mut s, "a", "t");
        s.poll(300);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.ticks(), 0);
        assert_eq!(s.table_usage(), (0, 0));
    }
}
