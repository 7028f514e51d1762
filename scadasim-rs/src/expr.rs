//! Formula evaluator.
//!
//! Formulas are parsed and evaluated in a single pass over a [`Cursor`]; there
//! is no AST.  This lets `if()` and `series()` scan past the arguments they
//! do not select without evaluating them, so unselected arguments have no
//! side effects (in particular, they never create variables).
//!
//! Operator precedence (lowest → highest):
//!   `&& ||`  →  `| ^ &`  →  `== != <= < >= >`  →  `<< >>`  →  `+ -`  →
//!   `* ** / // %`  →  primary (`-x`, `!x`, numeral, `( )`, call, variable)
//!
//! Operators of one level associate left to right.  `&&` and `||` evaluate
//! both operands.

use std::sync::LazyLock;

use crate::cursor::{Cursor, ErrorKind, EvalError, Result};
use crate::table::KeywordTable;
use crate::value::Value;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// What the evaluator needs from its surroundings.
///
/// [`VarStore`](crate::var::VarStore) implements this for live formulas.
pub trait EvalContext {
    /// Current value of `name`.  An unknown name is created with `Int(0)`;
    /// `None` means it could not be created.
    fn fetch_var(&mut self, name: &str) -> Option<Value>;

    /// Scheduler tick counter.
    fn ticks(&self) -> u32;

    /// Milliseconds since the simulator started.
    fn millis(&self) -> u32;

    /// Integer in `lo..hi` (`lo` when the range is empty).
    fn random(&mut self, lo: i32, hi: i32) -> i32;
}

// ── Built-in functions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Ticks,
    Millis,
    Pi,
    If,
    Abs,
    Float,
    Int,
    Floor,
    Ceil,
    Round,
    Rand,
    Series,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Log,
    Ln,
}

const FUNCS: &[(&str, Func)] = &[
    ("t", Func::Ticks),
    ("ms", Func::Millis),
    ("pi", Func::Pi),
    ("if", Func::If),
    ("abs", Func::Abs),
    ("float", Func::Float),
    ("int", Func::Int),
    ("floor", Func::Floor),
    ("ceil", Func::Ceil),
    ("round", Func::Round),
    ("rand", Func::Rand),
    ("series", Func::Series),
    #[cfg(feature = "extra-math")]
    ("sin", Func::Sin),
    #[cfg(feature = "extra-math")]
    ("cos", Func::Cos),
    #[cfg(feature = "extra-math")]
    ("tan", Func::Tan),
    #[cfg(feature = "extra-math")]
    ("asin", Func::Asin),
    #[cfg(feature = "extra-math")]
    ("acos", Func::Acos),
    #[cfg(feature = "extra-math")]
    ("atan", Func::Atan),
    #[cfg(feature = "extra-math")]
    ("log", Func::Log),
    #[cfg(feature = "extra-math")]
    ("ln", Func::Ln),
];

static FUNCTIONS: LazyLock<KeywordTable> = LazyLock::new(|| {
    let names: Vec<&str> = FUNCS.iter().map(|(name, _)| *name).collect();
    KeywordTable::new(&names)
});

/// Is `name` a built-in function (and therefore not a usable variable name)?
pub fn is_function(name: &str) -> bool {
    FUNCTIONS.scan(name).is_some()
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

struct Evaluator<'a, 'b> {
    cur: &'b mut Cursor<'a>,
    ctx: &'b mut dyn EvalContext,
}

impl Evaluator<'_, '_> {
    /// Consume a single-byte operator that is not the first half of its
    /// doubled form (`|` vs `||`, `<` vs `<<`).
    fn eat_single(&mut self, ch: u8) -> bool {
        if self.cur.peek() == Some(ch) && self.cur.peek2() != Some(ch) {
            self.cur.advance(1);
            true
        } else {
            false
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn logical(&mut self) -> Result<Value> {
        let mut a = self.bitwise()?;
        loop {
            self.cur.skip_blanks();
            if self.cur.eat2(b"||") {
                let b = self.bitwise()?;
                a = Value::from(a.as_bool() || b.as_bool());
            } else if self.cur.eat2(b"&&") {
                let b = self.bitwise()?;
                a = Value::from(a.as_bool() && b.as_bool());
            } else {
                return Ok(a);
            }
        }
    }

    fn bitwise(&mut self) -> Result<Value> {
        let mut a = self.relational()?;
        loop {
            self.cur.skip_blanks();
            let op: fn(i32, i32) -> i32 = if self.eat_single(b'|') {
                |x, y| x | y
            } else if self.cur.eat(b'^') {
                |x, y| x ^ y
            } else if self.eat_single(b'&') {
                |x, y| x & y
            } else {
                return Ok(a);
            };
            let b = self.relational()?;
            a = Value::Int(op(a.as_int(), b.as_int()));
        }
    }

    fn relational(&mut self) -> Result<Value> {
        let mut a = self.shift()?;
        loop {
            self.cur.skip_blanks();
            let (int_op, float_op): (fn(&i32, &i32) -> bool, fn(&f32, &f32) -> bool) =
                if self.cur.eat2(b"==") {
                    (i32::eq, f32::eq)
                } else if self.cur.eat2(b"!=") {
                    (i32::ne, f32::ne)
                } else if self.cur.eat2(b"<=") {
                    (i32::le, f32::le)
                } else if self.eat_single(b'<') {
                    (i32::lt, f32::lt)
                } else if self.cur.eat2(b">=") {
                    (i32::ge, f32::ge)
                } else if self.eat_single(b'>') {
                    (i32::gt, f32::gt)
                } else {
                    return Ok(a);
                };
            let b = self.shift()?;
            a = a.compare(&b, int_op, float_op);
        }
    }

    fn shift(&mut self) -> Result<Value> {
        let mut a = self.additive()?;
        loop {
            self.cur.skip_blanks();
            if self.cur.eat2(b"<<") {
                let b = self.additive()?;
                a = Value::Int(a.as_int().wrapping_shl(b.as_int() as u32));
            } else if self.cur.eat2(b">>") {
                let b = self.additive()?;
                a = Value::Int(a.as_int().wrapping_shr(b.as_int() as u32));
            } else {
                return Ok(a);
            }
        }
    }

    fn additive(&mut self) -> Result<Value> {
        let mut a = self.multiplicative()?;
        loop {
            self.cur.skip_blanks();
            if self.cur.eat(b'+') {
                let b = self.multiplicative()?;
                a = a.arith_add(&b);
            } else if self.cur.eat(b'-') {
                let b = self.multiplicative()?;
                a = a.arith_sub(&b);
            } else {
                return Ok(a);
            }
        }
    }

    fn multiplicative(&mut self) -> Result<Value> {
        let mut a = self.primary()?;
        loop {
            self.cur.skip_blanks();
            if self.cur.eat2(b"**") {
                let b = self.primary()?;
                a = a.arith_pow(&b);
            } else if self.cur.eat(b'*') {
                let b = self.primary()?;
                a = a.arith_mul(&b);
            } else if self.cur.eat(b'/') {
                let floor = self.cur.eat(b'/');
                let b = self.primary()?;
                a = match a.arith_div(&b) {
                    Some(q) if floor => q.to_int(),
                    Some(q) => q,
                    None => return self.cur.fail(ErrorKind::DivideByZero),
                };
            } else if self.cur.eat(b'%') {
                let b = self.primary()?;
                a = match a.arith_rem(&b) {
                    Some(r) => r,
                    None => return self.cur.fail(ErrorKind::DivideByZero),
                };
            } else {
                return Ok(a);
            }
        }
    }

    fn primary(&mut self) -> Result<Value> {
        self.cur.check()?;
        self.cur.skip_blanks();

        if self.cur.eat(b'-') {
            return Ok(self.primary()?.arith_neg());
        }
        if self.cur.eat(b'!') {
            return Ok(Value::from(!self.primary()?.as_bool()));
        }
        if let Some(v) = self.cur.scan_number()? {
            return Ok(v);
        }
        if self.cur.eat(b'(') {
            let a = self.logical()?;
            self.cur.expect(b')', ErrorKind::Unmatched)?;
            return Ok(a);
        }

        let start = self.cur.pos();
        let Some(name) = self.cur.scan_name() else {
            return self.cur.fail(ErrorKind::Syntax);
        };
        if let Some(idx) = FUNCTIONS.scan(name) {
            return self.call(FUNCS[idx].1);
        }
        match self.ctx.fetch_var(name) {
            Some(v) => Ok(v),
            None => self.cur.fail_at(start, ErrorKind::StoreFull),
        }
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    fn open(&mut self) -> Result<()> {
        self.cur.expect(b'(', ErrorKind::Syntax)
    }

    fn close(&mut self) -> Result<()> {
        self.cur.skip_blanks();
        let kind = if self.cur.at_end() {
            ErrorKind::Unmatched
        } else {
            ErrorKind::ArgCount
        };
        self.cur.expect(b')', kind)
    }

    fn single_arg(&mut self) -> Result<Value> {
        self.open()?;
        let a = self.logical()?;
        self.close()?;
        Ok(a)
    }

    /// Move past one argument without evaluating it, stopping at the `,` or
    /// `)` that ends it.  Formula text is stored as ASCII, so any other byte
    /// is a syntax error here as it would be when evaluated.
    fn skip_arg(&mut self) -> Result<()> {
        self.cur.check()?;
        let mut depth = 0usize;
        loop {
            match self.cur.peek() {
                None => return self.cur.fail(ErrorKind::Unmatched),
                Some(b',' | b')') if depth == 0 => return Ok(()),
                Some(b'(') => depth += 1,
                Some(b')') => depth -= 1,
                Some(b) if !b.is_ascii() => return self.cur.fail(ErrorKind::Syntax),
                _ => {}
            }
            self.cur.advance(1);
        }
    }

    /// Number of top-level arguments before the closing `)`.
    fn count_args(&mut self) -> Result<usize> {
        let mark = self.cur.pos();
        let mut count = 1;
        loop {
            self.skip_arg()?;
            if self.cur.eat(b')') {
                break;
            }
            self.cur.advance(1);
            count += 1;
        }
        self.cur.set_pos(mark);
        Ok(count)
    }

    fn call(&mut self, func: Func) -> Result<Value> {
        let a = match func {
            Func::Ticks => Value::Int(self.ctx.ticks() as i32),
            Func::Millis => Value::Int(self.ctx.millis() as i32),
            Func::Pi => Value::Float(std::f32::consts::PI),
            Func::If => return self.call_if(),
            Func::Series => return self.call_series(),
            Func::Abs => match self.single_arg()? {
                Value::Int(n) => Value::Int(n.wrapping_abs()),
                v => Value::Float(v.as_float().abs()),
            },
            Func::Float => self.single_arg()?.to_float(),
            Func::Int | Func::Floor => self.single_arg()?.to_int(),
            Func::Ceil => match self.single_arg()? {
                Value::Float(x) => Value::Int(x.ceil() as i32),
                v => v.to_int(),
            },
            Func::Round => match self.single_arg()? {
                Value::Float(x) => Value::Int((x + 0.5).floor() as i32),
                v => v.to_int(),
            },
            Func::Rand => {
                self.open()?;
                let lo = self.logical()?;
                self.cur.expect(b',', ErrorKind::ArgCount)?;
                let hi = self.logical()?;
                self.close()?;
                Value::Int(self.ctx.random(lo.as_int(), hi.as_int()))
            }
            Func::Sin => self.math(f32::sin)?,
            Func::Cos => self.math(f32::cos)?,
            Func::Tan => self.math(f32::tan)?,
            Func::Asin => self.math(f32::asin)?,
            Func::Acos => self.math(f32::acos)?,
            Func::Atan => self.math(f32::atan)?,
            Func::Log => self.math(f32::log10)?,
            Func::Ln => self.math(f32::ln)?,
        };
        Ok(a)
    }

    fn math(&mut self, f: fn(f32) -> f32) -> Result<Value> {
        Ok(Value::Float(f(self.single_arg()?.as_float())))
    }

    /// `if(cond, then[, else])`
    fn call_if(&mut self) -> Result<Value> {
        self.open()?;
        let cond = self.logical()?;
        self.cur.expect(b',', ErrorKind::ArgCount)?;
        if cond.as_bool() {
            let a = self.logical()?;
            self.cur.skip_blanks();
            if self.cur.eat(b',') {
                self.skip_arg()?;
            }
            self.close()?;
            Ok(a)
        } else {
            self.skip_arg()?;
            if self.cur.eat(b')') {
                return Ok(Value::ZERO);
            }
            self.cur.expect(b',', ErrorKind::ArgCount)?;
            let a = self.logical()?;
            self.close()?;
            Ok(a)
        }
    }

    /// `series(a0, …, aN-1)`: only argument `ticks mod N` is evaluated.
    fn call_series(&mut self) -> Result<Value> {
        self.open()?;
        let count = self.count_args()?;
        let pick = self.ctx.ticks() as usize % count;
        let mut a = Value::ZERO;
        for idx in 0..count {
            if idx == pick {
                a = self.logical()?;
            } else {
                self.skip_arg()?;
            }
            self.cur.skip_blanks();
            let delim = if idx + 1 == count { b')' } else { b',' };
            if !self.cur.eat(delim) {
                return self.cur.fail(ErrorKind::ArgCount);
            }
        }
        Ok(a)
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Evaluate the expression starting at the cursor, leaving the cursor just
/// after it.  Anything that cannot continue the expression ends it.
pub fn eval_prefix(cur: &mut Cursor<'_>, ctx: &mut dyn EvalContext) -> Result<Value> {
    cur.check()?;
    cur.skip_blanks();
    let a = Evaluator { cur: &mut *cur, ctx }.logical()?;
    cur.skip_blanks();
    Ok(a)
}

/// Evaluate a complete expression; trailing text is an error.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> std::result::Result<Value, EvalError> {
    let mut cur = Cursor::new(src);
    let a = eval_prefix(&mut cur, ctx)?;
    if !cur.at_end() {
        return cur.fail(ErrorKind::Trailing);
    }
    Ok(a)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
