//! Runtime value type for point formulas.
//!
//! A value is an `i32` or an `f32`.  `None` only marks a slot that holds no
//! variable; it never reaches an operator.  Binary arithmetic promotes both
//! sides to float as soon as one of them is a float.

use std::fmt;

/// A simulator scalar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Int(i32),
    Float(f32),
}

impl fmt::Display for Value {
    /// Listing format: integers as `%d`, floats with three decimals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "?"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:.3}"),
        }
    }
}

impl Value {
    pub const ZERO: Value = Value::Int(0);
    pub const ONE: Value = Value::Int(1);

    /// Nonzero int or nonzero float.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
        }
    }

    /// Integer cast; floats truncate toward zero.
    pub fn as_int(&self) -> i32 {
        match self {
            Value::None => 0,
            Value::Int(n) => *n,
            Value::Float(x) => *x as i32,
        }
    }

    pub fn as_float(&self) -> f32 {
        match self {
            Value::None => 0.0,
            Value::Int(n) => *n as f32,
            Value::Float(x) => *x,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// Same value retagged as an int.
    pub fn to_int(self) -> Value {
        Value::Int(self.as_int())
    }

    /// Same value retagged as a float.
    pub fn to_float(self) -> Value {
        Value::Float(self.as_float())
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    fn promoted(&self, rhs: &Value) -> bool {
        self.is_float() || rhs.is_float()
    }

    fn numeric(
        &self,
        rhs: &Value,
        int_op: impl Fn(i32, i32) -> i32,
        float_op: impl Fn(f32, f32) -> f32,
    ) -> Value {
        if self.promoted(rhs) {
            Value::Float(float_op(self.as_float(), rhs.as_float()))
        } else {
            Value::Int(int_op(self.as_int(), rhs.as_int()))
        }
    }

    pub fn arith_add(&self, rhs: &Value) -> Value {
        self.numeric(rhs, i32::wrapping_add, |a, b| a + b)
    }

    pub fn arith_sub(&self, rhs: &Value) -> Value {
        self.numeric(rhs, i32::wrapping_sub, |a, b| a - b)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Value {
        self.numeric(rhs, i32::wrapping_mul, |a, b| a * b)
    }

    /// `a ** b`, always a float.
    pub fn arith_pow(&self, rhs: &Value) -> Value {
        Value::Float(self.as_float().powf(rhs.as_float()))
    }

    /// Division; `None` when the (promoted) divisor is zero.
    pub fn arith_div(&self, rhs: &Value) -> Option<Value> {
        if self.promoted(rhs) {
            let b = rhs.as_float();
            (b != 0.0).then(|| Value::Float(self.as_float() / b))
        } else {
            let b = rhs.as_int();
            (b != 0).then(|| Value::Int(self.as_int().wrapping_div(b)))
        }
    }

    /// Integer modulo: both operands are cast to int first.
    pub fn arith_rem(&self, rhs: &Value) -> Option<Value> {
        let b = rhs.as_int();
        (b != 0).then(|| Value::Int(self.as_int().wrapping_rem(b)))
    }

    pub fn arith_neg(&self) -> Value {
        match self {
            Value::None => Value::None,
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Float(x) => Value::Float(-x),
        }
    }

    /// Relational comparison under promotion; returns `Int(0)` or `Int(1)`.
    pub fn compare(&self, rhs: &Value, int_op: fn(&i32, &i32) -> bool, float_op: fn(&f32, &f32) -> bool) -> Value {
        let hit = if self.promoted(rhs) {
            float_op(&self.as_float(), &rhs.as_float())
        } else {
            int_op(&self.as_int(), &rhs.as_int())
        };
        Value::from(hit)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(if b { 1 } else { 0 })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
