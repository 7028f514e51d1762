//! Point I/O mapping.
//!
//! A variable may be bound to one simulated I/O point.  Protocol adapters
//! address points by kind and 16-bit address; the conversions here map a
//! variable's [`Value`] to and from the wire representation:
//!
//! - digital points carry a single bit (value truthiness);
//! - raw analog points carry the value as an unsigned 16-bit magnitude;
//! - scaled analog points map `[min, max]` linearly onto `0..=65535`.

use std::fmt;

use log::debug;

use crate::value::Value;
use crate::var::VarStore;

pub const RAW_MAX: f32 = 65535.0;

// ── Kinds and bindings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Do,
    Di,
    Ao,
    AoScaled,
    Ai,
    AiScaled,
}

/// Point tags in declaration syntax, indexed for keyword scanning.
pub const POINT_TAGS: &[&str] = &["do", "di", "ao", "ai"];

impl PointKind {
    /// Kind for a [`POINT_TAGS`] index.
    pub fn from_tag(idx: usize, scaled: bool) -> Option<PointKind> {
        match (idx, scaled) {
            (0, false) => Some(PointKind::Do),
            (1, false) => Some(PointKind::Di),
            (2, false) => Some(PointKind::Ao),
            (2, true) => Some(PointKind::AoScaled),
            (3, false) => Some(PointKind::Ai),
            (3, true) => Some(PointKind::AiScaled),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PointKind::Do => "do",
            PointKind::Di => "di",
            PointKind::Ao | PointKind::AoScaled => "ao",
            PointKind::Ai | PointKind::AiScaled => "ai",
        }
    }

    pub fn is_scaled(&self) -> bool {
        matches!(self, PointKind::AoScaled | PointKind::AiScaled)
    }

    /// The unscaled kind sharing this kind's address space.
    pub fn family(&self) -> PointKind {
        match self {
            PointKind::AoScaled => PointKind::Ao,
            PointKind::AiScaled => PointKind::Ai,
            other => *other,
        }
    }
}

/// A variable's attachment to an I/O point.  `min`/`max` only matter for
/// scaled kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointBinding {
    pub kind: PointKind,
    pub address: u16,
    pub min: f32,
    pub max: f32,
}

impl PointBinding {
    pub fn new(kind: PointKind, address: u16) -> Self {
        PointBinding { kind, address, min: 0.0, max: 0.0 }
    }

    pub fn scaled(kind: PointKind, address: u16, min: f32, max: f32) -> Self {
        PointBinding { kind, address, min, max }
    }

    /// Wire value of `value` under this binding.
    pub fn read(&self, value: Value) -> u16 {
        match self.kind {
            PointKind::Do | PointKind::Di => u16::from(digital(value)),
            PointKind::Ao | PointKind::Ai => raw(value),
            PointKind::AoScaled | PointKind::AiScaled => scale(value, self.min, self.max),
        }
    }

    /// Variable value for wire value `wire` under this binding.
    pub fn write(&self, wire: u16) -> Value {
        match self.kind {
            PointKind::Do | PointKind::Di => Value::from(wire != 0),
            PointKind::Ao | PointKind::Ai => Value::Int(i32::from(wire)),
            PointKind::AoScaled | PointKind::AiScaled => unscale(wire, self.min, self.max),
        }
    }
}

impl fmt::Display for PointBinding {
    /// Declaration syntax: ` :ao scaled 3 0.000000 100.000000`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " :{}", self.kind.tag())?;
        if self.kind.is_scaled() {
            write!(f, " scaled {} {:.6} {:.6}", self.address, self.min, self.max)
        } else {
            write!(f, " {}", self.address)
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

pub fn digital(value: Value) -> u8 {
    u8::from(value.as_bool())
}

/// Raw analog: ints and truncated floats, reduced modulo 2^16.
pub fn raw(value: Value) -> u16 {
    value.as_int() as u16
}

/// Engineering value to scaled wire value.
///
/// Integers at or below `min` read as 0; everything else maps linearly and
/// clamps to `0..=65535`.
pub fn scale(value: Value, min: f32, max: f32) -> u16 {
    if let Value::Int(n) = value {
        if n as f32 <= min {
            return 0;
        }
    }
    let span = max - min;
    if span <= 0.0 {
        return 0;
    }
    let r = (value.as_float() - min) / span * RAW_MAX;
    r.clamp(0.0, RAW_MAX) as u16
}

/// Scaled wire value to engineering value, always a float in `[min, max]`.
pub fn unscale(wire: u16, min: f32, max: f32) -> Value {
    Value::Float(min + f32::from(wire) / RAW_MAX * (max - min))
}

// ── Store access by address ───────────────────────────────────────────────────

impl VarStore {
    /// First slot bound to `address` under a kind in `family`.
    pub fn find_point(&self, family: PointKind, address: u16) -> Option<usize> {
        self.vars().iter().position(|v| {
            v.point
                .is_some_and(|p| p.address == address && p.kind.family() == family.family())
        })
    }

    /// Bit of the DO or DI point at `address`.
    pub fn read_digital(&self, kind: PointKind, address: u16) -> Option<u8> {
        let idx = self.find_point(kind, address)?;
        Some(digital(self.vars()[idx].value))
    }

    /// Drive the DO point at `address`; its formula is dropped.
    pub fn write_digital(&mut self, address: u16, bit: u8) -> bool {
        let Some(idx) = self.find_point(PointKind::Do, address) else {
            return false;
        };
        self.force(idx, Value::from(bit != 0));
        debug!("DO {address} <- {bit}");
        true
    }

    /// Wire value of the AO/AI point at `address`.
    ///
    /// Scaled bindings are read here too: `kind` selects the AO or AI
    /// address space and the binding found there decides whether the value
    /// goes out raw or through [`scale`].
    pub fn read_analog(&self, kind: PointKind, address: u16) -> Option<u16> {
        let idx = self.find_point(kind, address)?;
        let var = &self.vars()[idx];
        var.point.map(|p| p.read(var.value))
    }

    /// Drive the AO point at `address`; its formula is dropped.  A scaled
    /// AO binding stores the engineering value given by [`unscale`].
    pub fn write_analog(&mut self, address: u16, wire: u16) -> bool {
        let Some(idx) = self.find_point(PointKind::Ao, address) else {
            return false;
        };
        let Some(binding) = self.vars()[idx].point else {
            return false;
        };
        self.force(idx, binding.write(wire));
        debug!("AO {address} <- {wire}");
        true
    }

    fn force(&mut self, idx: usize, value: Value) {
        // Dropping a formula only frees space, so it cannot fail.
        let _ = self.set_formula(idx, None);
        if let Some(var) = self.get_mut(idx) {
            var.value = value;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
