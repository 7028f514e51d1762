//! Scanning primitives shared by the evaluator and the statement parser.
//!
//! A [`Cursor`] walks a byte slice and carries a sticky error: once any scan
//! fails, every later scan fails with the *first* error until the caller
//! starts a new statement with a fresh cursor (or [`Cursor::clear`]).

use std::fmt;

use crate::value::Value;

// ── Errors ────────────────────────────────────────────────────────────────────

/// What went wrong while parsing or evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected character or missing operand.
    Syntax,
    /// Malformed or out-of-range numeral.
    BadNumber,
    /// Missing `(` / `)` or unbalanced parentheses.
    Unmatched,
    /// Wrong number of arguments to a built-in.
    ArgCount,
    /// Division or modulo by zero.
    DivideByZero,
    /// Name used where only a function is valid, or unknown keyword.
    UnknownName,
    /// A referenced variable could not be created.
    StoreFull,
    /// Text left over after a complete expression.
    Trailing,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::BadNumber => "bad number",
            ErrorKind::Unmatched => "unmatched parenthesis",
            ErrorKind::ArgCount => "wrong argument count",
            ErrorKind::DivideByZero => "division by zero",
            ErrorKind::UnknownName => "unknown name",
            ErrorKind::StoreFull => "variable store full",
            ErrorKind::Trailing => "unexpected trailing input",
        };
        f.write_str(s)
    }
}

/// A parse or evaluation failure at byte offset `pos` of the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalError {
    pub pos: usize,
    pub kind: ErrorKind,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at column {}", self.kind, self.pos + 1)
    }
}

impl std::error::Error for EvalError {}

pub type Result<T> = std::result::Result<T, EvalError>;

// ── Cursor ────────────────────────────────────────────────────────────────────

/// Current scan position plus the sticky error flag.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
    error: Option<EvalError>,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Cursor {
            src: src.as_bytes(),
            pos: 0,
            error: None,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.src.len());
    }

    /// Reset the sticky error so a new statement can be parsed.
    pub fn clear(&mut self) {
        self.error = None;
    }

    /// Raise an error at the current position.  The first error wins.
    pub fn fail<T>(&mut self, kind: ErrorKind) -> Result<T> {
        let pos = self.pos;
        self.fail_at(pos, kind)
    }

    pub fn fail_at<T>(&mut self, pos: usize, kind: ErrorKind) -> Result<T> {
        Err(*self.error.get_or_insert(EvalError { pos, kind }))
    }

    /// `Err` with the recorded error if one is pending.
    pub fn check(&self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    pub fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.src.len());
    }

    /// Consume `ch` if it is next.
    pub fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the two-byte operator `op` if it is next.
    pub fn eat2(&mut self, op: &[u8; 2]) -> bool {
        if self.peek() == Some(op[0]) && self.peek2() == Some(op[1]) {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    /// Consume `ch` or fail with `kind`.
    pub fn expect(&mut self, ch: u8, kind: ErrorKind) -> Result<()> {
        self.check()?;
        self.skip_blanks();
        if self.eat(ch) {
            Ok(())
        } else {
            self.fail(kind)
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.src.len());
        std::str::from_utf8(&self.src[start.min(end)..end]).unwrap_or("")
    }

    /// Remaining unscanned text.
    pub fn rest(&self) -> &'a str {
        self.slice(self.pos, self.src.len())
    }

    // ── Scanners ──────────────────────────────────────────────────────────────

    /// Skip spaces and tabs.
    pub fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Length of the identifier starting at the cursor, without consuming it.
    ///
    /// Identifiers start with a letter or underscore and continue with
    /// letters, digits, or underscores.  Zero means no identifier.
    pub fn name_len(&self) -> usize {
        let rest = &self.src[self.pos.min(self.src.len())..];
        match rest.first() {
            Some(c) if c.is_ascii_alphabetic() || *c == b'_' => rest
                .iter()
                .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
                .count(),
            _ => 0,
        }
    }

    /// Consume an identifier; `None` if there is none at the cursor.
    pub fn scan_name(&mut self) -> Option<&'a str> {
        let len = self.name_len();
        if len == 0 {
            return None;
        }
        let start = self.pos;
        self.pos += len;
        Some(self.slice(start, start + len))
    }

    fn scan_radix(&mut self) -> u32 {
        if self.peek() == Some(b'0') {
            match self.peek2() {
                Some(b'x' | b'X') => {
                    self.pos += 2;
                    return 16;
                }
                Some(b'b' | b'B') => {
                    self.pos += 2;
                    return 2;
                }
                _ => {}
            }
        }
        10
    }

    fn digit_run(&self, from: usize, radix: u32) -> usize {
        self.src[from.min(self.src.len())..]
            .iter()
            .take_while(|c| (**c as char).is_digit(radix))
            .count()
    }

    /// Length of a decimal float literal (`12.`, `.5`, `1.5e-3`) at `from`.
    fn float_len(&self, from: usize) -> usize {
        let mut end = from + self.digit_run(from, 10);
        if self.src.get(end) == Some(&b'.') {
            end += 1;
            end += self.digit_run(end, 10);
        }
        if matches!(self.src.get(end), Some(b'e' | b'E')) {
            let mut exp = end + 1;
            if matches!(self.src.get(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            let digits = self.digit_run(exp, 10);
            if digits > 0 {
                end = exp + digits;
            }
        }
        end - from
    }

    fn parse_int(&mut self, start: usize, radix: u32) -> Result<i32> {
        let len = self.digit_run(self.pos, radix);
        if len == 0 {
            return self.fail_at(start, ErrorKind::BadNumber);
        }
        let digits = self.slice(self.pos, self.pos + len);
        let parsed = if radix == 10 {
            digits.parse::<i32>().ok()
        } else {
            // Hex and binary literals may spell any 32-bit pattern.
            u32::from_str_radix(digits, radix).ok().map(|n| n as i32)
        };
        match parsed {
            Some(n) => {
                self.pos += len;
                Ok(n)
            }
            None => self.fail_at(start, ErrorKind::BadNumber),
        }
    }

    /// Scan a non-negative numeral if one starts at the cursor.
    ///
    /// Returns `Ok(None)` when the next byte cannot start a numeral.  A
    /// decimal point after the digit run makes the numeral a float; a
    /// fractional part after a `0x`/`0b` prefix is an error.
    pub fn scan_number(&mut self) -> Result<Option<Value>> {
        self.check()?;
        match self.peek() {
            Some(b'0'..=b'9' | b'.') => {}
            _ => return Ok(None),
        }
        let start = self.pos;
        let radix = self.scan_radix();
        let run = self.digit_run(self.pos, 10);
        if self.src.get(self.pos + run) == Some(&b'.') {
            if radix != 10 {
                return self.fail_at(start, ErrorKind::BadNumber);
            }
            return self.scan_float().map(|x| Some(Value::Float(x)));
        }
        self.parse_int(start, radix).map(|n| Some(Value::Int(n)))
    }

    /// Scan an unsigned integer (point addresses), honouring `0x`/`0b`.
    pub fn scan_unsigned(&mut self) -> Result<u32> {
        self.check()?;
        if !matches!(self.peek(), Some(b'0'..=b'9')) {
            return self.fail(ErrorKind::BadNumber);
        }
        let start = self.pos;
        let radix = self.scan_radix();
        let len = self.digit_run(self.pos, radix);
        let digits = self.slice(self.pos, self.pos + len);
        match u32::from_str_radix(digits, radix) {
            Ok(n) if len > 0 => {
                self.pos += len;
                Ok(n)
            }
            _ => self.fail_at(start, ErrorKind::BadNumber),
        }
    }

    /// Scan a decimal float, optionally signed (scaling limits).
    pub fn scan_float(&mut self) -> Result<f32> {
        self.check()?;
        let start = self.pos;
        let sign = usize::from(matches!(self.peek(), Some(b'-' | b'+')));
        let len = self.float_len(start + sign);
        let text = self.slice(start, start + sign + len);
        match text.parse::<f32>() {
            Ok(x) if len > 0 && x.is_finite() => {
                self.pos = start + sign + len;
                Ok(x)
            }
            _ => self.fail_at(start, ErrorKind::BadNumber),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
