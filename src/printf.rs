// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of syslog-cee.
//
// syslog-cee is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// syslog-cee is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with syslog-cee.  If
// not, see <http://www.gnu.org/licenses/>.

//! printf-style templates over typed arguments
//! ==========================================
//!
//! # Introduction
//!
//! The `syslog(3)` calling convention is a printf template followed by its arguments, and the
//! structured variant extends that with any number of `key, template, arguments...` triples. In
//! C the arguments arrive as a type-erased `va_list`, which can only be walked forwards & which
//! only the template can make sense of. Here they are captured up-front into a slice of [`Value`]s
//! (see [`cee_args!`](crate::cee_args)), each of which knows its own type.
//!
//! [`format_into`] renders a template against such a slice & reports how many arguments the
//! template consumed, so that the caller can carry on from exactly the right spot. Each argument
//! is read once; there is no need to re-parse the template to skip over what was just formatted.
//!
//! # Supported syntax
//!
//! ```text
//! %[N$][flags][width][.precision][length]conversion
//! ```
//!
//! - flags: `-`, `+`, space, `#`, `0`, `'` (grouping is a no-op, as in the C locale)
//! - width & precision: a decimal number, `*` (taken from the next argument) or `*M$`
//! - length: `hh`, `h`, `l`, `ll`, `q`, `L`, `j`, `z`, `Z`, `t`; integer arguments are truncated
//!   (or sign-extended) to the width the modifier names, just as C would reinterpret them
//! - conversions: `d i o u x X e E f F g G a A c C s S p m %`
//!
//! Positional references (`%2$s`) are supported, on the same terms as POSIX: a template uses
//! either positional or sequential references throughout, and the positions referenced must not
//! leave gaps. `%n` is refused.
//!
//! Anything that can't be matched to an argument of a compatible type is an
//! [`Error::Format`](crate::error::Error::Format). So is a width, precision or position greater
//! than `INT_MAX`, which C refuses with `EOVERFLOW`. Padding out to a width (or precision) that can
//! be represented but not allocated is an [`Error::OutOfMemory`](crate::error::Error::OutOfMemory).

use crate::error::{Error, Result};

use backtrace::Backtrace;

use std::collections::BTreeSet;

/// The largest width, precision or argument position a template may name
const MAX_COUNT: usize = i32::MAX as usize;

/// Fraction digits beyond which a `double` rendered in decimal is all zeros
const FLOAT_DIGITS: usize = 1100;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          enum Value                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single typed argument
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Str(&'a str),
    Pointer(usize),
    /// The C `NULL`: ends a field sequence, renders as `(null)` under `%s`
    Null,
}

impl<'a> Value<'a> {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "a signed integer",
            Value::UInt(_) => "an unsigned integer",
            Value::Float(_) => "a floating-point number",
            Value::Char(_) => "a character",
            Value::Str(_) => "a string",
            Value::Pointer(_) => "a pointer",
            Value::Null => "NULL",
        }
    }
    /// The string this value holds, if any
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! value_from_signed {
    ($($t:ty),*) => {
        $(impl<'a> std::convert::From<$t> for Value<'a> {
            fn from(x: $t) -> Self {
                Value::Int(x as i64)
            }
        })*
    };
}

macro_rules! value_from_unsigned {
    ($($t:ty),*) => {
        $(impl<'a> std::convert::From<$t> for Value<'a> {
            fn from(x: $t) -> Self {
                Value::UInt(x as u64)
            }
        })*
    };
}

value_from_signed!(i8, i16, i32, i64, isize);
value_from_unsigned!(u8, u16, u32, u64, usize);

impl<'a> std::convert::From<f32> for Value<'a> {
    fn from(x: f32) -> Self {
        Value::Float(x as f64)
    }
}

impl<'a> std::convert::From<f64> for Value<'a> {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<'a> std::convert::From<char> for Value<'a> {
    fn from(x: char) -> Self {
        Value::Char(x)
    }
}

impl<'a> std::convert::From<bool> for Value<'a> {
    fn from(x: bool) -> Self {
        Value::Int(x as i64)
    }
}

impl<'a> std::convert::From<&'a str> for Value<'a> {
    fn from(x: &'a str) -> Self {
        Value::Str(x)
    }
}

impl<'a> std::convert::From<&'a String> for Value<'a> {
    fn from(x: &'a String) -> Self {
        Value::Str(x.as_str())
    }
}

impl<'a> std::convert::From<Option<&'a str>> for Value<'a> {
    fn from(x: Option<&'a str>) -> Self {
        x.map(Value::Str).unwrap_or(Value::Null)
    }
}

impl<'a, T> std::convert::From<*const T> for Value<'a> {
    fn from(x: *const T) -> Self {
        Value::Pointer(x as usize)
    }
}

impl<'a, T> std::convert::From<*mut T> for Value<'a> {
    fn from(x: *mut T) -> Self {
        Value::Pointer(x as usize)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            parsing                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Count {
    Literal(usize),
    /// `*`
    Next,
    /// `*M$`
    Arg(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Length {
    None,
    Char,
    Short,
    Long,
    LongLong,
    LongDouble,
    IntMax,
    Size,
    PtrDiff,
}

#[derive(Clone, Copy, Debug)]
struct Spec {
    position: Option<usize>,
    flags: Flags,
    width: Option<Count>,
    precision: Option<Count>,
    length: Length,
    conv: u8,
}

enum Piece<'t> {
    Literal(&'t str),
    Spec(Spec),
}

/// Splits a template into literal text & conversion specifications.
struct Parser<'t> {
    template: &'t str,
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(template: &'t str) -> Parser<'t> {
        Parser { template, pos: 0 }
    }
    fn peek(&self) -> Option<u8> {
        self.template.as_bytes().get(self.pos).copied()
    }
    fn error(&self, reason: String) -> Error {
        Error::format(self.template, reason)
    }
    /// Parse a run of decimal digits, if there is one
    fn number(&mut self) -> Result<Option<usize>> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let n = self.template[start..self.pos]
            .parse::<usize>()
            .map_err(|err| self.error(format!("bad number at offset {}: {}", start, err)))?;
        if n > MAX_COUNT {
            return Err(self.error(format!(
                "{} at offset {} is larger than {}",
                n, start, MAX_COUNT
            )));
        }
        Ok(Some(n))
    }
    /// Parse `N$` if it's next; leaves the position untouched otherwise
    fn position(&mut self) -> Result<Option<usize>> {
        let start = self.pos;
        match self.number()? {
            Some(n) if self.peek() == Some(b'$') => {
                self.pos += 1;
                if n == 0 {
                    Err(self.error("argument position 0 is invalid".to_string()))
                } else {
                    Ok(Some(n))
                }
            }
            _ => {
                self.pos = start;
                Ok(None)
            }
        }
    }
    /// Parse a width or precision that starts with `*`
    fn star(&mut self) -> Result<Count> {
        self.pos += 1;
        Ok(match self.position()? {
            Some(n) => Count::Arg(n),
            None => Count::Next,
        })
    }
    fn spec(&mut self) -> Result<Spec> {
        let start = self.pos - 1;
        let position = self.position()?;

        let mut flags = Flags::default();
        loop {
            match self.peek() {
                Some(b'-') => flags.left = true,
                Some(b'+') => flags.plus = true,
                Some(b' ') => flags.space = true,
                Some(b'#') => flags.alt = true,
                Some(b'0') => flags.zero = true,
                Some(b'\'') | Some(b'I') => (),
                _ => break,
            }
            self.pos += 1;
        }

        let width = match self.peek() {
            Some(b'*') => Some(self.star()?),
            _ => self.number()?.map(Count::Literal),
        };

        let precision = if self.peek() == Some(b'.') {
            self.pos += 1;
            match self.peek() {
                Some(b'*') => Some(self.star()?),
                _ => Some(Count::Literal(self.number()?.unwrap_or(0))),
            }
        } else {
            None
        };

        let length = match self.peek() {
            Some(b'h') => {
                self.pos += 1;
                if self.peek() == Some(b'h') {
                    self.pos += 1;
                    Length::Char
                } else {
                    Length::Short
                }
            }
            Some(b'l') => {
                self.pos += 1;
                if self.peek() == Some(b'l') {
                    self.pos += 1;
                    Length::LongLong
                } else {
                    Length::Long
                }
            }
            Some(b'q') => {
                self.pos += 1;
                Length::LongLong
            }
            Some(b'L') => {
                self.pos += 1;
                Length::LongDouble
            }
            Some(b'j') => {
                self.pos += 1;
                Length::IntMax
            }
            Some(b'z') | Some(b'Z') => {
                self.pos += 1;
                Length::Size
            }
            Some(b't') => {
                self.pos += 1;
                Length::PtrDiff
            }
            _ => Length::None,
        };

        let conv = match self.peek() {
            Some(
                c @ (b'd' | b'i' | b'o' | b'u' | b'x' | b'X' | b'e' | b'E' | b'f' | b'F' | b'g'
                | b'G' | b'a' | b'A' | b'c' | b'C' | b's' | b'S' | b'p' | b'm' | b'%'),
            ) => c,
            Some(b'n') => {
                return Err(self.error(format!(
                    "%n (at offset {}) is not supported",
                    start
                )))
            }
            Some(_) => {
                let c = self.template[self.pos..].chars().next().unwrap_or('?');
                return Err(self.error(format!(
                    "unknown conversion '{}' at offset {}",
                    c, start
                )));
            }
            None => {
                return Err(self.error(format!(
                    "incomplete conversion at offset {}",
                    start
                )))
            }
        };
        self.pos += 1;

        Ok(Spec {
            position,
            flags,
            width,
            precision,
            length,
            conv,
        })
    }
    fn next_piece(&mut self) -> Result<Option<Piece<'t>>> {
        let bytes = self.template.as_bytes();
        if self.pos >= bytes.len() {
            return Ok(None);
        }
        if bytes[self.pos] != b'%' {
            let start = self.pos;
            // `%` is ASCII, so this always lands on a char boundary
            let end = bytes[start..]
                .iter()
                .position(|&b| b == b'%')
                .map(|n| start + n)
                .unwrap_or(bytes.len());
            self.pos = end;
            return Ok(Some(Piece::Literal(&self.template[start..end])));
        }
        self.pos += 1;
        self.spec().map(|spec| Some(Piece::Spec(spec)))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        argument access                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mode {
    Undecided,
    Sequential,
    Positional,
}

/// Hands out arguments in the order a template asks for them & keeps track of how many were
/// consumed. With no argument slice it just counts.
struct Args<'v, 'a> {
    template: &'v str,
    args: Option<&'v [Value<'a>]>,
    mode: Mode,
    next: usize,
    /// Positions (1-based) referenced so far
    referenced: BTreeSet<usize>,
}

impl<'v, 'a> Args<'v, 'a> {
    fn new(template: &'v str, args: Option<&'v [Value<'a>]>) -> Args<'v, 'a> {
        Args {
            template,
            args,
            mode: Mode::Undecided,
            next: 0,
            referenced: BTreeSet::new(),
        }
    }
    fn set_mode(&mut self, mode: Mode) -> Result<()> {
        match self.mode {
            Mode::Undecided => {
                self.mode = mode;
                Ok(())
            }
            m if m == mode => Ok(()),
            _ => Err(Error::format(
                self.template,
                "positional & sequential argument references can't be mixed",
            )),
        }
    }
    fn at(&self, idx: usize) -> Result<Value<'a>> {
        match self.args {
            None => Ok(Value::Null),
            Some(args) => args.get(idx).copied().ok_or_else(|| {
                Error::format(
                    self.template,
                    format!(
                        "missing argument {} (only {} supplied)",
                        idx + 1,
                        args.len()
                    ),
                )
            }),
        }
    }
    /// Fetch the next argument, or argument `position` (1-based)
    fn fetch(&mut self, position: Option<usize>) -> Result<Value<'a>> {
        match position {
            Some(n) => {
                self.set_mode(Mode::Positional)?;
                let value = self.at(n - 1)?;
                self.referenced.insert(n);
                Ok(value)
            }
            None => {
                self.set_mode(Mode::Sequential)?;
                let v = self.at(self.next)?;
                self.next += 1;
                Ok(v)
            }
        }
    }
    /// Resolve a width or precision to a signed count
    fn count(&mut self, count: Option<Count>) -> Result<Option<i64>> {
        let value = match count {
            None => return Ok(None),
            Some(Count::Literal(n)) => return Ok(Some(n as i64)),
            Some(Count::Next) => self.fetch(None)?,
            Some(Count::Arg(n)) => self.fetch(Some(n))?,
        };
        match value {
            Value::Int(n) => Ok(Some(n as i32 as i64)),
            Value::UInt(n) => Ok(Some(n as i32 as i64)),
            Value::Null if self.args.is_none() => Ok(Some(0)),
            other => Err(Error::format(
                self.template,
                format!("a `*` width or precision needs an integer, got {}", other.kind()),
            )),
        }
    }
    /// The number of arguments consumed
    fn finish(self) -> Result<usize> {
        match self.mode {
            Mode::Positional => {
                // Sorted & de-duplicated, so with no gaps position `i + 1` is at index `i`
                match self
                    .referenced
                    .iter()
                    .zip(1..)
                    .find(|&(&n, expected)| n != expected)
                {
                    Some((_, gap)) => Err(Error::format(
                        self.template,
                        format!("argument {} is never referenced", gap),
                    )),
                    None => Ok(self.referenced.len()),
                }
            }
            _ => Ok(self.next),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           rendering                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A spec with its width & precision resolved
struct Resolved {
    flags: Flags,
    width: usize,
    precision: Option<usize>,
    length: Length,
    conv: u8,
}

/// Make room for `additional` more bytes in `out`
fn reserve(out: &mut String, additional: usize) -> Result<()> {
    out.try_reserve(additional)
        .map_err(|err| Error::OutOfMemory {
            requested: additional,
            source: err,
            back: Backtrace::new_unresolved(),
        })
}

/// Append `n` zeros to `out`
fn push_zeros(out: &mut String, n: usize) -> Result<()> {
    reserve(out, n)?;
    out.extend(std::iter::repeat('0').take(n));
    Ok(())
}

/// Write `prefix` & `body` padded out to the field width.
fn pad(out: &mut String, r: &Resolved, prefix: &str, body: &str, zero_ok: bool) -> Result<()> {
    let len = prefix.len() + body.len();
    reserve(out, len.max(r.width))?;
    if len >= r.width {
        out.push_str(prefix);
        out.push_str(body);
        return Ok(());
    }
    let fill = r.width - len;
    if r.flags.left {
        out.push_str(prefix);
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if zero_ok && r.flags.zero {
        out.push_str(prefix);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(body);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(prefix);
        out.push_str(body);
    }
    Ok(())
}

fn sign_prefix(negative: bool, flags: &Flags) -> &'static str {
    if negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    }
}

fn mismatch(template: &str, conv: u8, value: &Value) -> Error {
    Error::format(
        template,
        format!("%{} can't format {}", conv as char, value.kind()),
    )
}

fn signed_arg(template: &str, r: &Resolved, value: &Value) -> Result<i64> {
    let raw = match *value {
        Value::Int(n) => n,
        Value::UInt(n) => n as i64,
        Value::Char(c) => c as i64,
        _ => return Err(mismatch(template, r.conv, value)),
    };
    Ok(match r.length {
        Length::Char => raw as i8 as i64,
        Length::Short => raw as i16 as i64,
        Length::None => raw as i32 as i64,
        _ => raw,
    })
}

fn unsigned_arg(template: &str, r: &Resolved, value: &Value) -> Result<u64> {
    let raw = match *value {
        Value::Int(n) => n as u64,
        Value::UInt(n) => n,
        Value::Char(c) => c as u64,
        _ => return Err(mismatch(template, r.conv, value)),
    };
    Ok(match r.length {
        Length::Char => raw as u8 as u64,
        Length::Short => raw as u16 as u64,
        Length::None => raw as u32 as u64,
        _ => raw,
    })
}

fn render_integer(out: &mut String, r: &Resolved, negative: bool, magnitude: u64) -> Result<()> {
    let mut digits = match r.conv {
        b'o' => format!("{:o}", magnitude),
        b'x' => format!("{:x}", magnitude),
        b'X' => format!("{:X}", magnitude),
        _ => format!("{}", magnitude),
    };
    if let Some(p) = r.precision {
        if p == 0 && magnitude == 0 {
            digits.clear();
        } else if digits.len() < p {
            let mut padded = String::new();
            push_zeros(&mut padded, p - digits.len())?;
            padded.push_str(&digits);
            digits = padded;
        }
    }
    let prefix = match r.conv {
        b'd' | b'i' => sign_prefix(negative, &r.flags),
        b'o' if r.flags.alt && !digits.starts_with('0') => {
            digits.insert(0, '0');
            ""
        }
        b'x' if r.flags.alt && magnitude != 0 => "0x",
        b'X' if r.flags.alt && magnitude != 0 => "0X",
        _ => "",
    };
    pad(out, r, prefix, &digits, r.precision.is_none())
}

/// Rewrite Rust's `1.5e2` exponent style as C's `1.5e+02`
fn c_exponent(rust: &str, upper: bool) -> String {
    let (mantissa, exp) = rust.split_once('e').unwrap_or((rust, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    format!(
        "{}{}{}{:02}",
        mantissa,
        if upper { 'E' } else { 'e' },
        if exp < 0 { '-' } else { '+' },
        exp.unsigned_abs()
    )
}

fn strip_trailing_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

fn force_point(s: &mut String) {
    if !s.contains('.') {
        s.push('.');
    }
}

fn hex_float(x: f64, precision: Option<usize>, alt: bool, upper: bool) -> Result<String> {
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i64;
    let mut mantissa = bits & ((1u64 << 52) - 1);
    let (mut lead, exp) = if x == 0.0 {
        (0u64, 0i64)
    } else if biased == 0 {
        (0, -1022)
    } else {
        (1, biased - 1023)
    };
    let mut digits = match precision {
        Some(p) if p < 13 => {
            let shift = 4 * (13 - p) as u32;
            let full = (lead << 52) | mantissa;
            let rem = full & ((1u64 << shift) - 1);
            let half = 1u64 << (shift - 1);
            let mut kept = full >> shift;
            if rem > half || (rem == half && kept & 1 == 1) {
                kept += 1;
            }
            let frac_bits = 4 * p as u32;
            lead = kept >> frac_bits;
            mantissa = kept & ((1u64 << frac_bits) - 1);
            if p == 0 {
                String::new()
            } else {
                format!("{:0width$x}", mantissa, width = p)
            }
        }
        Some(p) => {
            let mut s = format!("{:013x}", mantissa);
            push_zeros(&mut s, p - 13)?;
            s
        }
        None => {
            let mut s = format!("{:013x}", mantissa);
            while s.ends_with('0') {
                s.pop();
            }
            s
        }
    };
    if upper {
        digits = digits.to_uppercase();
    }
    let point = if !digits.is_empty() || alt { "." } else { "" };
    let s = format!(
        "0x{}{}{}p{}{}",
        lead,
        point,
        digits,
        if exp < 0 { '-' } else { '+' },
        exp.unsigned_abs()
    );
    Ok(if upper {
        s.replace("0x", "0X").replace('p', "P")
    } else {
        s
    })
}

/// Insert `n` zeros at the end of the digits in `s`: before the exponent, if there is one
fn extend_digits(s: &mut String, n: usize) -> Result<()> {
    if n == 0 {
        return Ok(());
    }
    let at = s.find('e').unwrap_or(s.len());
    let tail = s.split_off(at);
    push_zeros(s, n)?;
    s.push_str(&tail);
    Ok(())
}

fn render_float(out: &mut String, r: &Resolved, x: f64) -> Result<()> {
    let upper = r.conv.is_ascii_uppercase();
    let negative = x.is_sign_negative() && !x.is_nan();
    let prefix = sign_prefix(negative, &r.flags);
    if !x.is_finite() {
        let body = match (x.is_nan(), upper) {
            (true, false) => "nan",
            (true, true) => "NAN",
            (false, false) => "inf",
            (false, true) => "INF",
        };
        return pad(out, r, prefix, body, false);
    }
    let x = x.abs();
    match r.conv {
        b'f' | b'F' => {
            let p = r.precision.unwrap_or(6);
            let mut body = format!("{:.*}", p.min(FLOAT_DIGITS), x);
            extend_digits(&mut body, p.saturating_sub(FLOAT_DIGITS))?;
            if r.flags.alt {
                force_point(&mut body);
            }
            pad(out, r, prefix, &body, true)
        }
        b'e' | b'E' => {
            let p = r.precision.unwrap_or(6);
            let mut mantissa = format!("{:.*e}", p.min(FLOAT_DIGITS), x);
            extend_digits(&mut mantissa, p.saturating_sub(FLOAT_DIGITS))?;
            if r.flags.alt && p == 0 {
                mantissa = mantissa.replacen('e', ".e", 1);
            }
            pad(out, r, prefix, &c_exponent(&mantissa, upper), true)
        }
        b'g' | b'G' => {
            let requested = match r.precision.unwrap_or(6) {
                0 => 1,
                p => p,
            };
            // Past this many significant digits there is nothing but zeros, which are either
            // stripped or (with `#`) appended below
            let p = requested.min(FLOAT_DIGITS);
            let extra = if r.flags.alt { requested - p } else { 0 };
            // The exponent X that %e would produce at precision P - 1
            let sci = format!("{:.*e}", p - 1, x);
            let exp: i64 = sci
                .split_once('e')
                .and_then(|(_, e)| e.parse().ok())
                .unwrap_or(0);
            let body = if exp < -4 || exp >= p as i64 {
                let (mantissa, _) = sci.split_once('e').unwrap_or((&sci, ""));
                let mut mantissa = mantissa.to_string();
                if r.flags.alt {
                    force_point(&mut mantissa);
                    extend_digits(&mut mantissa, extra)?;
                } else {
                    strip_trailing_zeros(&mut mantissa);
                }
                c_exponent(&format!("{}e{}", mantissa, exp), upper)
            } else {
                let mut fixed = format!("{:.*}", (p as i64 - 1 - exp) as usize, x);
                if r.flags.alt {
                    force_point(&mut fixed);
                    extend_digits(&mut fixed, extra)?;
                } else {
                    strip_trailing_zeros(&mut fixed);
                }
                fixed
            };
            pad(out, r, prefix, &body, true)
        }
        _ => {
            let body = hex_float(x, r.precision, r.flags.alt, upper)?;
            // Zero padding goes between the "0x" & the digits
            if r.flags.zero && !r.flags.left {
                let full = format!("{}{}", prefix, &body[..2]);
                pad(out, r, &full, &body[2..], true)
            } else {
                pad(out, r, prefix, &body, true)
            }
        }
    }
}

/// The current `errno`, rendered the way `strerror(3)` would
fn errno_message() -> String {
    let text = std::io::Error::last_os_error().to_string();
    match text.find(" (os error ") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

fn render(out: &mut String, template: &str, spec: &Spec, args: &mut Args) -> Result<()> {
    if spec.conv == b'%' {
        out.push('%');
        return Ok(());
    }

    let mut flags = spec.flags;
    let width = match args.count(spec.width)? {
        // -INT_MIN isn't an int
        Some(w) if w.unsigned_abs() as usize > MAX_COUNT => {
            return Err(Error::format(template, format!("width {} is out of range", w)))
        }
        Some(w) if w < 0 => {
            flags.left = true;
            w.unsigned_abs() as usize
        }
        Some(w) => w as usize,
        None => 0,
    };
    let precision = match args.count(spec.precision)? {
        Some(p) if p >= 0 => Some(p as usize),
        _ => None,
    };
    let r = Resolved {
        flags,
        width,
        precision,
        length: spec.length,
        conv: spec.conv,
    };

    if r.conv == b'm' {
        if args.args.is_none() {
            return Ok(());
        }
        return pad(out, &r, "", &errno_message(), false);
    }

    let value = args.fetch(spec.position)?;
    if args.args.is_none() {
        // Counting only
        return Ok(());
    }

    match r.conv {
        b'd' | b'i' => {
            let n = signed_arg(template, &r, &value)?;
            render_integer(out, &r, n < 0, n.unsigned_abs())?;
        }
        b'o' | b'u' | b'x' | b'X' => {
            let n = unsigned_arg(template, &r, &value)?;
            render_integer(out, &r, false, n)?;
        }
        b'e' | b'E' | b'f' | b'F' | b'g' | b'G' | b'a' | b'A' => match value {
            Value::Float(x) => render_float(out, &r, x)?,
            _ => return Err(mismatch(template, r.conv, &value)),
        },
        b'c' | b'C' => {
            let wide = r.conv == b'C' || r.length == Length::Long;
            // A narrow argument is one byte; above 0x7f there's no locale to consult, so it's
            // taken as the Latin-1 character it names & written out as UTF-8
            let c = match value {
                Value::Char(c) => c,
                Value::Int(n) if !wide => n as u8 as char,
                Value::UInt(n) if !wide => n as u8 as char,
                Value::Int(n) => char::from_u32(n as u32)
                    .ok_or_else(|| Error::format(template, format!("{:#x} is not a character", n)))?,
                Value::UInt(n) => char::from_u32(n as u32)
                    .ok_or_else(|| Error::format(template, format!("{:#x} is not a character", n)))?,
                _ => return Err(mismatch(template, r.conv, &value)),
            };
            let mut tmp = [0u8; 4];
            pad(out, &r, "", c.encode_utf8(&mut tmp), false)?;
        }
        b's' | b'S' => {
            let s = match value {
                Value::Str(s) => s,
                // glibc prints "(null)" only when it fits within the precision
                Value::Null => match r.precision {
                    Some(p) if p < 6 => "",
                    _ => "(null)",
                },
                _ => return Err(mismatch(template, r.conv, &value)),
            };
            let s = match r.precision {
                Some(p) if p < s.len() => {
                    let mut end = p;
                    while !s.is_char_boundary(end) {
                        end -= 1;
                    }
                    &s[..end]
                }
                _ => s,
            };
            pad(out, &r, "", s, false)?;
        }
        b'p' => {
            let body = match value {
                Value::Pointer(0) | Value::Null => "(nil)".to_string(),
                Value::Pointer(p) => format!("0x{:x}", p),
                Value::UInt(p) => format!("0x{:x}", p),
                _ => return Err(mismatch(template, r.conv, &value)),
            };
            pad(out, &r, "", &body, false)?;
        }
        _ => {
            return Err(Error::format(
                template,
                format!("unsupported conversion '{}'", r.conv as char),
            ))
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Render `template` against `args`, appending the result to `out`; return the number of
/// arguments consumed.
///
/// On error, `out` may hold a partial rendering; callers that care should truncate it.
///
/// ```rust
/// use syslog_cee::printf::{format_into, Value};
/// let mut out = String::new();
/// let n = format_into(&mut out, "%s has %d items (%.1f%%)", &[
///     Value::from("cart"), Value::from(3), Value::from(42.26), Value::from("unused")]).unwrap();
/// assert_eq!(out, "cart has 3 items (42.3%)");
/// assert_eq!(n, 3);
/// ```
pub fn format_into(out: &mut String, template: &str, args: &[Value<'_>]) -> Result<usize> {
    let mut parser = Parser::new(template);
    let mut cursor = Args::new(template, Some(args));
    while let Some(piece) = parser.next_piece()? {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Spec(spec) => render(out, template, &spec, &mut cursor)?,
        }
    }
    cursor.finish()
}

/// Render `template` against `args`, returning the result & the number of arguments consumed.
pub fn format(template: &str, args: &[Value<'_>]) -> Result<(String, usize)> {
    let mut out = String::with_capacity(template.len() + 16);
    let n = format_into(&mut out, template, args)?;
    Ok((out, n))
}

/// Count the arguments `template` would consume, without rendering anything.
///
/// ```rust
/// use syslog_cee::printf::arg_count;
/// assert_eq!(arg_count("%*.*f and %s").unwrap(), 4);
/// assert_eq!(arg_count("%2$s %1$s").unwrap(), 2);
/// assert_eq!(arg_count("100%%").unwrap(), 0);
/// assert!(arg_count("%k").is_err());
/// ```
pub fn arg_count(template: &str) -> Result<usize> {
    let mut parser = Parser::new(template);
    let mut cursor = Args::new(template, None);
    let mut sink = String::new();
    while let Some(piece) = parser.next_piece()? {
        if let Piece::Spec(spec) = piece {
            render(&mut sink, template, &spec, &mut cursor)?;
        }
    }
    cursor.finish()
}

#[cfg(test)]
mod test {

    use super::*;

    macro_rules! args {
        ($($e:expr),* $(,)?) => { [$(Value::from($e)),*] };
    }

    fn fmt(template: &str, args: &[Value]) -> String {
        format(template, args).unwrap().0
    }

    #[test]
    fn literals() {
        assert_eq!(fmt("", &[]), "");
        assert_eq!(fmt("hello, world!", &[]), "hello, world!");
        assert_eq!(fmt("100%% sure", &[]), "100% sure");
        assert_eq!(fmt("Hello, 世界!", &[]), "Hello, 世界!");
    }

    #[test]
    fn integers() {
        assert_eq!(fmt("%d", &args![42]), "42");
        assert_eq!(fmt("%i", &args![-42]), "-42");
        assert_eq!(fmt("%5d|%-5d|%05d", &args![42, 42, -42]), "   42|42   |-0042");
        assert_eq!(fmt("%+d % d", &args![7, 7]), "+7  7");
        assert_eq!(fmt("%.3d", &args![7]), "007");
        assert_eq!(fmt("%.0d|", &args![0]), "|");
        assert_eq!(
            fmt("%x %X %#x %#o %o", &args![255, 255, 255, 8, 0]),
            "ff FF 0xff 010 0"
        );
        assert_eq!(fmt("%u", &args![-1]), "4294967295");
        assert_eq!(fmt("%lu", &args![-1i64]), "18446744073709551615");
        assert_eq!(fmt("%hhd %hd", &args![300, 70000]), "44 4464");
        assert_eq!(
            fmt("%lld %jd %zu %td", &args![i64::MIN, 1, 2usize, -3]),
            "-9223372036854775808 1 2 -3"
        );
        assert_eq!(fmt("%d", &args![u64::MAX]), "-1");
    }

    #[test]
    fn floats() {
        assert_eq!(fmt("%f", &args![1.5]), "1.500000");
        assert_eq!(fmt("%.2f", &args![3.14159]), "3.14");
        assert_eq!(
            fmt("%8.3f|%-8.1f|%08.2f", &args![3.14159, 2.5, -1.5]),
            "   3.142|2.5     |-0001.50"
        );
        assert_eq!(fmt("%e", &args![1234.5]), "1.234500e+03");
        assert_eq!(fmt("%.2E", &args![0.000123]), "1.23E-04");
        assert_eq!(fmt("%g", &args![100000.0]), "100000");
        assert_eq!(fmt("%g", &args![1000000.0]), "1e+06");
        assert_eq!(fmt("%g", &args![0.0001]), "0.0001");
        assert_eq!(fmt("%g", &args![0.00001]), "1e-05");
        assert_eq!(fmt("%g %G", &args![1.5, 2.5e-10]), "1.5 2.5E-10");
        assert_eq!(fmt("%#.0f", &args![3.0]), "3.");
        assert_eq!(fmt("%Lf", &args![2.0]), "2.000000");
        assert_eq!(
            fmt("%f %F %+f", &args![f64::INFINITY, f64::NAN, f64::NEG_INFINITY]),
            "inf NAN -inf"
        );
        assert_eq!(fmt("%a", &args![1.0]), "0x1p+0");
        assert_eq!(fmt("%a", &args![0.5]), "0x1p-1");
        assert_eq!(fmt("%A", &args![255.0]), "0X1.FEP+7");
        assert_eq!(fmt("%.1a", &args![1.0]), "0x1.0p+0");
        assert_eq!(fmt("%a", &args![0.0]), "0x0p+0");
    }

    #[test]
    fn chars_strings_pointers() {
        assert_eq!(fmt("%c%c%c", &args!['o', b'k' as i32, 'ß']), "okß");
        assert_eq!(fmt("%lc", &args![0x4e16]), "世");
        assert_eq!(
            fmt("[%5s][%-5s][%.2s]", &args!["ab", "ab", "abcdef"]),
            "[   ab][ab   ][ab]"
        );
        assert_eq!(fmt("%ls %S", &args!["wide", "wider"]), "wide wider");
        assert_eq!(fmt("%s|%.3s|", &[Value::Null, Value::Null]), "(null)||");
        // Precision counts bytes, but never splits a character
        assert_eq!(fmt("%.1s|%.3s", &args!["ü!", "ü!"]), "|ü!");
        assert_eq!(
            fmt("%p %p", &[Value::Pointer(0x1000), Value::Pointer(0)]),
            "0x1000 (nil)"
        );
    }

    #[test]
    fn star_width_and_precision() {
        assert_eq!(fmt("%*d", &args![5, 42]), "   42");
        assert_eq!(fmt("%-*d|", &args![4, 1]), "1   |");
        assert_eq!(fmt("%*d|", &args![-4, 1]), "1   |");
        assert_eq!(fmt("%.*f", &args![1, 2.26]), "2.3");
        assert_eq!(fmt("%.*s", &args![-1, "all"]), "all");
        assert_eq!(
            format("%*.*f", &args![8, 2, 1.0, "extra"]).unwrap(),
            ("    1.00".to_string(), 3)
        );
    }

    #[test]
    fn positional() {
        let (s, n) = format("%2$s, %1$s!", &args!["world", "hello", "next"]).unwrap();
        assert_eq!(s, "hello, world!");
        assert_eq!(n, 2);
        assert_eq!(fmt("%1$s %1$s", &args!["again"]), "again again");
        assert_eq!(fmt("%1$*2$d|", &args![7, 3]), "  7|");
        // Mixing, position zero & gaps are all refused
        assert!(format("%1$s %s", &args!["a", "b"]).is_err());
        assert!(format("%0$s", &args!["a"]).is_err());
        assert!(format("%2$s", &args!["a", "b"]).is_err());
    }

    #[test]
    fn consumption() {
        let args = args!["world", "key", "%d", 42];
        let (s, n) = format("hello, %s!", &args).unwrap();
        assert_eq!(s, "hello, world!");
        assert_eq!(n, 1);
        assert_eq!(format("no conversions", &args).unwrap().1, 0);
        assert_eq!(arg_count("%d %s %*d").unwrap(), 4);
        assert_eq!(arg_count("%m and %%").unwrap(), 0);
        assert!(arg_count("%1$s %s").is_err());
    }

    #[test]
    fn errors() {
        assert!(matches!(format("%k", &args![1]), Err(Error::Format { .. })));
        assert!(format("%n", &[Value::Pointer(8)]).is_err());
        assert!(format("trailing %", &[]).is_err());
        assert!(format("%l", &args![1]).is_err());
        assert!(format("%s %s", &args!["one"]).is_err());
        assert!(format("%d", &args!["not a number"]).is_err());
        assert!(format("%f", &args![1]).is_err());
        assert!(format("%s", &args![1]).is_err());
        assert!(format("%*d", &args!["w", 1]).is_err());
        let err = format("%q", &[]).unwrap_err();
        assert_eq!(
            format!("{}", err),
            "Couldn't format \"%q\": incomplete conversion at offset 0"
        );
    }

    #[test]
    fn oversized_counts() {
        for template in [
            "%9223372036854775807d",
            "%.9223372036854775807d",
            "%2147483648s",
            "%.2147483648f",
        ] {
            assert!(
                matches!(format(template, &args![1]), Err(Error::Format { .. })),
                "{}",
                template
            );
        }
        assert!(format("%18446744073709551615$s", &args!["x"]).is_err());
        assert!(format("%*d", &args![i32::MIN, 1]).is_err());
        // Large but representable positions are checked against the arguments, not allocated
        assert!(format("%2147483647$s", &args!["x"]).is_err());
        assert!(arg_count("%2147483647$s").is_err());
        assert!(format("%3$s", &args!["x"]).is_err());
    }

    #[test]
    fn long_float_precision() {
        let s = fmt("%.1200f", &args![0.5]);
        assert_eq!(s.len(), 1202);
        assert!(s.starts_with("0.5000"));
        assert!(s[2..].bytes().skip(1).all(|b| b == b'0'));
        let s = fmt("%.1200e", &args![1.0]);
        assert!(s.ends_with("0e+00"));
        assert_eq!(s.len(), 1206);
        assert_eq!(fmt("%.1200g", &args![0.25]), "0.25");
        let s = fmt("%#.1200g", &args![1.0]);
        assert_eq!(s.len(), 1201);
        assert!(s.starts_with("1.000"));
    }

    #[test]
    fn narrow_char_above_ascii() {
        assert_eq!(fmt("%c", &args![0xe9]), "\u{e9}");
        assert_eq!(fmt("%c", &args![0x1e9]), "\u{e9}");
        assert_eq!(fmt("%lc", &args![0x1e9]), "\u{1e9}");
    }

    #[test]
    fn errno() {
        // Whatever errno happens to be, %m renders something & consumes nothing
        let (_, n) = format("failed: %m", &[]).unwrap();
        assert_eq!(n, 0);
    }
}
