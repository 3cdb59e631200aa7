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

//! Auto-growing, JSON-escaping byte buffers.
//!
//! # Introduction
//!
//! Every structured message is built in a [`JsonBuffer`]: a contiguous run of bytes whose length
//! doubles as the write cursor. The buffer is meant to be reused across many log calls (one per
//! thread; see [`crate::channel`]), so it never shrinks; after the first few messages on a thread
//! there is typically no allocation at all.
//!
//! # Growth
//!
//! All growth goes through [`JsonBuffer::ensure_capacity`], which reserves fallibly (so that an
//! exhausted heap shows up as [`Error::OutOfMemory`] rather than an abort) and geometrically (to
//! `2 × (len + additional)`), giving amortized O(1) appends. Escaping checks for room
//! incrementally: a run of bytes that need no escaping is sized exactly, and each escaped byte
//! reserves two or six bytes as it goes. Since most text needs no escaping at all, this beats
//! reserving six times the input length up-front.
//!
//! # Escaping
//!
//! The escape table is computed at compile time & classifies each of the 256 byte values. It
//! matches ECMA-404 exactly for the ASCII range: control characters, `"` & `\` are escaped; every
//! byte at or above 0x80 is copied verbatim so that multi-byte UTF-8 sequences pass through
//! untouched. Since input is a length-bounded slice rather than a C string, 0x00 is escaped as
//! `\u0000` like any other control character.

use crate::{
    error::{Error, Result},
    object::JsonObject,
};

use backtrace::Backtrace;
use bytes::BufMut;

/// The capacity guaranteed by [`JsonBuffer::reset`]; enough for most messages
pub const BASELINE_CAPACITY: usize = 512;

const fn build_escape_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 0x20 {
        table[i] = b'u';
        i += 1;
    }
    table[0x08] = b'b';
    table[0x09] = b't';
    table[0x0a] = b'n';
    table[0x0c] = b'f';
    table[0x0d] = b'r';
    table[b'"' as usize] = b'"';
    table[b'\\' as usize] = b'\\';
    table
}

/// For each byte: 0 if it is copied verbatim, the character following the backslash if it has a
/// short escape, or `u` if it is written as `\u00XX`
static ESCAPES: [u8; 256] = build_escape_table();

static HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// True if `byte` can't appear verbatim inside a JSON string
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    ESCAPES[byte as usize] != 0
}

/// An auto-growing byte buffer with a JSON string escaper.
#[derive(Debug, Default)]
pub struct JsonBuffer {
    buf: Vec<u8>,
}

impl JsonBuffer {
    /// Construct an empty buffer; nothing is allocated until first use.
    pub const fn new() -> JsonBuffer {
        JsonBuffer { buf: Vec::new() }
    }
    pub fn with_capacity(capacity: usize) -> JsonBuffer {
        JsonBuffer {
            buf: Vec::with_capacity(capacity),
        }
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
    /// Everything written so far (including the trailing NUL of a finalized object)
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
    /// Begin a new JSON object, discarding anything previously written.
    ///
    /// On return the buffer holds exactly `{` and has room for at least [`BASELINE_CAPACITY`]
    /// bytes. If that much can't be allocated, the buffer is left empty (but perfectly usable) &
    /// [`Error::OutOfMemory`] is returned.
    pub fn reset(&mut self) -> Result<JsonObject<'_>> {
        self.buf.clear();
        self.ensure_capacity(BASELINE_CAPACITY)?;
        self.buf.put_u8(b'{');
        Ok(JsonObject::new(self))
    }
    /// Guarantee that at least `additional` more bytes may be written without reallocating.
    pub fn ensure_capacity(&mut self, additional: usize) -> Result<()> {
        let len = self.buf.len();
        if self.buf.capacity() - len >= additional {
            return Ok(());
        }
        // Grow to twice what's needed; `try_reserve_exact` is relative to the current length.
        let target = len
            .checked_add(additional)
            .and_then(|n| n.checked_mul(2))
            .unwrap_or(usize::MAX);
        let grow = target - len;
        self.buf
            .try_reserve_exact(grow)
            .or_else(|_| self.buf.try_reserve_exact(additional))
            .map_err(|err| Error::OutOfMemory {
                requested: additional,
                source: err,
                back: Backtrace::new_unresolved(),
            })
    }
    /// Append `bytes` verbatim (no escaping).
    pub fn push_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_capacity(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }
    /// Append `raw`, escaped for inclusion in a JSON string (the surrounding quotes are the
    /// caller's concern).
    pub fn append_escaped(&mut self, raw: &[u8]) -> Result<()> {
        let mut start = 0;
        for (i, &byte) in raw.iter().enumerate() {
            let esc = ESCAPES[byte as usize];
            if esc == 0 {
                continue;
            }
            if start < i {
                self.push_raw(&raw[start..i])?;
            }
            if esc == b'u' {
                self.ensure_capacity(6)?;
                self.buf.put_slice(b"\\u00");
                self.buf.put_u8(HEX_DIGITS[(byte >> 4) as usize]);
                self.buf.put_u8(HEX_DIGITS[(byte & 0xf) as usize]);
            } else {
                self.ensure_capacity(2)?;
                self.buf.put_u8(b'\\');
                self.buf.put_u8(esc);
            }
            start = i + 1;
        }
        if start < raw.len() {
            self.push_raw(&raw[start..])?;
        }
        Ok(())
    }
    pub(crate) fn last(&self) -> Option<u8> {
        self.buf.last().copied()
    }
    pub(crate) fn set_last(&mut self, byte: u8) {
        if let Some(last) = self.buf.last_mut() {
            *last = byte;
        }
    }
    pub(crate) fn truncate(&mut self, len: usize) {
        self.buf.truncate(len)
    }
}

/// Escape `raw` onto the end of `out`; a convenience for one-off use outside a [`JsonBuffer`].
pub fn escape_into(out: &mut Vec<u8>, raw: &[u8]) -> Result<()> {
    let mut buf = JsonBuffer {
        buf: std::mem::take(out),
    };
    let res = buf.append_escaped(raw);
    *out = buf.buf;
    res
}

#[cfg(test)]
mod test {

    use super::*;

    fn escaped(raw: &[u8]) -> String {
        let mut out = Vec::new();
        escape_into(&mut out, raw).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn escape_table() {
        for b in 0u8..0x20 {
            assert!(needs_escape(b), "{:#x} should be escaped", b);
        }
        assert!(needs_escape(b'"'));
        assert!(needs_escape(b'\\'));
        assert!(!needs_escape(b' '));
        assert!(!needs_escape(b'/'));
        assert!(!needs_escape(0x7f));
        for b in 0x80u8..=0xff {
            assert!(!needs_escape(b));
        }
    }

    #[test]
    fn escapes() {
        assert_eq!(escaped(b""), "");
        assert_eq!(escaped(b"plain text"), "plain text");
        assert_eq!(
            escaped(b"Hi, \"quoted\" \n there"),
            "Hi, \\\"quoted\\\" \\n there"
        );
        assert_eq!(escaped(b"a\\b"), "a\\\\b");
        assert_eq!(escaped(b"\x08\x0c\r\t"), "\\b\\f\\r\\t");
        assert_eq!(escaped(b"\x00\x01\x1f"), "\\u0000\\u0001\\u001f");
        assert_eq!(escaped("Hello, 世界!".as_bytes()), "Hello, 世界!");
    }

    #[test]
    fn control_aggregate() {
        // Every control character from 0x01 through 0x1f, then a space
        let raw: Vec<u8> = (0x01u8..=0x20).collect();
        let golden = "\\u0001\\u0002\\u0003\\u0004\\u0005\\u0006\\u0007\\b\\t\\n\\u000b\\f\\r\
                      \\u000e\\u000f\\u0010\\u0011\\u0012\\u0013\\u0014\\u0015\\u0016\\u0017\
                      \\u0018\\u0019\\u001a\\u001b\\u001c\\u001d\\u001e\\u001f ";
        assert_eq!(escaped(&raw), golden);
    }

    #[test]
    fn round_trip() {
        // Every byte value that's legal in a Rust `str` should survive escaping & a JSON parse.
        let mut s = String::new();
        for c in (0u8..0x80).map(char::from) {
            s.push(c);
        }
        s.push_str("ünïcödé ✓ 🦀");
        let json = format!("\"{}\"", escaped(s.as_bytes()));
        let back: String = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn growth() {
        let mut buf = JsonBuffer::new();
        assert_eq!(buf.capacity(), 0);
        buf.ensure_capacity(10).unwrap();
        assert!(buf.capacity() >= 20);

        buf.push_raw(b"0123456789").unwrap();
        let cap = buf.capacity();
        // Geometric: asking for one more than what's free at least doubles what's in use
        buf.ensure_capacity(cap - buf.len() + 1).unwrap();
        assert!(buf.capacity() >= 2 * (cap + 1));
        assert_eq!(buf.as_bytes(), b"0123456789");
    }

    #[test]
    fn incremental_escape_growth() {
        let mut buf = JsonBuffer::with_capacity(4);
        let raw = vec![b'\n'; 100];
        buf.append_escaped(&raw).unwrap();
        assert_eq!(buf.len(), 200);
        assert!(buf.as_bytes().chunks(2).all(|c| c == b"\\n"));
    }

    #[test]
    fn usable_after_failed_growth() {
        let mut buf = JsonBuffer::new();
        {
            let mut obj = buf.reset().unwrap();
            obj.append("before", "failure").unwrap();
        }
        assert!(matches!(
            buf.ensure_capacity(usize::MAX),
            Err(Error::OutOfMemory { .. })
        ));
        // The next message starts over cleanly
        let mut obj = buf.reset().unwrap();
        obj.append("a", "b").unwrap();
        assert_eq!(obj.finalize().unwrap().as_bytes(), br#"{"a":"b"}"#.as_slice());
    }
}
