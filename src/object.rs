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

//! Flat JSON objects, one key/value pair at a time.
//!
//! A [`JsonObject`] can only be had from [`JsonBuffer::reset`], and it holds the buffer's only
//! mutable borrow until [`JsonObject::finalize`] turns it into a read-only [`Finalized`]. Appending
//! to a finished object, or finishing one twice, are therefore compile-time errors rather than
//! runtime states to check for.
//!
//! While in progress, the buffer always ends in `{` (nothing appended yet) or `,` (after the last
//! member). Finalizing overwrites a trailing `,` with `}`, or appends `}` after a bare `{`, and
//! then writes a NUL that is not part of the JSON text but lets the result be handed to C as-is.

use crate::{buffer::JsonBuffer, error::Result};

use std::ffi::CStr;

/// A JSON object under construction.
pub struct JsonObject<'a> {
    buf: &'a mut JsonBuffer,
}

impl<'a> JsonObject<'a> {
    pub(crate) fn new(buf: &'a mut JsonBuffer) -> JsonObject<'a> {
        JsonObject { buf }
    }
    /// Append the member `"key":"value"`.
    ///
    /// Both strings are escaped. Should this fail (the buffer couldn't grow), the object is left
    /// exactly as it was before the call: a member is either written completely or not at all.
    pub fn append(&mut self, key: &str, value: &str) -> Result<()> {
        self.append_bytes(key.as_bytes(), value.as_bytes())
    }
    /// Append the member `"key":"value"` from raw bytes.
    pub fn append_bytes(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.transaction(|buf| {
            buf.push_raw(b"\"")?;
            buf.append_escaped(key)?;
            buf.push_raw(b"\":\"")?;
            buf.append_escaped(value)?;
            buf.push_raw(b"\",")
        })
    }
    /// Run `f` against the underlying buffer, rolling back everything it wrote if it fails.
    pub(crate) fn transaction<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut JsonBuffer) -> Result<()>,
    {
        let mark = self.buf.len();
        f(&mut *self.buf).map_err(|err| {
            self.buf.truncate(mark);
            err
        })
    }
    /// True if no members have been appended
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= 1
    }
    /// The number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    /// Close the object.
    pub fn finalize(self) -> Result<Finalized<'a>> {
        // Room for the closing brace & the NUL before touching anything
        self.buf.ensure_capacity(2)?;
        if self.buf.last() == Some(b',') {
            self.buf.set_last(b'}');
        } else {
            self.buf.push_raw(b"}")?;
        }
        self.buf.push_raw(b"\0")?;
        let buf: &'a JsonBuffer = self.buf;
        Ok(Finalized {
            bytes: buf.as_bytes(),
        })
    }
}

/// A complete JSON object, valid until its buffer is next reset.
#[derive(Clone, Copy)]
pub struct Finalized<'a> {
    /// The JSON text followed by a NUL
    bytes: &'a [u8],
}

impl<'a> Finalized<'a> {
    /// The JSON text (without the trailing NUL)
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.bytes[..self.bytes.len() - 1]
    }
    /// The JSON text, provided every key & value appended was valid UTF-8
    pub fn as_str(&self) -> std::result::Result<&'a str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }
    pub fn to_string_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
    /// The JSON text as a C string; control characters (NUL included) are always escaped, so
    /// there is never an interior NUL to cut it short.
    pub fn as_c_str(&self) -> &'a CStr {
        CStr::from_bytes_until_nul(self.bytes).unwrap_or_default()
    }
    /// Length of the JSON text in bytes
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> std::fmt::Display for Finalized<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl<'a> std::fmt::Debug for Finalized<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Finalized({:?})", self.to_string_lossy())
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::error::Error;

    fn build(buf: &mut JsonBuffer, pairs: &[(&str, &str)]) -> String {
        let mut obj = buf.reset().unwrap();
        for (k, v) in pairs {
            obj.append(k, v).unwrap();
        }
        obj.finalize().unwrap().as_str().unwrap().to_owned()
    }

    #[test]
    fn empty_object() {
        let mut buf = JsonBuffer::new();
        let obj = buf.reset().unwrap();
        assert!(obj.is_empty());
        let fin = obj.finalize().unwrap();
        assert_eq!(fin.as_bytes(), b"{}");
        assert_eq!(fin.as_c_str().to_bytes(), b"{}");
        assert_eq!(buf.as_bytes(), b"{}\0");
        assert!(buf.capacity() >= crate::buffer::BASELINE_CAPACITY);
    }

    #[test]
    fn one_pair() {
        let mut buf = JsonBuffer::new();
        assert_eq!(build(&mut buf, &[("a", "b")]), r#"{"a":"b"}"#);
        assert_eq!(build(&mut buf, &[("", "")]), r#"{"":""}"#);
        // Reset really does start over
        assert_eq!(build(&mut buf, &[]), "{}");
    }

    #[test]
    fn members_in_order_with_duplicates() {
        let mut buf = JsonBuffer::new();
        let text = build(
            &mut buf,
            &[("pid", "1"), ("msg", "Hi, \"quoted\" \n there"), ("pid", "2")],
        );
        assert_eq!(
            text,
            r#"{"pid":"1","msg":"Hi, \"quoted\" \n there","pid":"2"}"#
        );
        // ...and it's valid JSON (serde_json keeps the last duplicate)
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["msg"], "Hi, \"quoted\" \n there");
        assert_eq!(v["pid"], "2");
    }

    #[test]
    fn growth_is_transparent() {
        let big = "x".repeat(5000);
        let quoted = "\"".repeat(700);
        let pairs = [
            ("first", "1"),
            ("big", big.as_str()),
            ("quotes", quoted.as_str()),
            ("last", "ü"),
        ];
        let mut small = JsonBuffer::with_capacity(1);
        let mut roomy = JsonBuffer::with_capacity(64 * 1024);
        let a = build(&mut small, &pairs);
        let b = build(&mut roomy, &pairs);
        assert_eq!(a, b);
        assert!(a.starts_with(r#"{"first":"1","big":"xxx"#));
        let v: serde_json::Value = serde_json::from_str(&a).unwrap();
        assert_eq!(v["quotes"].as_str().unwrap(), quoted);
    }

    #[test]
    fn failed_append_rolls_back() {
        let mut buf = JsonBuffer::new();
        let mut obj = buf.reset().unwrap();
        obj.append("a", "b").unwrap();
        let before = obj.len();
        let res = obj.transaction(|b| {
            b.push_raw(b"\"half-a-key")?;
            Err(Error::format("", "simulated failure"))
        });
        assert!(res.is_err());
        assert_eq!(obj.len(), before);
        // Asking for more than could ever be allocated fails cleanly, too
        let res = obj.transaction(|b| b.ensure_capacity(usize::MAX));
        assert!(matches!(res, Err(Error::OutOfMemory { .. })));
        assert_eq!(
            obj.finalize().unwrap().as_bytes(),
            br#"{"a":"b"}"#.as_slice()
        );
    }

    #[test]
    fn binary_values() {
        let mut buf = JsonBuffer::new();
        let mut obj = buf.reset().unwrap();
        obj.append_bytes(b"k", b"\x00\xff").unwrap();
        let fin = obj.finalize().unwrap();
        assert_eq!(fin.as_bytes(), b"{\"k\":\"\\u0000\xff\"}");
        assert!(fin.as_str().is_err());
        // The escaped NUL doesn't truncate the C view
        assert_eq!(fin.as_c_str().to_bytes().len(), fin.len());
    }
}
