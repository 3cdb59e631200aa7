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

//! Walking `key, format, args...` sequences.
//!
//! After a message template has taken its arguments, whatever is left of the argument slice is
//! read as a run of fields: a key (a string), a printf template (also a string), and however many
//! arguments that template consumes. The run ends at the end of the slice, or at a [`Value::Null`]
//! in key position (the C convention of a trailing `NULL`).
//!
//! Each field's value is rendered into a single caller-supplied scratch `String` that's cleared &
//! reused for every field, so walking a sequence allocates only when a value outgrows everything
//! rendered before it.

use crate::{
    error::{Error, Result},
    printf::{self, Value},
};

/// Describe what's at `idx` for an error message
fn describe(args: &[Value<'_>], idx: usize) -> String {
    match args.get(idx) {
        Some(v) => format!("{:?}", v),
        None => "nothing".to_string(),
    }
}

/// Render the field starting at `args[pos]` into `scratch`.
///
/// Returns `None` at the end of the sequence, else the key & the index of the next field.
fn step<'a>(
    args: &[Value<'a>],
    pos: usize,
    scratch: &mut String,
) -> Result<Option<(&'a str, usize)>> {
    let key = match args.get(pos) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Str(key)) => *key,
        Some(other) => {
            return Err(Error::format(
                "",
                format!(
                    "field {} should begin with a string key, not {:?}",
                    pos, other
                ),
            ))
        }
    };
    let template = args.get(pos + 1).and_then(Value::as_str).ok_or_else(|| {
        Error::format(
            "",
            format!(
                "field {:?} needs a format string, found {}",
                key,
                describe(args, pos + 1)
            ),
        )
    })?;
    scratch.clear();
    let consumed = printf::format_into(scratch, template, &args[pos + 2..])?;
    Ok(Some((key, pos + 2 + consumed)))
}

/// Walk the fields in `args`, handing each `(key, value)` to `sink`; return the number of fields.
///
/// The first failure (from the template renderer or the sink) stops the walk & is returned.
/// Anything the sink already accepted stays accepted; callers building a single message discard
/// the whole thing.
///
/// ```rust
/// use syslog_cee::{fields::walk, printf::Value};
/// let args = [Value::from("answer"), Value::from("%d"), Value::from(42),
///             Value::from("who"), Value::from("me")];
/// let mut seen = Vec::new();
/// let mut scratch = String::new();
/// let n = walk(&args, &mut scratch, |k, v| { seen.push(format!("{}={}", k, v)); Ok(()) }).unwrap();
/// assert_eq!(n, 2);
/// assert_eq!(seen, vec!["answer=42", "who=me"]);
/// ```
pub fn walk<F>(args: &[Value<'_>], scratch: &mut String, mut sink: F) -> Result<usize>
where
    F: FnMut(&str, &str) -> Result<()>,
{
    let mut pos = 0;
    let mut count = 0;
    while let Some((key, next)) = step(args, pos, scratch)? {
        sink(key, scratch)?;
        pos = next;
        count += 1;
    }
    Ok(count)
}

/// An iterator over the fields in an argument sequence, yielding owned pairs.
///
/// After the first error, the iterator is exhausted.
pub struct Fields<'v, 'a> {
    args: &'v [Value<'a>],
    pos: usize,
    done: bool,
}

impl<'v, 'a> Fields<'v, 'a> {
    pub fn new(args: &'v [Value<'a>]) -> Fields<'v, 'a> {
        Fields {
            args,
            pos: 0,
            done: false,
        }
    }
}

impl<'v, 'a> Iterator for Fields<'v, 'a> {
    type Item = Result<(String, String)>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut value = String::new();
        match step(self.args, self.pos, &mut value) {
            Ok(Some((key, next))) => {
                self.pos = next;
                Some(Ok((key.to_string(), value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn collect(args: &[Value]) -> Result<Vec<(String, String)>> {
        Fields::new(args).collect()
    }

    #[test]
    fn additional_fields() {
        let args = [
            Value::from("random_number"),
            Value::from("%d"),
            Value::from(42),
            Value::from("random_string"),
            Value::from("fourty-two"),
            Value::Null,
        ];
        assert_eq!(
            collect(&args).unwrap(),
            vec![
                ("random_number".to_string(), "42".to_string()),
                ("random_string".to_string(), "fourty-two".to_string())
            ]
        );
    }

    #[test]
    fn empty_and_terminated() {
        assert!(collect(&[]).unwrap().is_empty());
        assert!(collect(&[Value::Null]).unwrap().is_empty());
        // Nothing after the NULL is looked at, not even garbage
        let args = [Value::from("k"), Value::from("v"), Value::Null, Value::from(1)];
        assert_eq!(collect(&args).unwrap().len(), 1);
    }

    #[test]
    fn multi_argument_values() {
        let args = [
            Value::from("range"),
            Value::from("%d..%d"),
            Value::from(1),
            Value::from(10),
            Value::from("padded"),
            Value::from("[%*s]"),
            Value::from(4),
            Value::from("x"),
        ];
        let mut scratch = String::from("leftovers");
        let mut seen = Vec::new();
        let n = walk(&args, &mut scratch, |k, v| {
            seen.push((k.to_string(), v.to_string()));
            Ok(())
        })
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(seen[0], ("range".to_string(), "1..10".to_string()));
        assert_eq!(seen[1], ("padded".to_string(), "[   x]".to_string()));
    }

    #[test]
    fn malformed() {
        // Non-string key
        assert!(collect(&[Value::from(1), Value::from("%d")]).is_err());
        // Key with no format
        assert!(collect(&[Value::from("lonely")]).is_err());
        // Format that wants more than there is
        assert!(collect(&[Value::from("k"), Value::from("%s")]).is_err());
        // The walk stops at the first failure; the sink saw only what came before it
        let args = [
            Value::from("good"),
            Value::from("ok"),
            Value::from("bad"),
            Value::from("%k"),
            Value::from("never"),
            Value::from("reached"),
        ];
        let mut keys = Vec::new();
        let mut scratch = String::new();
        let res = walk(&args, &mut scratch, |k, _| {
            keys.push(k.to_string());
            Ok(())
        });
        assert!(matches!(res, Err(Error::Format { .. })));
        assert_eq!(keys, vec!["good".to_string()]);
    }

    #[test]
    fn sink_errors_stop_the_walk() {
        let args = [Value::from("a"), Value::from("1"), Value::from("b"), Value::from("2")];
        let mut calls = 0;
        let mut scratch = String::new();
        let res = walk(&args, &mut scratch, |_, _| {
            calls += 1;
            Err(Error::format("", "sink full"))
        });
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
