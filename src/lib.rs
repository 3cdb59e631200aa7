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

//! Structured syslog messages in the [CEE] "cookie + JSON" convention
//!
//! [CEE]: https://cee.mitre.org/
//!
//! # Introduction
//!
//! Classic `syslog(3)` takes a priority, a printf-style template & its arguments, and produces a
//! line of free text. That's fine for a human reading `/var/log/messages`, but anything that wants
//! to _process_ log messages has to parse that text back apart. The [CEE] convention (and the
//! [Lumberjack] project that adopted it) fixes this by sending a JSON object instead, marked by a
//! leading `@cee:` "cookie" so that syslog daemons such as [rsyslog] can recognize & parse it:
//!
//! [Lumberjack]: https://fedorahosted.org/lumberjack/
//! [rsyslog]: https://www.rsyslog.com/
//!
//! ```text
//! @cee:{"msg":"3 widgets","pid":"1234","facility":"user","priority":"info",...}
//! ```
//!
//! This crate is a drop-in for the `syslog(3)` family that produces such messages. Each one is
//! built from:
//!
//! 1. the rendered template, as `msg`
//!
//! 2. a set of fields discovered about the calling process: `pid`, `facility`, `priority`,
//!    `program`, `uid`, `gid`, `host` & `timestamp`
//!
//! 3. any number of caller fields, given as `key, format, args...` groups following the template's
//!    own arguments
//!
//! # Usage
//!
//! The [`shim`] module offers free functions over a process-wide default [`channel::Channel`]
//! that mirror `openlog(3)`, `syslog(3)`, `setlogmask(3)` & `closelog(3)`:
//!
//! ```rust
//! use syslog_cee::{cee_args, shim, discover::Options, facility::{Facility, Level}};
//!
//! shim::openlog(Some("my-daemon"), Options::LOG_PID, Facility::LOG_DAEMON).unwrap();
//! shim::syslog(Level::LOG_NOTICE, "%d widgets", &cee_args!(3, "color", "%s", "blue")).unwrap();
//! shim::closelog();
//! ```
//!
//! Programs already using [`tracing`] can instead install the [`layer::Layer`], which sends
//! each event's message & fields the same way:
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! ```rust
//! use tracing::info;
//! use syslog_cee::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = Registry::default().with(Layer::try_default().unwrap());
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! info!(color = "blue", "{} widgets", 3);
//! ```
//!
//! Where the messages go is up to the [`transport::Transport`]: by default the C library's own
//! `syslog(3)`, but also a Unix socket or UDP with [RFC 3164] framing.
//!
//! [RFC 3164]: https://datatracker.ietf.org/doc/html/rfc3164

pub mod buffer;
pub mod channel;
pub mod discover;
pub mod error;
pub mod facility;
pub mod fields;
pub mod layer;
pub mod object;
pub mod printf;
pub mod rfc3164;
pub mod shim;
pub mod transport;

/// The marker that precedes the JSON object in every structured message
pub const CEE_COOKIE: &str = "@cee:";

/// Build a `[Value; N]` from a list of expressions, for use as the arguments to a log call.
///
/// ```rust
/// use syslog_cee::{cee_args, printf::Value};
///
/// let args = cee_args!(1, "two", 3.0);
/// assert!(matches!(args[1], Value::Str("two")));
/// ```
#[macro_export]
macro_rules! cee_args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::printf::Value::from($arg)),*]
    };
}

/// Build (but don't send) a structured message on the default channel.
///
/// `cee_format!(priority, template, args...)` is shorthand for
/// [`shim::format`]`(priority, template, &cee_args!(args...))`.
#[macro_export]
macro_rules! cee_format {
    ($priority:expr, $template:expr $(, $arg:expr)* $(,)?) => {
        $crate::shim::format($priority, $template, &$crate::cee_args!($($arg),*))
    };
}

/// Send a structured message on the default channel.
///
/// `cee_syslog!(priority, template, args...)` is shorthand for
/// [`shim::syslog`]`(priority, template, &cee_args!(args...))`.
///
/// ```rust
/// use syslog_cee::{cee_syslog, facility::Level};
///
/// cee_syslog!(Level::LOG_INFO, "user %s logged in", "alice", "tty", "%d", 3).unwrap();
/// ```
#[macro_export]
macro_rules! cee_syslog {
    ($priority:expr, $template:expr $(, $arg:expr)* $(,)?) => {
        $crate::shim::syslog($priority, $template, &$crate::cee_args!($($arg),*))
    };
}

#[cfg(test)]
mod test {

    use crate::facility::Level;

    #[test]
    fn macros() {
        let text = cee_format!(Level::LOG_INFO, "%s=%d", "answer", 42, "unit", "%s", "none")
            .unwrap();
        // Formatting hands back the JSON alone; the cookie is added on the way to the transport
        assert!(!text.starts_with(crate::CEE_COOKIE));
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["msg"], "answer=42");
        assert_eq!(v["unit"], "none");

        let empty: [crate::printf::Value<'_>; 0] = cee_args!();
        assert!(empty.is_empty());
    }
}
