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

//! `syslog(3)`-shaped free functions over a process-wide default channel.
//!
//! Programs written against the classic `openlog`/`syslog`/`closelog`/`setlogmask` interface can
//! switch to structured messages by calling these instead. They all operate on a single
//! [`Channel`] over [`LibcSyslog`], created on first use, so messages land wherever the system
//! logger sends them. [`syslog`] speaks the structured calling convention (the message template
//! may be followed by `key, format, args...` fields); [`legacy_syslog`] keeps the exact
//! `syslog(3)` contract.
//!
//! ```rust
//! use syslog_cee::{cee_args, shim, discover::Options, facility::{Facility, Level}};
//!
//! shim::openlog(Some("shim-doc"), Options::LOG_PID, Facility::LOG_LOCAL0).unwrap();
//! shim::syslog(Level::LOG_INFO, "%d items processed", &cee_args!(17, "batch", "%s", "b-42"))
//!     .unwrap();
//! shim::closelog();
//! ```

use crate::{
    channel::Channel,
    discover::Options,
    error::Result,
    facility::{Facility, Priority},
    printf::Value,
    transport::LibcSyslog,
};

use std::sync::OnceLock;

/// The process-wide default channel
pub fn default_channel() -> &'static Channel<LibcSyslog> {
    static DEFAULT: OnceLock<Channel<LibcSyslog>> = OnceLock::new();
    DEFAULT.get_or_init(|| Channel::new(LibcSyslog::new()))
}

/// Open the default channel; see [`Channel::open`]
pub fn openlog(ident: Option<&str>, options: Options, facility: Facility) -> Result<()> {
    default_channel().open(ident, options, facility)
}

/// Close the default channel
pub fn closelog() {
    // `LibcSyslog` can't fail to close
    let _ = default_channel().close();
}

/// Set the default channel's mask, returning the previous one (zero just queries)
pub fn setlogmask(mask: i32) -> i32 {
    default_channel().set_mask(mask)
}

/// Build, but don't send, the message [`syslog`] would send
pub fn format<P: Into<Priority>>(
    priority: P,
    template: &str,
    args: &[Value<'_>],
) -> Result<String> {
    default_channel().format(priority, template, args)
}

/// Send a structured message on the default channel
pub fn syslog<P: Into<Priority>>(priority: P, template: &str, args: &[Value<'_>]) -> Result<()> {
    default_channel().emit(priority, template, args)
}

/// Send a structured message on the default channel, with `syslog(3)` semantics: trailing fields
/// are ignored, a message that can't be built is sent as plain text, and nothing is reported.
pub fn legacy_syslog<P: Into<Priority>>(priority: P, template: &str, args: &[Value<'_>]) {
    default_channel().legacy_emit(priority, template, args)
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{
        cee_args,
        facility::{log_upto, Level, LOG_ALL_LEVELS},
    };

    // The default channel is shared by the whole process, so everything that touches it lives in
    // this one test.
    #[test]
    fn default_channel_lifecycle() {
        openlog(Some("shim-test"), Options::NO_DISCOVER, Facility::LOG_LOCAL0).unwrap();
        assert_eq!(default_channel().record().ident(), Some("shim-test"));

        assert_eq!(
            format(Level::LOG_INFO, "%s, %s!", &cee_args!("hello", "world", "k", "%x", 255))
                .unwrap(),
            r#"{"msg":"hello, world!","k":"ff"}"#
        );
        syslog(Level::LOG_DEBUG, "from the shim test", &[]).unwrap();
        legacy_syslog(Level::LOG_DEBUG, "from the %s test", &cee_args!("shim"));
        assert!(syslog(Level::LOG_DEBUG, "%s", &[]).is_err());

        let prev = setlogmask(log_upto(Level::LOG_ERR));
        assert_eq!(setlogmask(0), log_upto(Level::LOG_ERR));
        assert_eq!(setlogmask(prev), log_upto(Level::LOG_ERR));
        assert_eq!(prev, LOG_ALL_LEVELS);

        closelog();
        assert_eq!(default_channel().record().ident(), None);
        assert!(openlog(Some("bad\0ident"), Options::empty(), Facility::LOG_USER).is_err());
    }
}
