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

//! syslog facility, level & priority defintions.
//!
//! [`Facility`] and [`Level`] replicate the names used in `<syslog.h>`. A [`Priority`] is the
//! classic `int priority` argument to `syslog(3)`: a level in the low three bits, optionally OR-ed
//! with a facility.
//!
//! The symbolic names that show up in the `facility` & `priority` members of each message ("user",
//! "local0", "debug", ...) come from [`FACILITY_NAMES`] & [`PRIORITY_NAMES`], which replicate the
//! `facilitynames` & `prioritynames` tables `<syslog.h>` provides under `SYSLOG_NAMES`. Lookups
//! take the first entry with a matching value, so aliases ("security", "panic", "error") are never
//! produced, and values not in the table render as [`UNKNOWN_NAME`].

type StdResult<T, E> = std::result::Result<T, E>;

/// Both RFCs [5424] & [3164] define twenty-four "facilities" for messages. The enumeration values
/// duplicate the constants defined in `<syslog.h>`, albeit multiplied by 8 for convenience in
/// forming syslog priorities (which again mirrors the `#define`s in `<syslog.h>`).
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Facility {
    /// kernel messages
    LOG_KERN = 0 << 3,
    /// random user-level messages
    LOG_USER = 1 << 3,
    /// mail system
    LOG_MAIL = 2 << 3,
    /// system daemons
    LOG_DAEMON = 3 << 3,
    /// security/authorization messages
    LOG_AUTH = 4 << 3,
    /// messages generated internally by syslogd
    LOG_SYSLOG = 5 << 3,
    /// line printer subsystem
    LOG_LPR = 6 << 3,
    /// network news subsystem
    LOG_NEWS = 7 << 3,
    /// UUCP subsystem
    LOG_UUCP = 8 << 3,
    /// clock daemon
    LOG_CRON = 9 << 3,
    /// security/authorization messages (private)
    LOG_AUTHPRIV = 10 << 3,
    /// ftp daemon
    LOG_FTP = 11 << 3,
    /// NTP subsystem
    LOG_NTP = 12 << 3,
    /// Log Audit
    LOG_AUDIT = 13 << 3,
    /// Log Alert
    LOG_ALERT = 14 << 3,
    /// clock daemon (alternate)
    LOG_CLOCK = 15 << 3,
    /// reserved for local use
    LOG_LOCAL0 = 16 << 3,
    /// reserved for local use
    LOG_LOCAL1 = 17 << 3,
    /// reserved for local use
    LOG_LOCAL2 = 18 << 3,
    /// reserved for local use
    LOG_LOCAL3 = 19 << 3,
    /// reserved for local use
    LOG_LOCAL4 = 20 << 3,
    /// reserved for local use
    LOG_LOCAL5 = 21 << 3,
    /// reserved for local use
    LOG_LOCAL6 = 22 << 3,
    /// reserved for local use
    LOG_LOCAL7 = 23 << 3,
}

impl std::default::Default for Facility {
    /// The default facility is `LOG_USER`.
    fn default() -> Self {
        Facility::LOG_USER
    }
}

const ALL_FACILITIES: [Facility; 24] = [
    Facility::LOG_KERN,
    Facility::LOG_USER,
    Facility::LOG_MAIL,
    Facility::LOG_DAEMON,
    Facility::LOG_AUTH,
    Facility::LOG_SYSLOG,
    Facility::LOG_LPR,
    Facility::LOG_NEWS,
    Facility::LOG_UUCP,
    Facility::LOG_CRON,
    Facility::LOG_AUTHPRIV,
    Facility::LOG_FTP,
    Facility::LOG_NTP,
    Facility::LOG_AUDIT,
    Facility::LOG_ALERT,
    Facility::LOG_CLOCK,
    Facility::LOG_LOCAL0,
    Facility::LOG_LOCAL1,
    Facility::LOG_LOCAL2,
    Facility::LOG_LOCAL3,
    Facility::LOG_LOCAL4,
    Facility::LOG_LOCAL5,
    Facility::LOG_LOCAL6,
    Facility::LOG_LOCAL7,
];

impl Facility {
    /// Recover a [`Facility`] from the facility bits of a priority (`priority & LOG_FACMASK`).
    pub fn from_bits(bits: i32) -> Option<Facility> {
        let bits = bits & LOG_FACMASK;
        ALL_FACILITIES.iter().copied().find(|f| *f as i32 == bits)
    }
    /// The symbolic name of this facility, as it appears in the `facility` member ("local0", ...).
    pub fn name(&self) -> &'static str {
        facility_name(*self as i32)
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Facility::LOG_KERN => "LOG_KERN",
                Facility::LOG_USER => "LOG_USER",
                Facility::LOG_MAIL => "LOG_MAIL",
                Facility::LOG_DAEMON => "LOG_DAEMON",
                Facility::LOG_AUTH => "LOG_AUTH",
                Facility::LOG_SYSLOG => "LOG_SYSLOG",
                Facility::LOG_LPR => "LOG_LPR",
                Facility::LOG_NEWS => "LOG_NEWS",
                Facility::LOG_UUCP => "LOG_UUCP",
                Facility::LOG_CRON => "LOG_CRON",
                Facility::LOG_AUTHPRIV => "LOG_AUTHPRIV",
                Facility::LOG_FTP => "LOG_FTP",
                Facility::LOG_NTP => "LOG_NTP",
                Facility::LOG_AUDIT => "LOG_AUDIT",
                Facility::LOG_ALERT => "LOG_ALERT",
                Facility::LOG_CLOCK => "LOG_CLOCK",
                Facility::LOG_LOCAL0 => "LOG_LOCAL0",
                Facility::LOG_LOCAL1 => "LOG_LOCAL1",
                Facility::LOG_LOCAL2 => "LOG_LOCAL2",
                Facility::LOG_LOCAL3 => "LOG_LOCAL3",
                Facility::LOG_LOCAL4 => "LOG_LOCAL4",
                Facility::LOG_LOCAL5 => "LOG_LOCAL5",
                Facility::LOG_LOCAL6 => "LOG_LOCAL6",
                Facility::LOG_LOCAL7 => "LOG_LOCAL7",
            }
        )
    }
}

/// Both RFCs [5424] & [3164] define eight severity levels for messages. The enumeration values
/// duplicate the constants documented as per the `syslog()` manual [page] & defined in
/// `<syslog.h>`.
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

impl Level {
    /// Recover a [`Level`] from the low three bits of a priority.
    pub fn from_bits(bits: i32) -> Level {
        match bits & LOG_PRIMASK {
            0 => Level::LOG_EMERG,
            1 => Level::LOG_ALERT,
            2 => Level::LOG_CRIT,
            3 => Level::LOG_ERR,
            4 => Level::LOG_WARNING,
            5 => Level::LOG_NOTICE,
            6 => Level::LOG_INFO,
            _ => Level::LOG_DEBUG,
        }
    }
    /// The symbolic name of this level, as it appears in the `priority` member ("debug", ...).
    pub fn name(&self) -> &'static str {
        priority_name(*self as i32)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           priorities                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Mask selecting the level bits of a priority
pub const LOG_PRIMASK: i32 = 0x07;
/// Mask selecting the facility bits of a priority
pub const LOG_FACMASK: i32 = 0x03f8;

/// A syslog priority: the `int priority` argument to `syslog(3)`.
///
/// Build one from a [`Level`] alone (in which case the channel's default facility applies), or by
/// OR-ing a [`Level`] with a [`Facility`]:
///
/// ```rust
/// use syslog_cee::facility::{Facility, Level, Priority};
/// let p = Level::LOG_INFO | Facility::LOG_LOCAL0;
/// assert_eq!(p.level(), Level::LOG_INFO);
/// assert_eq!(p.facility(), Some(Facility::LOG_LOCAL0));
/// assert_eq!(Priority::from(Level::LOG_INFO).facility_bits(), 0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Priority(i32);

impl Priority {
    /// Wrap a raw `syslog(3)` priority
    pub const fn from_raw(raw: i32) -> Priority {
        Priority(raw)
    }
    pub const fn raw(&self) -> i32 {
        self.0
    }
    pub const fn level_bits(&self) -> i32 {
        self.0 & LOG_PRIMASK
    }
    pub const fn facility_bits(&self) -> i32 {
        self.0 & LOG_FACMASK
    }
    pub fn level(&self) -> Level {
        Level::from_bits(self.0)
    }
    /// The facility explicitly carried by this priority, if any
    pub fn facility(&self) -> Option<Facility> {
        match self.facility_bits() {
            0 => None,
            bits => Facility::from_bits(bits),
        }
    }
    /// This priority with `facility` filled-in if it carries none of its own
    pub fn or_facility(&self, facility: Facility) -> Priority {
        if self.facility_bits() == 0 {
            Priority(self.0 | facility as i32)
        } else {
            *self
        }
    }
}

impl std::convert::From<Level> for Priority {
    fn from(level: Level) -> Self {
        Priority(level as i32)
    }
}

impl std::ops::BitOr<Facility> for Level {
    type Output = Priority;
    fn bitor(self, rhs: Facility) -> Priority {
        Priority(self as i32 | rhs as i32)
    }
}

impl std::ops::BitOr<Level> for Facility {
    type Output = Priority;
    fn bitor(self, rhs: Level) -> Priority {
        Priority(self as i32 | rhs as i32)
    }
}

/// The `LOG_MASK` macro: the mask bit for a single level
pub const fn log_mask(level: Level) -> i32 {
    1 << (level as i32)
}

/// The `LOG_UPTO` macro: the mask enabling every level up to & including `level`
pub const fn log_upto(level: Level) -> i32 {
    (1 << ((level as i32) + 1)) - 1
}

/// The mask enabling every level
pub const LOG_ALL_LEVELS: i32 = log_upto(Level::LOG_DEBUG);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          name tables                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Rendered in place of a facility or priority that has no entry in the name tables
pub const UNKNOWN_NAME: &str = "<unknown>";

/// `INTERNAL_MARK` in `<syslog.h>`: one past the last facility
const INTERNAL_MARK: i32 = 24 << 3;
/// `INTERNAL_NOPRI` in `<syslog.h>`
const INTERNAL_NOPRI: i32 = 0x10;

/// The `facilitynames` table from `<syslog.h>`, in its original order
pub const FACILITY_NAMES: &[(&str, i32)] = &[
    ("auth", Facility::LOG_AUTH as i32),
    ("authpriv", Facility::LOG_AUTHPRIV as i32),
    ("cron", Facility::LOG_CRON as i32),
    ("daemon", Facility::LOG_DAEMON as i32),
    ("ftp", Facility::LOG_FTP as i32),
    ("kern", Facility::LOG_KERN as i32),
    ("lpr", Facility::LOG_LPR as i32),
    ("mail", Facility::LOG_MAIL as i32),
    ("mark", INTERNAL_MARK),
    ("news", Facility::LOG_NEWS as i32),
    ("security", Facility::LOG_AUTH as i32),
    ("syslog", Facility::LOG_SYSLOG as i32),
    ("user", Facility::LOG_USER as i32),
    ("uucp", Facility::LOG_UUCP as i32),
    ("local0", Facility::LOG_LOCAL0 as i32),
    ("local1", Facility::LOG_LOCAL1 as i32),
    ("local2", Facility::LOG_LOCAL2 as i32),
    ("local3", Facility::LOG_LOCAL3 as i32),
    ("local4", Facility::LOG_LOCAL4 as i32),
    ("local5", Facility::LOG_LOCAL5 as i32),
    ("local6", Facility::LOG_LOCAL6 as i32),
    ("local7", Facility::LOG_LOCAL7 as i32),
];

/// The `prioritynames` table from `<syslog.h>`, in its original order
pub const PRIORITY_NAMES: &[(&str, i32)] = &[
    ("alert", Level::LOG_ALERT as i32),
    ("crit", Level::LOG_CRIT as i32),
    ("debug", Level::LOG_DEBUG as i32),
    ("emerg", Level::LOG_EMERG as i32),
    ("err", Level::LOG_ERR as i32),
    ("error", Level::LOG_ERR as i32),
    ("info", Level::LOG_INFO as i32),
    ("none", INTERNAL_NOPRI),
    ("notice", Level::LOG_NOTICE as i32),
    ("panic", Level::LOG_EMERG as i32),
    ("warn", Level::LOG_WARNING as i32),
    ("warning", Level::LOG_WARNING as i32),
];

fn lookup(table: &'static [(&'static str, i32)], value: i32) -> &'static str {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(name, _)| *name)
        .unwrap_or(UNKNOWN_NAME)
}

/// Name the facility in `bits` (which must already be masked & shifted, i.e. `LOG_LOCAL0` rather
/// than 16)
pub fn facility_name(bits: i32) -> &'static str {
    lookup(FACILITY_NAMES, bits)
}

/// Name the level in `bits`
pub fn priority_name(bits: i32) -> &'static str {
    lookup(PRIORITY_NAMES, bits)
}

#[cfg(test)]
mod facility_level_tests {
    use super::*;
    /// Test basic PRI formatting
    #[test]
    fn test_pri() {
        assert_eq!(14, (Level::LOG_INFO | Facility::LOG_USER).raw());
        assert_eq!(format!("{}", Facility::LOG_FTP), "LOG_FTP".to_string());
        assert_eq!(format!("{:?}", Facility::LOG_FTP), "LOG_FTP".to_string());
    }

    #[test]
    fn test_names() {
        assert_eq!(Facility::LOG_LOCAL0.name(), "local0");
        assert_eq!(Facility::LOG_AUTH.name(), "auth");
        assert_eq!(Facility::LOG_USER.name(), "user");
        // Not in the classic table
        assert_eq!(Facility::LOG_NTP.name(), UNKNOWN_NAME);
        assert_eq!(Level::LOG_DEBUG.name(), "debug");
        assert_eq!(Level::LOG_ERR.name(), "err");
        assert_eq!(Level::LOG_WARNING.name(), "warn");
        assert_eq!(Level::LOG_EMERG.name(), "emerg");
        assert_eq!(facility_name(0x3f8), UNKNOWN_NAME);
    }

    #[test]
    fn test_priority() {
        let p = Priority::from_raw(Facility::LOG_LOCAL3 as i32 | Level::LOG_NOTICE as i32);
        assert_eq!(p.level(), Level::LOG_NOTICE);
        assert_eq!(p.facility(), Some(Facility::LOG_LOCAL3));
        assert_eq!(p.or_facility(Facility::LOG_MAIL), p);

        let p = Priority::from(Level::LOG_CRIT);
        assert_eq!(p.facility(), None);
        assert_eq!(
            p.or_facility(Facility::LOG_MAIL).facility(),
            Some(Facility::LOG_MAIL)
        );

        assert_eq!(log_mask(Level::LOG_EMERG), 1);
        assert_eq!(log_upto(Level::LOG_ERR), 0x0f);
        assert_eq!(LOG_ALL_LEVELS, 0xff);
    }
}
