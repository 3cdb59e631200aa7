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

//! Context discovery: the fields every structured message gets for free.
//!
//! # Introduction
//!
//! Unless asked not to, each message is augmented with `pid`, `facility`, `priority`, `program`,
//! `uid`, `gid`, `host` & `timestamp` members. Most of these are constant for the life of the
//! process (or at least of a channel), so [`ChannelRecord::open`] looks them up once & caches
//! them; the [`Options`] passed to `open` can turn that off altogether ([`Options::NO_CACHE`]) or
//! just for the uid & gid ([`Options::NO_CACHE_UID`], for processes that change credentials).
//! Anything not cached is looked-up on each message.
//!
//! A [`ChannelRecord`] is immutable: opening or closing a channel produces a new one (see
//! [`crate::channel`]).

use crate::{
    error::Result,
    facility::{facility_name, priority_name, Facility, Priority},
};

use chrono::prelude::*;

use std::{fmt::Write, sync::OnceLock};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Options                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The `option` argument to `openlog(3)`, plus a few extensions.
///
/// ```rust
/// use syslog_cee::discover::Options;
/// let opts = Options::LOG_PID | Options::NO_TIME;
/// assert!(opts.contains(Options::NO_TIME));
/// assert!(!opts.contains(Options::NO_DISCOVER));
/// assert_eq!(opts.bits(), 0x201);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Options(i32);

impl Options {
    /// log the pid with each message
    pub const LOG_PID: Options = Options(0x01);
    /// log on the console if errors in sending
    pub const LOG_CONS: Options = Options(0x02);
    /// delay open until first syslog() (default)
    pub const LOG_ODELAY: Options = Options(0x04);
    /// don't delay open
    pub const LOG_NDELAY: Options = Options(0x08);
    /// don't wait for console forks: DEPRECATED
    pub const LOG_NOWAIT: Options = Options(0x10);
    /// log to stderr as well
    pub const LOG_PERROR: Options = Options(0x20);
    /// Don't add any discovered fields
    pub const NO_DISCOVER: Options = Options(0x40);
    /// Cache nothing: look-up the pid, hostname, uid & gid on every message
    pub const NO_CACHE: Options = Options(0x80);
    /// Look-up the uid & gid on every message
    pub const NO_CACHE_UID: Options = Options(0x100);
    /// Don't add a timestamp
    pub const NO_TIME: Options = Options(0x200);

    pub const fn empty() -> Options {
        Options(0)
    }
    pub const fn from_bits(bits: i32) -> Options {
        Options(bits)
    }
    pub const fn bits(&self) -> i32 {
        self.0
    }
    /// True if any of the bits in `other` are set
    pub const fn intersects(&self, other: Options) -> bool {
        self.0 & other.0 != 0
    }
    /// True if all of the bits in `other` are set
    pub const fn contains(&self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Options {
    type Output = Options;
    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0
    }
}

impl std::convert::From<i32> for Options {
    fn from(bits: i32) -> Self {
        Options(bits)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       identity look-ups                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Produce a [`Vec`] of bytes from an [`OsString`](std::ffi::OsString).
#[cfg(unix)]
fn bytes_from_os_str(s: std::ffi::OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    s.into_vec()
}

#[cfg(not(unix))]
fn bytes_from_os_str(s: std::ffi::OsString) -> Vec<u8> {
    s.to_string_lossy().as_bytes().to_vec()
}

fn current_pid() -> u32 {
    std::process::id()
}

fn current_uid() -> u32 {
    // SAFETY: getuid(2) always succeeds & touches no memory of ours
    unsafe { libc::getuid() }
}

fn current_gid() -> u32 {
    // SAFETY: as for getuid
    unsafe { libc::getgid() }
}

/// This host's name, or failing that, an IP address for it
fn current_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|hn| String::from_utf8_lossy(&bytes_from_os_str(hn)).into_owned())
        .filter(|hn| !hn.is_empty())
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()))
}

/// The file name of the running executable, looked-up once
fn executable_name() -> Option<&'static str> {
    static NAME: OnceLock<Option<String>> = OnceLock::new();
    NAME.get_or_init(|| {
        std::env::current_exe().ok().and_then(|pbuf| {
            pbuf.file_name().map(|os| {
                String::from_utf8_lossy(&bytes_from_os_str(os.to_os_string())).into_owned()
            })
        })
    })
    .as_deref()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       struct ChannelRecord                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The per-channel state consulted on every message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelRecord {
    ident: Option<String>,
    options: Options,
    facility: Facility,
    pid: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    hostname: Option<String>,
}

impl ChannelRecord {
    /// A record for a channel that hasn't been opened: nothing cached, no ident
    pub fn new(options: Options, facility: Facility) -> ChannelRecord {
        ChannelRecord {
            options,
            facility,
            ..Default::default()
        }
    }
    /// The record for a freshly-opened channel.
    ///
    /// The pid & hostname are cached unless `options` include [`Options::NO_DISCOVER`] or
    /// [`Options::NO_CACHE`]; the uid & gid likewise, and also not under
    /// [`Options::NO_CACHE_UID`].
    pub fn open(ident: Option<&str>, options: Options, facility: Facility) -> ChannelRecord {
        let no_cache = options.intersects(Options::NO_DISCOVER | Options::NO_CACHE);
        let no_cache_uid = no_cache || options.contains(Options::NO_CACHE_UID);
        ChannelRecord {
            ident: ident.map(String::from),
            options,
            facility,
            pid: (!no_cache).then(current_pid),
            uid: (!no_cache_uid).then(current_uid),
            gid: (!no_cache_uid).then(current_gid),
            hostname: if no_cache { None } else { current_hostname() },
        }
    }
    /// The record for this channel after it's been closed: the ident & every cached value are
    /// forgotten, but the options & facility are kept.
    pub fn closed(&self) -> ChannelRecord {
        ChannelRecord::new(self.options, self.facility)
    }
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }
    pub fn options(&self) -> Options {
        self.options
    }
    pub fn facility(&self) -> Facility {
        self.facility
    }
    pub fn pid(&self) -> u32 {
        self.pid.unwrap_or_else(current_pid)
    }
    pub fn uid(&self) -> u32 {
        self.uid.unwrap_or_else(current_uid)
    }
    pub fn gid(&self) -> u32 {
        self.gid.unwrap_or_else(current_gid)
    }
    pub fn hostname(&self) -> Option<String> {
        self.hostname.clone().or_else(current_hostname)
    }
    /// The ident if one was given, else the executable's name
    pub fn program(&self) -> Option<&str> {
        self.ident.as_deref().or_else(|| executable_name())
    }
    /// True if anything at all has been cached
    pub fn is_cached(&self) -> bool {
        self.pid.is_some() || self.uid.is_some() || self.gid.is_some() || self.hostname.is_some()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           discovery                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Write `when` as `YYYY-MM-DDThh:mm:ss.nnnnnnnnn±hhmm`.
///
/// ```rust
/// use chrono::prelude::*;
/// use syslog_cee::discover::timestamp_into;
/// let tz = FixedOffset::east_opt(2 * 3600).unwrap();
/// let when = tz.with_ymd_and_hms(2012, 3, 4, 5, 6, 7).unwrap();
/// let mut out = String::new();
/// timestamp_into(&mut out, &when);
/// assert_eq!(out, "2012-03-04T05:06:07.000000000+0200");
/// ```
pub fn timestamp_into<Tz>(out: &mut String, when: &DateTime<Tz>)
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    // Writing to a `String` can't fail
    let _ = write!(out, "{}", when.format("%Y-%m-%dT%H:%M:%S%.9f%z"));
}

/// Render `value` into `scratch` (cleared first) & return the result.
fn render<T: std::fmt::Display>(scratch: &mut String, value: T) -> &str {
    scratch.clear();
    let _ = write!(scratch, "{}", value);
    scratch.as_str()
}

/// Hand the discovered fields for a message at `priority` to `sink`, in order.
///
/// `priority` is the priority the message was logged at; if it carries no facility, the
/// channel's is reported. The `program` member is left out when there's neither an ident nor a
/// discoverable executable name, and the `host` member when no hostname or address can be had.
pub fn discover<F>(
    record: &ChannelRecord,
    priority: Priority,
    scratch: &mut String,
    mut sink: F,
) -> Result<()>
where
    F: FnMut(&str, &str) -> Result<()>,
{
    if record.options.contains(Options::NO_DISCOVER) {
        return Ok(());
    }
    let facility = match priority.facility_bits() {
        0 => record.facility as i32,
        bits => bits,
    };

    sink("pid", render(scratch, record.pid()))?;
    sink("facility", facility_name(facility))?;
    sink("priority", priority_name(priority.level_bits()))?;
    if let Some(program) = record.program() {
        sink("program", program)?;
    }
    sink("uid", render(scratch, record.uid()))?;
    sink("gid", render(scratch, record.gid()))?;
    if let Some(host) = record.hostname() {
        sink("host", &host)?;
    }
    if !record.options.contains(Options::NO_TIME) {
        scratch.clear();
        timestamp_into(scratch, &Local::now());
        sink("timestamp", scratch)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::facility::Level;

    fn collect(record: &ChannelRecord, priority: Priority) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut scratch = String::new();
        discover(record, priority, &mut scratch, |k, v| {
            out.push((k.to_string(), v.to_string()));
            Ok(())
        })
        .unwrap();
        out
    }

    fn keys(fields: &[(String, String)]) -> Vec<&str> {
        fields
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| *k != "host")
            .collect()
    }

    fn value<'a>(fields: &'a [(String, String)], key: &str) -> &'a str {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn open_caches() {
        let rec = ChannelRecord::open(Some("svc"), Options::empty(), Facility::LOG_LOCAL0);
        assert_eq!(rec.pid, Some(std::process::id()));
        assert!(rec.uid.is_some() && rec.gid.is_some());
        assert_eq!(rec.ident(), Some("svc"));
        assert_eq!(rec.program(), Some("svc"));

        let rec = ChannelRecord::open(None, Options::NO_CACHE, Facility::LOG_USER);
        assert!(rec.pid.is_none() && rec.uid.is_none() && rec.hostname.is_none());
        // ...but the values are still there when asked for
        assert_eq!(rec.pid(), std::process::id());

        let rec = ChannelRecord::open(None, Options::NO_CACHE_UID, Facility::LOG_USER);
        assert!(rec.pid.is_some());
        assert!(rec.uid.is_none() && rec.gid.is_none());

        let rec = ChannelRecord::open(None, Options::NO_DISCOVER, Facility::LOG_USER);
        assert!(!rec.is_cached());
    }

    #[test]
    fn close_forgets() {
        let opts = Options::LOG_PID | Options::NO_TIME;
        let rec = ChannelRecord::open(Some("svc"), opts, Facility::LOG_DAEMON);
        let closed = rec.closed();
        assert_eq!(closed.ident(), None);
        assert!(!closed.is_cached());
        assert_eq!(closed.options(), opts);
        assert_eq!(closed.facility(), Facility::LOG_DAEMON);
        // Closing twice changes nothing
        assert_eq!(closed.closed(), closed);
    }

    #[test]
    fn discovered_fields() {
        let rec = ChannelRecord::open(Some("svc"), Options::empty(), Facility::LOG_LOCAL0);
        let fields = collect(&rec, Level::LOG_DEBUG.into());
        assert_eq!(
            keys(&fields),
            vec!["pid", "facility", "priority", "program", "uid", "gid", "timestamp"]
        );
        assert_eq!(value(&fields, "pid"), std::process::id().to_string());
        assert_eq!(value(&fields, "facility"), "local0");
        assert_eq!(value(&fields, "priority"), "debug");
        assert_eq!(value(&fields, "program"), "svc");
        assert_eq!(value(&fields, "uid"), rec.uid().to_string());
        let ts = value(&fields, "timestamp");
        assert!(DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.9f%z").is_ok());
        assert_eq!(ts.len(), "2012-03-04T05:06:07.000000000+0200".len());
    }

    #[test]
    fn facility_in_priority_wins() {
        let rec = ChannelRecord::open(None, Options::NO_TIME, Facility::LOG_LOCAL0);
        let fields = collect(&rec, Level::LOG_WARNING | Facility::LOG_AUTH);
        assert_eq!(value(&fields, "facility"), "auth");
        assert_eq!(value(&fields, "priority"), "warn");
        assert!(fields.iter().all(|(k, _)| k != "timestamp"));
        // Facilities missing from the name table
        let fields = collect(&rec, Level::LOG_ERR | Facility::LOG_NTP);
        assert_eq!(value(&fields, "facility"), "<unknown>");
        assert_eq!(value(&fields, "priority"), "err");
    }

    #[test]
    fn no_discover() {
        let rec = ChannelRecord::open(Some("svc"), Options::NO_DISCOVER, Facility::LOG_LOCAL0);
        assert!(collect(&rec, Level::LOG_INFO.into()).is_empty());
    }

    #[test]
    fn timestamps() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let when = tz
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 3)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let mut out = String::new();
        timestamp_into(&mut out, &when);
        assert_eq!(out, "2024-03-09T07:05:03.123456789-0500");
    }
}
