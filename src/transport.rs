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

//! The syslog transport layer.
//!
//! This module defines the [`Transport`] trait through which a [`Channel`](crate::channel::Channel)
//! hands off each finished message, along with three implementations:
//!
//! - [`LibcSyslog`]: the C library's own `syslog(3)` (the usual choice; messages end up wherever
//!   the system logger would have put them anyway)
//! - [`UnixSocket`]: RFC 3164 datagrams straight to a Unix socket (`/dev/log` by default)
//! - [`UdpTransport`]: RFC 3164 datagrams over UDP (`localhost:514` by default)
//!
//! # Examples
//!
//! To send messages over UDP to a daemon listening on port 514 (the default) on localhost:
//!
//! ```rust
//! use syslog_cee::transport::UdpTransport;
//! let transpo = UdpTransport::local().unwrap();
//! ```
//!
//! On a non-standard port on another host:
//!
//! ```rust
//! use syslog_cee::transport::UdpTransport;
//! let transpo = UdpTransport::new("some-host.domain.io:5514");
//! assert!(transpo.is_err()); // no such host, after all
//! ```

use crate::{
    discover::Options,
    error::{Error, Result},
    facility::{Facility, Priority},
    rfc3164::Rfc3164,
};

use backtrace::Backtrace;
use chrono::prelude::*;

use std::{
    ffi::CString,
    os::unix::net::UnixDatagram,
    path::Path,
    sync::{Mutex, PoisonError},
};

/// Everything a transport needs to know about one message.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    /// The message priority, with the channel's facility filled-in if the caller gave none
    pub priority: Priority,
    /// The channel's ident, if it has one
    pub ident: Option<&'a str>,
    /// Present if the channel was opened with [`Options::LOG_PID`]
    pub pid: Option<u32>,
    pub timestamp: DateTime<Local>,
    /// [`CEE_COOKIE`](crate::CEE_COOKIE) for structured messages, empty for raw ones
    pub prefix: &'a str,
    /// The message proper (JSON for structured messages); not NUL-terminated
    pub message: &'a [u8],
}

/// Operations all transport layers must support.
///
/// Only [`Transport::send`] is required; the other methods are called as the channel is opened,
/// closed or re-masked, for the benefit of transports (like [`LibcSyslog`]) that keep state of
/// their own.
pub trait Transport {
    /// Send one message; return the number of bytes written.
    fn send(&self, record: &Record<'_>) -> Result<usize>;
    fn open(&self, _ident: Option<&str>, _options: Options, _facility: Facility) -> Result<()> {
        Ok(())
    }
    fn close(&self) -> Result<()> {
        Ok(())
    }
    fn set_mask(&self, _mask: i32) {}
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, record: &Record<'_>) -> Result<usize> {
        (**self).send(record)
    }
    fn open(&self, ident: Option<&str>, options: Options, facility: Facility) -> Result<()> {
        (**self).open(ident, options, facility)
    }
    fn close(&self) -> Result<()> {
        (**self).close()
    }
    fn set_mask(&self, mask: i32) {
        (**self).set_mask(mask)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          libc syslog                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The standard `openlog`/`syslog`/`closelog` options; anything above these is ours
const LIBC_OPTIONS_MASK: i32 = 0x3f;

/// Sending messages through the C library's `syslog(3)`.
///
/// `openlog(3)` keeps the ident pointer it's given rather than copying the string, so the
/// [`CString`] backing it is held here until the channel is closed or re-opened.
#[derive(Debug, Default)]
pub struct LibcSyslog {
    ident: Mutex<Option<CString>>,
}

impl LibcSyslog {
    pub fn new() -> LibcSyslog {
        LibcSyslog::default()
    }
}

impl Transport for LibcSyslog {
    fn send(&self, record: &Record<'_>) -> Result<usize> {
        let prefix_len = libc::c_int::try_from(record.prefix.len()).unwrap_or(libc::c_int::MAX);
        let message_len = libc::c_int::try_from(record.message.len()).unwrap_or(libc::c_int::MAX);
        // SAFETY: the format is a NUL-terminated literal, & each `%.*s` is bounded by the length
        // of the slice it's paired with, so syslog(3) never reads past either.
        unsafe {
            libc::syslog(
                record.priority.raw(),
                b"%.*s%.*s\0".as_ptr() as *const libc::c_char,
                prefix_len,
                record.prefix.as_ptr() as *const libc::c_char,
                message_len,
                record.message.as_ptr() as *const libc::c_char,
            );
        }
        Ok(record.prefix.len() + record.message.len())
    }
    fn open(&self, ident: Option<&str>, options: Options, facility: Facility) -> Result<()> {
        let ident = ident
            .map(|name| {
                CString::new(name).map_err(|_| Error::BadIdent {
                    name: name.to_string(),
                    back: Backtrace::new(),
                })
            })
            .transpose()?;
        let mut guard = self.ident.lock().unwrap_or_else(PoisonError::into_inner);
        let ptr = ident
            .as_ref()
            .map(|c| c.as_ptr())
            .unwrap_or(std::ptr::null());
        // SAFETY: `ptr` is NULL or points into a CString that outlives this call & is kept
        // alive (in `self.ident`) until the next open or close.
        unsafe {
            libc::openlog(ptr, options.bits() & LIBC_OPTIONS_MASK, facility as i32);
        }
        *guard = ident;
        Ok(())
    }
    fn close(&self) -> Result<()> {
        let mut guard = self.ident.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: closelog(3) takes no arguments; the ident is released only afterwards.
        unsafe {
            libc::closelog();
        }
        *guard = None;
        Ok(())
    }
    fn set_mask(&self, mask: i32) {
        // SAFETY: setlogmask(3) only updates libc's own state
        unsafe {
            libc::setlogmask(mask);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         socket transports                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Sending syslog messages via UDP datagrams.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
    framer: Rfc3164,
}

impl UdpTransport {
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: std::net::ToSocketAddrs>(addr: A) -> Result<UdpTransport> {
        UdpTransport::with_framer(addr, Rfc3164::try_default()?)
    }
    /// As [`UdpTransport::new`], but with a specific hostname & default tag.
    pub fn with_framer<A: std::net::ToSocketAddrs>(
        addr: A,
        framer: Rfc3164,
    ) -> Result<UdpTransport> {
        // Bind to any available port on localhost...
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").map_err(Error::transport)?;
        // and connect to the syslog daemon at `addr`:
        socket.connect(addr).map_err(Error::transport)?;
        Ok(UdpTransport { socket, framer })
    }
    /// Construct a [`Transport`] implementation via UDP at localhost:514
    pub fn local() -> Result<UdpTransport> {
        UdpTransport::new("localhost:514")
    }
}

impl Transport for UdpTransport {
    fn send(&self, record: &Record<'_>) -> Result<usize> {
        self.socket
            .send(&self.framer.frame(record))
            .map_err(Error::transport)
    }
}

/// Sending syslog messages via Unix socket.
pub struct UnixSocket {
    socket: UnixDatagram,
    framer: Rfc3164,
}

impl UnixSocket {
    /// Construct a [`Transport`] implementation via Unix sockets at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<UnixSocket> {
        UnixSocket::with_framer(path, Rfc3164::try_default()?)
    }
    pub fn with_framer<P: AsRef<Path>>(path: P, framer: Rfc3164) -> Result<UnixSocket> {
        let sock = UnixDatagram::unbound().map_err(Error::transport)?;
        sock.connect(path).map_err(Error::transport)?;
        Ok(UnixSocket {
            socket: sock,
            framer,
        })
    }
    pub fn try_default() -> Result<UnixSocket> {
        UnixSocket::new("/dev/log")
    }
}

impl Transport for UnixSocket {
    fn send(&self, record: &Record<'_>) -> Result<usize> {
        self.socket
            .send(&self.framer.frame(record))
            .map_err(Error::transport)
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::facility::Level;

    fn framer() -> Rfc3164 {
        Rfc3164::builder()
            .unwrap()
            .hostname_as_string(String::from("bree"))
            .unwrap()
            .build()
    }

    fn record<'a>(message: &'a [u8]) -> Record<'a> {
        Record {
            priority: Level::LOG_NOTICE | Facility::LOG_LOCAL3,
            ident: Some("transport-test"),
            pid: Some(42),
            timestamp: Local::now(),
            prefix: crate::CEE_COOKIE,
            message,
        }
    }

    #[test]
    fn udp() {
        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = UdpTransport::with_framer(server.local_addr().unwrap(), framer()).unwrap();
        let sent = transport.send(&record(br#"{"msg":"over udp"}"#)).unwrap();

        let mut buf = [0u8; 1024];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(n, sent);
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.starts_with("<157>"));
        assert!(text.ends_with(r#" bree transport-test[42]: @cee:{"msg":"over udp"}"#));
    }

    #[test]
    fn unix_socket() {
        let path = std::env::temp_dir().join(format!("syslog-cee-test-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let server = UnixDatagram::bind(&path).unwrap();
        let transport = UnixSocket::with_framer(&path, framer()).unwrap();
        transport.send(&record(br#"{"msg":"over /dev/log"}"#)).unwrap();

        let mut buf = [0u8; 1024];
        let n = server.recv(&mut buf).unwrap();
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.ends_with(r#"transport-test[42]: @cee:{"msg":"over /dev/log"}"#));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unix_socket_nobody_home() {
        let path = std::env::temp_dir().join("syslog-cee-test-no-such.sock");
        assert!(matches!(
            UnixSocket::with_framer(&path, framer()),
            Err(Error::Transport { .. })
        ));
    }

    #[test]
    fn libc_syslog() {
        let transport = LibcSyslog::new();
        assert!(matches!(
            transport.open(Some("nul\0inside"), Options::empty(), Facility::LOG_USER),
            Err(Error::BadIdent { .. })
        ));
        transport
            .open(Some("syslog-cee-test"), Options::NO_TIME, Facility::LOG_USER)
            .unwrap();
        let rec = record(br#"{"msg":"through libc"}"#);
        assert_eq!(
            transport.send(&rec).unwrap(),
            crate::CEE_COOKIE.len() + rec.message.len()
        );
        transport.close().unwrap();
    }
}
