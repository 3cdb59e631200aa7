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

//! RFC 3164 framing for the socket transports
//! ==========================================
//!
//! # Introduction
//!
//! When a [`Record`] goes out over a socket rather than through `syslog(3)`, something has to do
//! what libc would have done: prepend the priority, a timestamp, the hostname & a tag. [`Rfc3164`]
//! does that according to RFC [3164] (AKA the BSD syslog protocol), which is still what [rsyslog]
//! expects on `/dev/log` (see e.g. [here]). The CEE payload rides in the CONTENT part unchanged,
//! which is exactly where CEE-aware receivers look for the `@cee:` cookie.
//!
//! [3164]: https://datatracker.ietf.org/doc/html/rfc3164
//! [rsyslog]: https://www.rsyslog.com/
//! [here]: https://github.com/rsyslog/rsyslog/issues/4749

use crate::{
    error::{Error, Result},
    transport::Record,
};

use backtrace::Backtrace;
use bytes::BufMut;

type StdResult<T, E> = std::result::Result<T, E>;

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

/// A `Vec<u8>` instance with the additional constraint that its contents be ASCII above the value
/// 32 (space)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rfc3164Hostname(Vec<u8>);

impl Rfc3164Hostname {
    /// An RFC 3164-compliant hostname is made-up of ASCII above 32/space. One _may_ use an IP
    /// address here, so this doesn't insist on letters, digits & `-`.
    pub fn new(bytes: Vec<u8>) -> Result<Rfc3164Hostname> {
        if !bytes.is_empty() && bytes.iter().all(|&x| x > 32 && x < 128) {
            Ok(Rfc3164Hostname(bytes))
        } else {
            Err(Error::BadHostname {
                name: bytes,
                back: Backtrace::new(),
            })
        }
    }
    /// Remove the domain (if any) from a host name; "The Domain Name MUST NOT be included in the
    /// HOSTNAME field"
    fn strip_domain(mut bytes: Vec<u8>) -> Vec<u8> {
        if let Some(idx) = bytes.iter().position(|&x| x == b'.') {
            bytes.truncate(idx);
        }
        bytes
    }
    /// This host's name, sans domain, or failing that, its IP address
    pub fn try_default() -> Result<Rfc3164Hostname> {
        hostname::get()
            .map_err(Error::transport)
            .and_then(|hn| {
                Rfc3164Hostname::new(Rfc3164Hostname::strip_domain(bytes_from_os_str(hn)))
            })
            .or_else(|_err| {
                let ip: StdResult<std::net::IpAddr, Error> =
                    local_ip_address::local_ip().map_err(|err| Error::BadIpAddress {
                        source: err,
                        back: Backtrace::new(),
                    });
                ip.map(|ip| Rfc3164Hostname(ip.to_string().into_bytes()))
            })
    }
}

impl std::convert::TryFrom<String> for Rfc3164Hostname {
    type Error = Error;
    fn try_from(x: String) -> StdResult<Self, Self::Error> {
        Rfc3164Hostname::new(x.into_bytes())
    }
}

/// The TAG field: "the name of the program or process that generated the message".
///
/// The RFC restricts the tag to at most 32 alphanumeric characters, but idents like
/// `umberlog/test` are common in practice & receivers only treat `[`, `:` & whitespace as
/// terminating it. Therefore [`Tag`] accepts printable ASCII other than those.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(Vec<u8>);

fn is_tag_byte(x: u8) -> bool {
    x > 32 && x < 127 && x != b'[' && x != b':'
}

impl Tag {
    const MAX_LEN: usize = 32;
    pub fn new(bytes: Vec<u8>) -> Result<Tag> {
        if !bytes.is_empty() && bytes.len() <= Tag::MAX_LEN && bytes.iter().all(|&x| is_tag_byte(x))
        {
            Ok(Tag(bytes))
        } else {
            Err(Error::BadTag {
                name: bytes,
                back: Backtrace::new(),
            })
        }
    }
    /// Strip non-compliant characters & truncate to 32
    fn sanitize(x: &[u8]) -> Vec<u8> {
        x.iter()
            .copied()
            .filter(|&x| is_tag_byte(x))
            .take(Tag::MAX_LEN)
            .collect()
    }
    /// Make the best tag possible out of `ident`
    pub fn from_ident(ident: &str) -> Result<Tag> {
        Tag::new(Tag::sanitize(ident.as_bytes()))
    }
    /// The executable's file name
    pub fn try_default() -> Result<Tag> {
        let pbuf = std::env::current_exe().map_err(Error::transport)?;
        match pbuf.file_name() {
            Some(os_str) => Tag::new(Tag::sanitize(&bytes_from_os_str(os_str.to_os_string()))),
            None => Err(Error::BadTag {
                name: bytes_from_os_str(pbuf.into_os_string()),
                back: Backtrace::new(),
            }),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Frames [`Record`]s as RFC [3164] messages.
///
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
#[derive(Clone, Debug)]
pub struct Rfc3164 {
    hostname: Rfc3164Hostname,
    /// Used when a record carries no ident
    tag: Tag,
}

impl Rfc3164 {
    pub fn try_default() -> Result<Rfc3164> {
        Ok(Rfc3164 {
            hostname: Rfc3164Hostname::try_default()?,
            tag: Tag::try_default().or_else(|_| Tag::new(b"syslog-cee".to_vec()))?,
        })
    }
    pub fn builder() -> Result<Rfc3164Builder> {
        Ok(Rfc3164Builder {
            imp: Rfc3164::try_default()?,
        })
    }
    /// Frame `record` into a new buffer.
    pub fn frame(&self, record: &Record<'_>) -> Vec<u8> {
        let mut buf = format!(
            "<{}>{} ",
            record.priority.raw(),
            record.timestamp.format("%b %_d %H:%M:%S")
        )
        .into_bytes();
        buf.reserve(self.hostname.0.len() + record.prefix.len() + record.message.len() + 48);

        buf.put_slice(&self.hostname.0);
        buf.put_u8(b' ');
        match record.ident.map(Tag::from_ident) {
            Some(Ok(tag)) => buf.put_slice(&tag.0),
            _ => buf.put_slice(&self.tag.0),
        }
        // "The format of "TAG[pid]:" ... is common."
        if let Some(pid) = record.pid {
            buf.put_slice(format!("[{}]", pid).as_bytes());
        }
        buf.put_slice(b": ");
        buf.put_slice(record.prefix.as_bytes());
        buf.put_slice(record.message);
        buf
    }
}

pub struct Rfc3164Builder {
    imp: Rfc3164,
}

impl Rfc3164Builder {
    pub fn hostname(mut self, hostname: Rfc3164Hostname) -> Self {
        self.imp.hostname = hostname;
        self
    }
    pub fn hostname_as_string(mut self, hostname: String) -> Result<Self> {
        self.imp.hostname = Rfc3164Hostname::try_from(hostname)?;
        Ok(self)
    }
    pub fn tag_as_string(mut self, tag: String) -> Result<Self> {
        self.imp.tag = Tag::new(tag.into_bytes())?;
        Ok(self)
    }
    pub fn build(self) -> Rfc3164 {
        self.imp
    }
}
