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

//! [syslog-cee](crate) errors

use backtrace::Backtrace;

/// [syslog-cee](crate) error type
///
/// [syslog-cee](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis of what the caller will
/// need to respond. The three that matter in practice mirror the three ways a log call can fail:
/// the buffer couldn't grow, a template couldn't be matched to its arguments, or the transport
/// refused the finished message.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// The message buffer could not be grown
    OutOfMemory {
        requested: usize,
        source: std::collections::TryReserveError,
        back: Backtrace,
    },
    /// A printf-style template could not be parsed, or matched to its arguments
    Format {
        template: String,
        reason: String,
        back: Backtrace,
    },
    /// An ident containing an interior NUL was handed to a transport that needs a C string
    BadIdent { name: String, back: Backtrace },
    /// Non-compliant hostname provided
    BadHostname { name: Vec<u8>, back: Backtrace },
    /// Failed to retrieve an IP address in lieu of a hostname
    BadIpAddress {
        source: local_ip_address::Error,
        back: Backtrace,
    },
    /// Non-compliant tag provided
    BadTag { name: Vec<u8>, back: Backtrace },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    pub(crate) fn format<T: Into<String>, R: Into<String>>(template: T, reason: R) -> Error {
        Error::Format {
            template: template.into(),
            reason: reason.into(),
            back: Backtrace::new_unresolved(),
        }
    }
    pub(crate) fn transport<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            source: Box::new(err),
            back: Backtrace::new_unresolved(),
        }
    }
    /// True if this error arose while building the message (as opposed to sending it)
    pub fn is_format_failure(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. } | Error::Format { .. })
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::OutOfMemory {
                requested, source, ..
            } => write!(
                f,
                "Failed to grow the message buffer by {} bytes: {}",
                requested, source
            ),
            Error::Format {
                template, reason, ..
            } => write!(f, "Couldn't format {:?}: {}", template, reason),
            Error::BadIdent { name, .. } => {
                write!(f, "{:?} can't be used as a syslog ident", name)
            }
            Error::BadHostname { name, .. } => {
                write!(f, "{:?} is not an RFC3164-compliant hostname", name)
            }
            Error::BadIpAddress { source, .. } => write!(
                f,
                "While attempting to retrieve an IP address for this host, got {}",
                source
            ),
            Error::BadTag { name, .. } => write!(f, "{:?} is not an RFC3164-compliant tag", name),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other syslog-cee error"),
        }
    }
}

/// Symbolicate a backtrace captured with [`Backtrace::new_unresolved`]
fn resolved(back: &Backtrace) -> Backtrace {
    let mut back = back.clone();
    back.resolve();
    back
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::OutOfMemory { back, .. } => write!(f, "{}\n{:?}", self, resolved(back)),
            Error::Format { back, .. } => write!(f, "{}\n{:?}", self, resolved(back)),
            Error::BadIdent { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadHostname { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadIpAddress { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadTag { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, resolved(back)),
            err => write!(f, "syslog-cee error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OutOfMemory { source, .. } => Some(source),
            Error::BadIpAddress { source, .. } => Some(source),
            Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let err = Error::format("%q", "unknown conversion 'q'");
        assert_eq!(
            format!("{}", err),
            "Couldn't format \"%q\": unknown conversion 'q'"
        );
        assert!(err.is_format_failure());

        let err = Error::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "nobody home",
        ));
        assert_eq!(format!("{}", err), "Transport error: nobody home");
        assert!(!err.is_format_failure());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn debug_resolves_lazily() {
        let err = Error::format("%q", "unknown conversion 'q'");
        match &err {
            Error::Format { back, .. } => {
                assert!(back.frames().iter().all(|frame| frame.symbols().is_empty()))
            }
            _ => unreachable!(),
        }
        let text = format!("{:?}", err);
        assert!(text.starts_with("Couldn't format \"%q\": unknown conversion 'q'\n"));
    }
}
