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

//! The format/dispatch facade
//! ==========================
//!
//! # Introduction
//!
//! A [`Channel`] ties everything together: it owns a [`Transport`], the [`ChannelRecord`] set by
//! the last [`Channel::open`] and a log mask, and turns each log call into a finished JSON object
//! handed to the transport with the [`CEE_COOKIE`] in front. Per call:
//!
//! ```text
//!   gate (mask) -> reset -> msg -> discovered fields -> caller fields -> finalize -> send
//! ```
//!
//! Any failure before `finalize` aborts the call without touching the transport; a message is sent
//! whole or not at all.
//!
//! # Threads
//!
//! A channel is shared between threads (the process default channel in [`crate::shim`] is a
//! `static`). The record lives behind a single [`RwLock`]; opening or closing replaces it whole,
//! so a log call in flight on another thread sees either the old record or the new one, never a
//! mixture. The mask is an atomic. Each thread builds messages in its own [`JsonBuffer`], so the
//! common case (no open/close in progress) takes a read lock only long enough to clone an [`Arc`].
//!
//! # Re-entrancy
//!
//! A transport, or a [`tracing`] subscriber that routes into a channel (see
//! [`crate::layer::Layer`]), may log while a message is being sent. Such a nested call on the same
//! thread doesn't get a structured message: it's rendered with its template & passed straight to
//! the transport, with no JSON & no cookie. Nested calls that only format (no send) are served
//! from a temporary buffer.

use crate::{
    buffer::JsonBuffer,
    discover::{discover, ChannelRecord, Options},
    error::Result,
    facility::{Facility, Priority, LOG_ALL_LEVELS},
    fields,
    object::Finalized,
    printf::{self, Value},
    transport::{Record, Transport},
    CEE_COOKIE,
};

use chrono::prelude::*;
use tracing::{debug, trace, warn};

use std::{
    cell::{Cell, RefCell},
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    per-thread state                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
struct Buffers {
    json: JsonBuffer,
    scratch: String,
}

thread_local! {
    static BUFFERS: RefCell<Buffers> = RefCell::new(Buffers::default());
    static IN_EMIT: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` against this thread's buffers, or a fresh pair if they're already in use (or gone,
/// during thread tear-down).
fn with_buffers<R>(mut f: impl FnMut(&mut Buffers) -> R) -> R {
    BUFFERS
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut bufs| f(&mut *bufs)))
        .ok()
        .flatten()
        .unwrap_or_else(|| f(&mut Buffers::default()))
}

/// Marks this thread as being inside a log call; at most one exists per thread at a time.
pub(crate) struct EmitGuard {
    _private: (),
}

impl EmitGuard {
    /// `None` if this thread is already inside a log call
    pub(crate) fn enter() -> Option<EmitGuard> {
        IN_EMIT
            .try_with(|flag| {
                if flag.replace(true) {
                    None
                } else {
                    Some(EmitGuard { _private: () })
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        let _ = IN_EMIT.try_with(|flag| flag.set(false));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       message assembly                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// What the caller contributed to a message
enum Payload<'p, 'a> {
    /// A template & its arguments, optionally followed by `key, format, args...` fields
    Template {
        template: &'p str,
        args: &'p [Value<'a>],
        with_fields: bool,
    },
    /// A ready-made message & fields
    Fields {
        message: &'p str,
        fields: &'p [(&'p str, &'p str)],
    },
}

fn build<'b>(
    bufs: &'b mut Buffers,
    record: &ChannelRecord,
    priority: Priority,
    payload: &Payload<'_, '_>,
) -> Result<Finalized<'b>> {
    let Buffers { json, scratch } = bufs;
    let mut obj = json.reset()?;
    match payload {
        Payload::Template {
            template,
            args,
            with_fields,
        } => {
            scratch.clear();
            let consumed = printf::format_into(scratch, template, args)?;
            obj.append("msg", scratch)?;
            discover(record, priority, scratch, |k, v| obj.append(k, v))?;
            if *with_fields {
                fields::walk(&args[consumed..], scratch, |k, v| obj.append(k, v))?;
            }
        }
        Payload::Fields {
            message,
            fields: pairs,
        } => {
            obj.append("msg", message)?;
            discover(record, priority, scratch, |k, v| obj.append(k, v))?;
            for (k, v) in pairs.iter() {
                obj.append(k, v)?;
            }
        }
    }
    obj.finalize()
}

fn transport_record<'r>(
    record: &'r ChannelRecord,
    priority: Priority,
    prefix: &'r str,
    message: &'r [u8],
) -> Record<'r> {
    Record {
        priority: priority.or_facility(record.facility()),
        ident: record.ident(),
        pid: record
            .options()
            .contains(Options::LOG_PID)
            .then(|| record.pid()),
        timestamp: Local::now(),
        prefix,
        message,
    }
}

/// The message as `printf` would have rendered it, or failing that the bare template
fn render_or_template(template: &str, args: &[Value<'_>]) -> String {
    printf::format(template, args)
        .map(|(text, _)| text)
        .unwrap_or_else(|_| template.to_string())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Channel                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A structured logging channel over transport `T`.
///
/// ```rust
/// use syslog_cee::{cee_args, channel::Channel, discover::Options, facility::{Facility, Level}};
/// use syslog_cee::transport::LibcSyslog;
///
/// let chan = Channel::new(LibcSyslog::new());
/// chan.open(Some("doc-test"), Options::NO_DISCOVER, Facility::LOG_LOCAL0).unwrap();
/// let text = chan
///     .format(Level::LOG_INFO, "%d widgets", &cee_args!(3, "color", "%s", "blue"))
///     .unwrap();
/// assert_eq!(text, r#"{"msg":"3 widgets","color":"blue"}"#);
/// chan.close().unwrap();
/// ```
pub struct Channel<T: Transport> {
    transport: T,
    record: RwLock<Arc<ChannelRecord>>,
    mask: AtomicI32,
    /// Held across each open, close or re-mask, so the transport & the record change together
    control: Mutex<()>,
}

impl<T: Transport> Channel<T> {
    /// A channel that hasn't been opened: no ident, no cached identity, facility `LOG_USER`, all
    /// levels enabled.
    pub fn new(transport: T) -> Channel<T> {
        Channel {
            transport,
            record: RwLock::new(Arc::new(ChannelRecord::new(
                Options::empty(),
                Facility::default(),
            ))),
            mask: AtomicI32::new(LOG_ALL_LEVELS),
            control: Mutex::new(()),
        }
    }
    pub fn transport(&self) -> &T {
        &self.transport
    }
    /// The current record; it won't change under the caller, but may be replaced in the channel
    pub fn record(&self) -> Arc<ChannelRecord> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
    fn replace(&self, record: ChannelRecord) {
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(record);
    }
    /// Open (or re-open) the channel; identity is looked-up & cached as `options` permit.
    pub fn open(&self, ident: Option<&str>, options: Options, facility: Facility) -> Result<()> {
        let _guard = EmitGuard::enter();
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        self.transport.open(ident, options, facility)?;
        self.replace(ChannelRecord::open(ident, options, facility));
        debug!(
            "syslog-cee: opened channel {:?} (options {:#x}, {})",
            ident,
            options.bits(),
            facility
        );
        Ok(())
    }
    /// Close the channel: the ident & cached identity are dropped, options & facility retained.
    pub fn close(&self) -> Result<()> {
        let _guard = EmitGuard::enter();
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        self.transport.close()?;
        let closed = self.record().closed();
        self.replace(closed);
        debug!("syslog-cee: closed channel");
        Ok(())
    }
    /// Set the log mask, returning the previous one; a `mask` of zero just returns the current
    /// mask, as with `setlogmask(3)`.
    pub fn set_mask(&self, mask: i32) -> i32 {
        if mask == 0 {
            return self.mask();
        }
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = self.mask.swap(mask, Ordering::Relaxed);
        self.transport.set_mask(mask);
        prev
    }
    pub fn mask(&self) -> i32 {
        self.mask.load(Ordering::Relaxed)
    }
    /// True if messages at `priority` would pass the mask
    pub fn is_enabled<P: Into<Priority>>(&self, priority: P) -> bool {
        self.mask() & (1 << priority.into().level_bits()) != 0
    }
    /// Build the message `emit` would send, without sending it (or consulting the mask).
    pub fn format<P: Into<Priority>>(
        &self,
        priority: P,
        template: &str,
        args: &[Value<'_>],
    ) -> Result<String> {
        self.format_payload(
            priority.into(),
            &Payload::Template {
                template,
                args,
                with_fields: true,
            },
        )
    }
    /// As [`Channel::format`], for a message & fields that are already strings.
    pub fn format_fields<P: Into<Priority>>(
        &self,
        priority: P,
        message: &str,
        fields: &[(&str, &str)],
    ) -> Result<String> {
        self.format_payload(priority.into(), &Payload::Fields { message, fields })
    }
    fn format_payload(&self, priority: Priority, payload: &Payload<'_, '_>) -> Result<String> {
        let record = self.record();
        with_buffers(|bufs| {
            build(bufs, &record, priority, payload).map(|fin| fin.to_string_lossy().into_owned())
        })
    }
    /// Log `template`, rendered against `args`, followed by any `key, format, args...` fields
    /// remaining in `args`.
    pub fn emit<P: Into<Priority>>(
        &self,
        priority: P,
        template: &str,
        args: &[Value<'_>],
    ) -> Result<()> {
        let priority = priority.into();
        match EmitGuard::enter() {
            Some(guard) => self.dispatch(
                &guard,
                priority,
                &Payload::Template {
                    template,
                    args,
                    with_fields: true,
                },
            ),
            None => self.pass_through(priority, &render_or_template(template, args)),
        }
    }
    /// Log `message` verbatim (it is not a template), followed by `fields`.
    pub fn emit_fields<P: Into<Priority>>(
        &self,
        priority: P,
        message: &str,
        fields: &[(&str, &str)],
    ) -> Result<()> {
        let priority = priority.into();
        match EmitGuard::enter() {
            Some(guard) => self.dispatch_fields(&guard, priority, message, fields),
            None => self.pass_through(priority, message),
        }
    }
    /// The classic `syslog(3)` contract: any `key, format, args...` fields are ignored, nothing
    /// is returned, and if the structured message can't be built the plain one is sent instead.
    pub fn legacy_emit<P: Into<Priority>>(&self, priority: P, template: &str, args: &[Value<'_>]) {
        let priority = priority.into();
        let guard = match EmitGuard::enter() {
            Some(guard) => guard,
            None => {
                let _ = self.pass_through(priority, &render_or_template(template, args));
                return;
            }
        };
        let payload = Payload::Template {
            template,
            args,
            with_fields: false,
        };
        match self.dispatch(&guard, priority, &payload) {
            Err(err) if err.is_format_failure() => {
                warn!(
                    "syslog-cee: couldn't build a structured message ({}); sending it as-is",
                    err
                );
                let _ = self.pass_through(priority, &render_or_template(template, args));
            }
            _ => (),
        }
    }
    /// Build & send a structured message for `fields`; the caller is already inside a log call.
    pub(crate) fn dispatch_fields(
        &self,
        guard: &EmitGuard,
        priority: Priority,
        message: &str,
        fields: &[(&str, &str)],
    ) -> Result<()> {
        self.dispatch(guard, priority, &Payload::Fields { message, fields })
    }
    fn dispatch(
        &self,
        _guard: &EmitGuard,
        priority: Priority,
        payload: &Payload<'_, '_>,
    ) -> Result<()> {
        if !self.is_enabled(priority) {
            trace!("syslog-cee: {} is masked; dropping", priority.level());
            return Ok(());
        }
        let record = self.record();
        with_buffers(|bufs| {
            let fin = build(bufs, &record, priority, payload)?;
            self.transport.send(&transport_record(
                &record,
                priority,
                CEE_COOKIE,
                fin.as_bytes(),
            ))
        })
        .map(|_| ())
    }
    /// Send `text` as-is: no JSON, no cookie.
    pub(crate) fn pass_through(&self, priority: Priority, text: &str) -> Result<()> {
        if !self.is_enabled(priority) {
            return Ok(());
        }
        let record = self.record();
        self.transport
            .send(&transport_record(&record, priority, "", text.as_bytes()))
            .map(|_| ())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       ChannelBuilder                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Configure & open a [`Channel`] in one go.
///
/// ```rust
/// use syslog_cee::{channel::ChannelBuilder, discover::Options, facility::{log_upto, Facility, Level}};
/// use syslog_cee::transport::LibcSyslog;
///
/// let chan = ChannelBuilder::new()
///     .ident("my-daemon")
///     .options(Options::LOG_PID | Options::NO_CACHE_UID)
///     .facility(Facility::LOG_DAEMON)
///     .mask(log_upto(Level::LOG_NOTICE))
///     .build(LibcSyslog::new())
///     .unwrap();
/// assert!(!chan.is_enabled(Level::LOG_DEBUG));
/// ```
#[derive(Clone, Debug)]
pub struct ChannelBuilder {
    ident: Option<String>,
    options: Options,
    facility: Facility,
    mask: i32,
}

impl std::default::Default for ChannelBuilder {
    fn default() -> Self {
        ChannelBuilder {
            ident: None,
            options: Options::empty(),
            facility: Facility::LOG_USER,
            mask: LOG_ALL_LEVELS,
        }
    }
}

impl ChannelBuilder {
    pub fn new() -> ChannelBuilder {
        ChannelBuilder::default()
    }
    pub fn ident<S: Into<String>>(mut self, ident: S) -> Self {
        self.ident = Some(ident.into());
        self
    }
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
    pub fn facility(mut self, facility: Facility) -> Self {
        self.facility = facility;
        self
    }
    pub fn mask(mut self, mask: i32) -> Self {
        self.mask = mask;
        self
    }
    /// Build the channel over `transport` & open it
    pub fn build<T: Transport>(self, transport: T) -> Result<Channel<T>> {
        let chan = Channel::new(transport);
        chan.open(self.ident.as_deref(), self.options, self.facility)?;
        if self.mask != LOG_ALL_LEVELS {
            chan.set_mask(self.mask);
        }
        Ok(chan)
    }
}
