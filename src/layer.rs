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

//! A [`tracing-subscriber`] [`Layer`] that sends [`tracing`] [`Event`]s as structured syslog
//! messages.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
//!
//! [`tracing`] events are already structured: a message plus named fields. [`Layer`] keeps them
//! that way, sending each event through a [`Channel`] with the `message` field as `msg` and every
//! other field as a caller field after the discovered ones. So
//!
//! ```rust
//! use tracing::info;
//! use syslog_cee::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = Registry::default().with(Layer::try_default().unwrap());
//! tracing::subscriber::with_default(subscriber, || {
//!     info!(attempt = 3, "Hello, world!");
//! });
//! ```
//!
//! will produce a syslog entry along the lines of:
//!
//! ```text
//! Jun 23 16:10:55 hostname appname: @cee:{"msg":"Hello, world!","pid":"1234",...,"attempt":"3"}
//! ```

use crate::{
    channel::{Channel, ChannelBuilder, EmitGuard},
    error::Result,
    facility::Level,
    transport::{LibcSyslog, Transport},
};

use tracing::Event;
use tracing_core::field::{Field, Visit};
use tracing_subscriber::layer::Context;

use std::sync::Arc;

fn default_level_mapping(level: &tracing::Level) -> Level {
    match level {
        &tracing::Level::TRACE | &tracing::Level::DEBUG => Level::LOG_DEBUG,
        &tracing::Level::INFO => Level::LOG_INFO,
        &tracing::Level::WARN => Level::LOG_WARNING,
        &tracing::Level::ERROR => Level::LOG_ERR,
    }
}

/// Collects an [`Event`]'s message & fields.
#[derive(Debug, Default)]
struct CeeVisitor {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for CeeVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The tracing macros pre-format the `message` field as `fmt::Arguments`, whose `Debug`
        // implementation doesn't add quotes.
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.fields.push((field.name(), text));
        }
    }
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that routes [`Event`]s through a
/// [`Channel`].
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
pub struct Layer<T: Transport> {
    channel: Arc<Channel<T>>,
    map_level: Box<dyn Fn(&tracing::Level) -> Level + Send + Sync>,
}

impl Layer<LibcSyslog> {
    /// A [`Layer`] over its own channel, opened with default settings, that sends through
    /// `syslog(3)`
    pub fn try_default() -> Result<Self> {
        Ok(Layer::new(Arc::new(
            ChannelBuilder::new().build(LibcSyslog::new())?,
        )))
    }
}

impl<T: Transport> Layer<T> {
    /// A [`Layer`] sending through `channel`, which may be shared with other callers
    pub fn new(channel: Arc<Channel<T>>) -> Self {
        Layer {
            channel,
            map_level: Box::new(default_level_mapping),
        }
    }
    /// A [`Layer`] over a new, unopened, channel on `transport`
    pub fn with_transport(transport: T) -> Self {
        Layer::new(Arc::new(Channel::new(transport)))
    }
    /// Replace the mapping from [`tracing`] levels to syslog levels
    pub fn with_level_mapping<F>(mut self, map_level: F) -> Self
    where
        F: Fn(&tracing::Level) -> Level + Send + Sync + 'static,
    {
        self.map_level = Box::new(map_level);
        self
    }
    pub fn channel(&self) -> &Arc<Channel<T>> {
        &self.channel
    }
}

impl<S, T> tracing_subscriber::layer::Layer<S> for Layer<T>
where
    S: tracing::Subscriber,
    T: Transport + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = (self.map_level)(event.metadata().level());
        let guard = EmitGuard::enter();
        let mut visitor = CeeVisitor::default();
        event.record(&mut visitor);
        let message = visitor.message.as_deref().unwrap_or("");
        match guard {
            Some(guard) => {
                let fields: Vec<(&str, &str)> = visitor
                    .fields
                    .iter()
                    .map(|(k, v)| (*k, v.as_str()))
                    .collect();
                if let Err(err) = self
                    .channel
                    .dispatch_fields(&guard, level.into(), message, &fields)
                {
                    ::tracing::error!("syslog-cee: failed to send an event: {}", err);
                }
            }
            // An event raised while this thread is already logging
            None => {
                let _ = self.channel.pass_through(level.into(), message);
            }
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{
        channel::test::{members, Capture},
        discover::Options,
        facility::{log_upto, Facility},
        transport::Record,
        CEE_COOKIE,
    };

    use tracing::{debug, info, warn, Callsite};
    use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

    use std::sync::Mutex;

    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }
    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }
    // Identifier needs a reference with 'static duration.
    impl TestCallsite {
        pub const fn new(metadata: &'static tracing::Metadata<'static>) -> TestCallsite {
            TestCallsite { metadata }
        }
    }

    #[test]
    #[allow(clippy::redundant_closure_call)]
    fn visitor() {
        static CALLSITE: TestCallsite = {
            static METADATA: tracing::Metadata = tracing::Metadata::new(
                "test event metadata",
                "test-target",
                tracing::Level::INFO,
                Some(file!()),
                Some(line!()),
                Some(module_path!()),
                tracing::field::FieldSet::new(
                    &["message"],
                    tracing_core::callsite::Identifier(&CALLSITE),
                ),
                tracing_core::metadata::Kind::EVENT,
            );
            TestCallsite::new(&METADATA)
        };

        (|value_set: ::tracing::field::ValueSet| {
            let event = Event::new(CALLSITE.metadata(), &value_set);
            let mut visitor = CeeVisitor::default();
            event.record(&mut visitor);
            assert_eq!(visitor.message.as_deref(), Some("Hello, 世界!"));
            assert!(visitor.fields.is_empty());
        })(tracing::valueset!(
            CALLSITE.metadata().fields(),
            "{}",
            "Hello, 世界!"
        ));
    }

    #[test]
    fn levels() {
        assert_eq!(default_level_mapping(&tracing::Level::TRACE), Level::LOG_DEBUG);
        assert_eq!(default_level_mapping(&tracing::Level::INFO), Level::LOG_INFO);
        assert_eq!(default_level_mapping(&tracing::Level::WARN), Level::LOG_WARNING);
        assert_eq!(default_level_mapping(&tracing::Level::ERROR), Level::LOG_ERR);
    }

    #[test]
    fn events_become_cee() {
        let channel = Arc::new(Channel::new(Capture::default()));
        channel
            .open(Some("layer-test"), Options::NO_DISCOVER, Facility::LOG_LOCAL2)
            .unwrap();
        channel.set_mask(log_upto(Level::LOG_INFO));
        let subscriber = Registry::default().with(Layer::new(channel.clone()));
        tracing::subscriber::with_default(subscriber, || {
            info!(answer = 42, who = "me", "hello {}", "world");
            debug!("masked");
            warn!(quote = "\"", "careful");
        });

        let sent = channel.transport().sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, (18 << 3) | 6);
        assert_eq!(sent[1].0, (18 << 3) | 4);
        assert_eq!(
            members(sent[0].1.strip_prefix(CEE_COOKIE).unwrap()),
            vec![
                ("msg".to_string(), "hello world".to_string()),
                ("answer".to_string(), "42".to_string()),
                ("who".to_string(), "me".to_string()),
            ]
        );
        assert_eq!(sent[1].1, r#"@cee:{"msg":"careful","quote":"\""}"#);
    }

    #[test]
    fn custom_level_mapping() {
        let layer = Layer::with_transport(Capture::default())
            .with_level_mapping(|_| Level::LOG_ALERT);
        let channel = layer.channel().clone();
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            debug!("everything is an alert");
        });
        assert_eq!(channel.transport().sent.lock().unwrap()[0].0, (1 << 3) | 1);
    }

    /// A transport that raises a tracing event of its own while sending
    #[derive(Default)]
    struct Chatty {
        seen: Mutex<Vec<String>>,
    }

    impl Transport for Chatty {
        fn send(&self, record: &Record<'_>) -> crate::error::Result<usize> {
            self.seen.lock().unwrap().push(format!(
                "{}{}",
                record.prefix,
                String::from_utf8_lossy(record.message)
            ));
            if !record.prefix.is_empty() {
                warn!("inside the transport");
            }
            Ok(record.message.len())
        }
    }

    #[test]
    fn nested_events_pass_through() {
        let layer = Layer::with_transport(Chatty::default());
        let channel = layer.channel().clone();
        channel
            .open(None, Options::NO_DISCOVER, Facility::LOG_USER)
            .unwrap();
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            info!("outer");
        });
        assert_eq!(
            *channel.transport().seen.lock().unwrap(),
            vec![
                r#"@cee:{"msg":"outer"}"#.to_string(),
                "inside the transport".to_string()
            ]
        );
    }
}
