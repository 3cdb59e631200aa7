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

//! Test writing to port 514 on the local host.

use syslog_cee::{layer::Layer, transport::UdpTransport};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    // Setup the real subsriber...
    let subscriber =
        Registry::default().with(Layer::with_transport(UdpTransport::local().unwrap()));
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!(transport = "udp", "Hello, 世界!");
    debug!(transport = "udp", "Hello, 世界!");
    info!(transport = "udp", "Hello, 世界!");
    warn!(transport = "udp", "Hello, 世界!");
    error!(transport = "udp", "Hello, 世界!");
}
