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

//! Test the `syslog(3)` work-alikes against the C library's own syslog.

use syslog_cee::{
    cee_args, cee_syslog,
    discover::Options,
    facility::{log_upto, Facility, Level},
    shim,
};

pub fn main() {
    shim::openlog(
        Some("syslog-cee-test"),
        Options::LOG_PID | Options::LOG_PERROR,
        Facility::LOG_LOCAL0,
    )
    .unwrap();

    cee_syslog!(Level::LOG_DEBUG, "hello, %s!", "world").unwrap();
    shim::syslog(
        Level::LOG_INFO,
        "%d requests in %.3fs",
        &cee_args!(17, 0.25, "route", "%s", "/index.html", "status", "%d", 200),
    )
    .unwrap();
    shim::syslog(Level::LOG_NOTICE, "Hi, \"quoted\" \n there", &[]).unwrap();

    // Drops everything below LOG_WARNING
    shim::setlogmask(log_upto(Level::LOG_WARNING));
    cee_syslog!(Level::LOG_INFO, "you shouldn't see this").unwrap();
    shim::legacy_syslog(
        Level::LOG_ERR,
        "legacy: %s failed (%m)",
        &cee_args!("open", "ignored", "%s", "field"),
    );

    println!(
        "{}",
        shim::format(Level::LOG_WARNING, "formatted, not sent", &[]).unwrap()
    );
    shim::closelog();
}
