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

//! Measure formatting throughput: build (but don't send) many messages on several threads.
//!
//! Usage: `perf-test [THREADS [MESSAGES-PER-THREAD]]`

use syslog_cee::{
    channel::ChannelBuilder,
    discover::Options,
    error::Result,
    facility::{Facility, Level},
    printf::Value,
    transport::{Record, Transport},
};

use std::{sync::Arc, time::Instant};

/// Accept everything, keep nothing
struct Sink;

impl Transport for Sink {
    fn send(&self, record: &Record<'_>) -> Result<usize> {
        Ok(record.message.len())
    }
}

pub fn main() {
    let mut args = std::env::args().skip(1);
    let threads: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);
    let per_thread: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);

    let chan = Arc::new(
        ChannelBuilder::new()
            .ident("perf-test")
            .options(Options::LOG_PID)
            .facility(Facility::LOG_LOCAL7)
            .build(Sink)
            .unwrap(),
    );

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let chan = chan.clone();
            std::thread::spawn(move || {
                for i in 0..per_thread {
                    chan.emit(
                        Level::LOG_INFO,
                        "thread %d message %d",
                        &[
                            Value::from(t),
                            Value::from(i),
                            Value::from("payload"),
                            Value::from("%s"),
                            Value::from("The quick brown fox jumps over the lazy dog"),
                        ],
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let elapsed = start.elapsed();
    let total = threads * per_thread;
    println!(
        "{} messages on {} threads in {:.3}s ({:.0} messages/s)",
        total,
        threads,
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}
