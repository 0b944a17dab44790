// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `tracing` bridge into the sink slot.
//!
//! Events are rendered as console lines in the usual embedded layout
//!
//! ```text
//! I (1532) player::net: connected peer=10.0.0.4
//! ```
//!
//! (level marker, milliseconds since the layer was created, target, message,
//! then fields) and handed to the slot with the thread name as task label.
//! Rendering uses fixed stack buffers only.

use crate::encoder::LineBuf;
use crate::forwarder::MAX_LINE_LEN;
use crate::sink::{LogRecord, SinkSlot};
use std::fmt::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Console level marker for a `tracing` level.
pub fn level_marker(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'V',
    }
}

/// Layer that prints every event through a [`SinkSlot`].
pub struct SlotLayer {
    slot: Arc<SinkSlot>,
    started: Instant,
}

impl SlotLayer {
    pub fn new(slot: Arc<SinkSlot>) -> Self {
        Self {
            slot,
            started: Instant::now(),
        }
    }

    /// Layer for the process-wide slot.
    pub fn global() -> Self {
        Self::new(SinkSlot::global())
    }
}

impl<S: Subscriber> Layer<S> for SlotLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let mut line: LineBuf<MAX_LINE_LEN> = LineBuf::new();
        let _ = write!(
            line,
            "{} ({}) {}: {}{}",
            level_marker(metadata.level()),
            self.started.elapsed().as_millis(),
            metadata.target(),
            visitor.message.as_str(),
            visitor.fields.as_str()
        );
        line.terminate_line();

        let thread = std::thread::current();
        let _ = self
            .slot
            .dispatch(&LogRecord::new(line.as_str()).with_task(thread.name()));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: LineBuf<MAX_LINE_LEN>,
    fields: LineBuf<MAX_LINE_LEN>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let _ = self.message.write_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Sink;
    use parking_lot::Mutex;
    use std::io;
    use tracing_subscriber::prelude::*;

    #[derive(Default)]
    struct Recorder {
        records: Mutex<Vec<(Option<String>, String)>>,
    }

    impl Sink for Recorder {
        fn write(&self, record: &LogRecord<'_>) -> io::Result<()> {
            self.records
                .lock()
                .push((record.task.map(str::to_owned), record.text.to_owned()));
            Ok(())
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<(Option<String>, String)> {
        let recorder = Arc::new(Recorder::default());
        let slot = Arc::new(SinkSlot::new(recorder.clone()));
        let subscriber = tracing_subscriber::registry().with(SlotLayer::new(slot));
        tracing::subscriber::with_default(subscriber, f);
        let records = recorder.records.lock().clone();
        records
    }

    /// Drop the `(<ms>)` part, which depends on timing.
    fn without_time(line: &str) -> String {
        match (line.find(" ("), line.find(") ")) {
            (Some(open), Some(close)) => format!("{}{}", &line[..open], &line[close + 1..]),
            _ => line.to_string(),
        }
    }

    #[test]
    fn test_level_markers() {
        assert_eq!(level_marker(&Level::ERROR), 'E');
        assert_eq!(level_marker(&Level::WARN), 'W');
        assert_eq!(level_marker(&Level::INFO), 'I');
        assert_eq!(level_marker(&Level::DEBUG), 'D');
        assert_eq!(level_marker(&Level::TRACE), 'V');
    }

    #[test]
    fn test_event_rendering() {
        let records = capture(|| {
            tracing::info!(target: "player", "track started");
            tracing::warn!(target: "net", peer = "10.0.0.4", retries = 3, "slow link");
        });

        assert_eq!(records.len(), 2);
        assert_eq!(without_time(&records[0].1), "I player: track started\n");
        assert_eq!(
            without_time(&records[1].1),
            "W net: slow link peer=10.0.0.4 retries=3\n"
        );
        assert!(records[0].1.starts_with("I ("));
        assert!(records[0].0.is_some());
    }

    #[test]
    fn test_rendered_line_is_bounded() {
        let long = "y".repeat(500);
        let records = capture(|| tracing::error!(target: "t", "{}", long));
        let line = &records[0].1;
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert!(line.ends_with('\n'));
        assert!(line.starts_with("E ("));
    }

    #[test]
    fn test_thread_name_is_task() {
        let records = capture(|| {
            std::thread::Builder::new()
                .name("audio".into())
                .spawn(|| tracing::debug!(target: "dsp", "tick"))
                .unwrap()
                .join()
                .unwrap();
        });
        // with_default only covers the current thread
        assert!(records.is_empty());

        let recorder = Arc::new(Recorder::default());
        let slot = Arc::new(SinkSlot::new(recorder.clone()));
        std::thread::Builder::new()
            .name("audio".into())
            .spawn(move || {
                let subscriber = tracing_subscriber::registry().with(SlotLayer::new(slot));
                tracing::subscriber::with_default(subscriber, || {
                    tracing::debug!(target: "dsp", "tick");
                });
            })
            .unwrap()
            .join()
            .unwrap();
        let records = recorder.records.lock().clone();
        assert_eq!(records[0].0.as_deref(), Some("audio"));
        assert_eq!(without_time(&records[0].1), "D dsp: tick\n");
    }
}
