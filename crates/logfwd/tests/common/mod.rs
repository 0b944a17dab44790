// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers: a recording console and a scripted transport.

#![allow(dead_code)]

use logfwd::{ForwarderConfig, LogRecord, Sink, SinkSlot, Transport, TransportError};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Stand-in for the local console.
#[derive(Default)]
pub struct Recorder {
    records: Mutex<Vec<(Option<String>, String)>>,
}

impl Recorder {
    pub fn texts(&self) -> Vec<String> {
        self.records.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

impl Sink for Recorder {
    fn write(&self, record: &LogRecord<'_>) -> io::Result<()> {
        self.records
            .lock()
            .push((record.task.map(str::to_owned), record.text.to_owned()));
        Ok(())
    }
}

/// Observable side of a [`ScriptedTransport`].
#[derive(Clone, Default)]
pub struct Wire {
    sent: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Wire {
    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(ScriptedTransport { wire: self.clone() })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every following send fail permanently.
    pub fn break_link(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedTransport {
    wire: Wire,
}

impl Transport for ScriptedTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.wire.attempts.fetch_add(1, Ordering::SeqCst);
        if self.wire.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                dest: SocketAddr::from(([192, 0, 2, 1], 514)),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        self.wire
            .sent
            .lock()
            .push(String::from_utf8_lossy(payload).into_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.wire.closed.store(true, Ordering::SeqCst);
    }
}

/// Private slot whose default occupant is a fresh recorder.
pub fn console_slot() -> (Arc<SinkSlot>, Arc<Recorder>) {
    let console = Arc::new(Recorder::default());
    (Arc::new(SinkSlot::new(console.clone())), console)
}

pub fn test_config() -> ForwarderConfig {
    ForwarderConfig::builder()
        .hostname("dev1")
        .build()
        .unwrap()
}

pub fn log(slot: &SinkSlot, task: &str, text: &str) {
    slot.dispatch(&LogRecord::new(text).with_task(Some(task)))
        .unwrap();
}
