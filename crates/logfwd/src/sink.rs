// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide log sink slot.
//!
//! Every console line of the process goes through one [`SinkSlot`]. The slot
//! holds exactly one [`Sink`] at a time, tagged with the [`Provenance`] of
//! whoever installed it, so an installer can tell its own handlers apart from
//! a foreign sink without comparing function pointers.
//!
//! Dispatch loads the current occupant and calls it with no lock held; a sink
//! is free to reinstall the slot from inside its own `write`.

use arc_swap::ArcSwap;
use std::io::{self, Write};
use std::sync::{Arc, OnceLock};

static GLOBAL_SLOT: OnceLock<Arc<SinkSlot>> = OnceLock::new();

/// One console line as handed to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
    /// Raw text, possibly with ANSI color codes and a trailing newline.
    pub text: &'a str,
    /// Label of the producing task (thread name).
    pub task: Option<&'a str>,
}

impl<'a> LogRecord<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, task: None }
    }

    pub fn with_task(mut self, task: Option<&'a str>) -> Self {
        self.task = task;
        self
    }
}

/// Destination for console lines.
///
/// Implementations must be thread-safe; `write` may be called from any
/// thread, concurrently.
pub trait Sink: Send + Sync {
    /// Write one record.
    fn write(&self, record: &LogRecord<'_>) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Default occupant: the local console (stderr), text written unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn write(&self, record: &LogRecord<'_>) -> io::Result<()> {
        io::stderr().lock().write_all(record.text.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Who installed a slot occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The default sink or anything installed by other code.
    Foreign,
    /// A handler of the forwarder with this id.
    Forwarder(u64),
}

impl Provenance {
    pub fn is_forwarder(self) -> bool {
        matches!(self, Self::Forwarder(_))
    }
}

/// Current occupant of a [`SinkSlot`].
#[derive(Clone)]
pub struct Installed {
    pub sink: Arc<dyn Sink>,
    pub provenance: Provenance,
}

impl std::fmt::Debug for Installed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installed")
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

/// Installation slot for the process-wide sink.
pub struct SinkSlot {
    current: ArcSwap<Installed>,
    default: Arc<dyn Sink>,
}

impl SinkSlot {
    /// Create a slot whose initial occupant is `default`.
    pub fn new(default: Arc<dyn Sink>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Installed {
                sink: Arc::clone(&default),
                provenance: Provenance::Foreign,
            }),
            default,
        }
    }

    /// The process-wide slot, created on first use with a [`ConsoleSink`].
    pub fn global() -> Arc<SinkSlot> {
        Arc::clone(GLOBAL_SLOT.get_or_init(|| Arc::new(Self::new(Arc::new(ConsoleSink)))))
    }

    /// Replace the occupant; returns the one it replaced.
    pub fn install(&self, sink: Arc<dyn Sink>, provenance: Provenance) -> Arc<Installed> {
        self.current.swap(Arc::new(Installed { sink, provenance }))
    }

    pub fn current(&self) -> Arc<Installed> {
        self.current.load_full()
    }

    pub fn provenance(&self) -> Provenance {
        self.current.load().provenance
    }

    /// The sink the slot started with.
    pub fn default_sink(&self) -> Arc<dyn Sink> {
        Arc::clone(&self.default)
    }

    /// Put `previous` back, but only while forwarder `owner` still occupies
    /// the slot. Returns whether the slot was changed.
    pub fn restore_if(&self, owner: u64, previous: Arc<dyn Sink>) -> bool {
        loop {
            let current = self.current.load();
            if current.provenance != Provenance::Forwarder(owner) {
                return false;
            }
            let replacement = Arc::new(Installed {
                sink: Arc::clone(&previous),
                provenance: Provenance::Foreign,
            });
            let swapped = self.current.compare_and_swap(&*current, replacement);
            if Arc::ptr_eq(&*swapped, &*current) {
                return true;
            }
        }
    }

    /// Hand `record` to the current occupant.
    pub fn dispatch(&self, record: &LogRecord<'_>) -> io::Result<()> {
        let sink = Arc::clone(&self.current.load().sink);
        sink.write(record)
    }

    /// Dispatch `text` labelled with the calling thread's name.
    pub fn emit(&self, text: &str) -> io::Result<()> {
        let thread = std::thread::current();
        self.dispatch(&LogRecord::new(text).with_task(thread.name()))
    }
}

impl std::fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSlot")
            .field("provenance", &self.provenance())
            .finish_non_exhaustive()
    }
}

/// Print a console line through the process-wide slot.
pub fn emit(text: &str) -> io::Result<()> {
    SinkSlot::global().emit(text)
}
