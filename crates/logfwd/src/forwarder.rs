// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink controller.
//!
//! [`Forwarder`] replaces the process-wide sink with one of its handlers:
//!
//! - while the network is not up, a buffering handler that only stores lines;
//! - once a collector is reachable, a forwarding handler that drains the
//!   buffer and sends every line as a syslog datagram.
//!
//! Lines from network-stack tasks, and lines logged by a thread that is
//! already inside the forwarder, are never sent synchronously: sending would
//! re-enter the datagram path that produced them. They are buffered and go out
//! with the next ordinary line.
//!
//! On a permanent send failure the forwarder hands everything it still holds
//! to the sink it replaced, restores that sink and uninstalls itself.
//!
//! Lock order: lifecycle, then link, then buffer. The sink path never takes
//! the lifecycle lock while holding the link lock.

use crate::boot::{BootMarkPolicy, BootSignal};
use crate::buffer::{truncate, AppendOutcome, BufferedEntry, LineBuffer};
use crate::config::ForwarderConfig;
use crate::encoder::{LineEncoder, Template};
use crate::error::{ForwarderError, TransportError};
use crate::resolve::{HostResolver, Resolver};
use crate::sink::{LogRecord, Provenance, Sink, SinkSlot};
use crate::transport::{RetryPolicy, Transport, TransportOptions, UdpTransport};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Longest console line taken into the forwarding path.
pub const MAX_LINE_LEN: usize = 200;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static INSIDE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running forwarder code until dropped.
struct Reentry {
    was_inside: bool,
}

impl Reentry {
    fn enter() -> Self {
        Self {
            was_inside: INSIDE.with(|inside| inside.replace(true)),
        }
    }

    fn active() -> bool {
        INSIDE.with(Cell::get)
    }
}

impl Drop for Reentry {
    fn drop(&mut self) {
        INSIDE.with(|inside| inside.set(self.was_inside));
    }
}

/// Lifecycle state of a [`Forwarder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ForwarderState {
    /// Not installed; the slot holds someone else's sink.
    Uninstalled = 0,
    /// Buffering handler installed, no transport yet.
    EarlyBuffering = 1,
    /// Forwarding handler installed with a live transport.
    Active = 2,
    /// Tearing down.
    Restoring = 3,
}

impl ForwarderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::EarlyBuffering,
            2 => Self::Active,
            3 => Self::Restoring,
            _ => Self::Uninstalled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::EarlyBuffering => "early-buffering",
            Self::Active => "active",
            Self::Restoring => "restoring",
        }
    }
}

impl fmt::Display for ForwarderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forwarder statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Datagrams handed to the transport.
    pub sent: u64,
    /// Transient send failures absorbed by retrying.
    pub retried: u64,
    /// Lines stored in the deferred buffer.
    pub buffered: u64,
    /// Lines taken back out of the buffer for sending.
    pub drained: u64,
    /// Buffered lines dropped because the buffer was full.
    pub evicted: u64,
    /// Lines written to the previous sink instead of the collector.
    pub local: u64,
    /// Permanent transport failures.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    retried: AtomicU64,
    buffered: AtomicU64,
    drained: AtomicU64,
    evicted: AtomicU64,
    local: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ForwarderStats {
        ForwarderStats {
            sent: self.sent.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            local: self.local.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Transport plus the encoder derived for it at start.
struct Link {
    transport: Box<dyn Transport>,
    encoder: LineEncoder,
}

impl Link {
    fn close(mut self) {
        self.transport.close();
    }
}

struct Shared {
    id: u64,
    slot: Arc<SinkSlot>,
    config: ForwarderConfig,
    lifecycle: Mutex<()>,
    state: AtomicU8,
    /// Sink replaced at install time; `None` means the slot default.
    previous: RwLock<Option<Arc<dyn Sink>>>,
    buffer: ArcSwapOption<LineBuffer>,
    link: Mutex<Option<Link>>,
    mirror: AtomicBool,
    boot: Arc<BootSignal>,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> ForwarderState {
        ForwarderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ForwarderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn previous_sink(&self) -> Arc<dyn Sink> {
        match &*self.previous.read() {
            Some(sink) => Arc::clone(sink),
            None => self.slot.default_sink(),
        }
    }

    /// Put `handler` in the slot, remembering what it replaced unless that
    /// was a forwarder handler itself.
    fn install(&self, handler: Arc<dyn Sink>) {
        let replaced = self.slot.install(handler, Provenance::Forwarder(self.id));
        if !replaced.provenance.is_forwarder() {
            *self.previous.write() = Some(Arc::clone(&replaced.sink));
        }
    }

    fn fall_back(&self, record: &LogRecord<'_>) {
        self.fall_back_to(&*self.previous_sink(), record);
    }

    fn fall_back_to(&self, previous: &dyn Sink, record: &LogRecord<'_>) {
        Counters::bump(&self.counters.local, 1);
        let _ = previous.write(record);
    }

    fn replay_entry(&self, previous: &dyn Sink, entry: &BufferedEntry) {
        self.fall_back_to(
            previous,
            &LogRecord::new(&entry.text).with_task(entry.task.as_deref()),
        );
    }

    fn replay(&self, previous: &dyn Sink, buffer: &LineBuffer) {
        while let Some(entry) = buffer.drain_one() {
            self.replay_entry(previous, &entry);
        }
    }

    fn report_disabled(&self, previous: &dyn Sink, err: &TransportError) {
        let notice = format!("remote logging disabled: {}\n", err);
        self.fall_back_to(previous, &LogRecord::new(&notice));
    }

    fn mirror_to_previous(&self, record: &LogRecord<'_>) {
        if self.mirror.load(Ordering::Relaxed) {
            let _ = self.previous_sink().write(record);
        }
    }

    /// Store the record for later; the previous sink takes it if there is
    /// no buffer.
    fn defer(&self, record: &LogRecord<'_>) {
        let text = truncate(record.text, MAX_LINE_LEN);
        let outcome = match self.buffer.load_full() {
            Some(buffer) => buffer.append(record.task, text),
            None => AppendOutcome::Disabled,
        };

        match outcome {
            AppendOutcome::Disabled => {
                self.fall_back(record);
                return;
            }
            AppendOutcome::Evicted => Counters::bump(&self.counters.evicted, 1),
            AppendOutcome::Appended | AppendOutcome::Coalesced => {}
        }
        Counters::bump(&self.counters.buffered, 1);
        self.mirror_to_previous(record);
    }

    fn transmit(
        &self,
        link: &mut Link,
        task: Option<&str>,
        text: &str,
    ) -> Result<(), TransportError> {
        let encoded = link.encoder.encode(text, task);
        let retries_before = link.transport.retries();
        link.transport.send(encoded.as_bytes())?;

        Counters::bump(
            &self.counters.retried,
            link.transport.retries().saturating_sub(retries_before),
        );
        Counters::bump(&self.counters.sent, 1);
        if self.config.boot_mark == BootMarkPolicy::FirstTransmit {
            self.boot.mark();
        }
        Ok(())
    }

    /// Forwarding handler body.
    fn forward(&self, record: &LogRecord<'_>) {
        if Reentry::active() || self.config.is_conflicting(record.task) {
            self.defer(record);
            return;
        }

        let _inside = Reentry::enter();
        let text = truncate(record.text, MAX_LINE_LEN);

        let mut link_slot = self.link.lock();
        let Some(link) = link_slot.as_mut() else {
            // Stopped or failed under us
            drop(link_slot);
            self.fall_back(record);
            return;
        };

        if let Some(buffer) = self.buffer.load_full() {
            // Lines added while draining wait for the next call.
            for _ in 0..buffer.len() {
                let Some(entry) = buffer.drain_one() else {
                    break;
                };
                Counters::bump(&self.counters.drained, 1);
                if let Err(err) = self.transmit(link, entry.task.as_deref(), &entry.text) {
                    if let Some(dead) = link_slot.take() {
                        dead.close();
                    }
                    drop(link_slot);
                    self.teardown(&err, Some(entry), record);
                    return;
                }
            }
        }

        if let Err(err) = self.transmit(link, record.task, text) {
            if let Some(dead) = link_slot.take() {
                dead.close();
            }
            drop(link_slot);
            self.teardown(&err, None, record);
            return;
        }
        drop(link_slot);

        self.mirror_to_previous(record);
    }

    /// Give up after a permanent failure. The link is already closed.
    fn teardown(
        &self,
        err: &TransportError,
        unsent: Option<BufferedEntry>,
        record: &LogRecord<'_>,
    ) {
        let previous = self.previous_sink();
        if let Some(entry) = unsent {
            self.replay_entry(&*previous, &entry);
        }

        let _lifecycle = self.lifecycle.lock();
        if self.state() != ForwarderState::Active {
            // Someone else already stopped us
            self.fall_back_to(&*previous, record);
            return;
        }
        self.set_state(ForwarderState::Restoring);
        Counters::bump(&self.counters.failures, 1);

        if let Some(buffer) = self.buffer.swap(None) {
            self.replay(&*previous, &buffer);
        }
        self.report_disabled(&*previous, err);
        self.fall_back_to(&*previous, record);
        let _ = previous.flush();

        self.slot.restore_if(self.id, previous);
        *self.previous.write() = None;
        self.mirror.store(self.config.mirror, Ordering::Relaxed);
        self.set_state(ForwarderState::Uninstalled);
    }

    fn start_early_buffering(self: &Arc<Self>, capacity: usize) -> Result<(), ForwarderError> {
        let _inside = Reentry::enter();
        let _lifecycle = self.lifecycle.lock();
        let state = self.state();
        if state != ForwarderState::Uninstalled {
            return Err(ForwarderError::InvalidState(state));
        }

        self.buffer.store(Some(Arc::new(LineBuffer::new(capacity))));
        self.install(Arc::new(BufferingSink {
            shared: Arc::clone(self),
        }));
        self.set_state(ForwarderState::EarlyBuffering);

        tracing::debug!(capacity, "early log buffering started");
        Ok(())
    }

    fn activate(
        self: &Arc<Self>,
        transport: Box<dyn Transport>,
        app_name: Option<&str>,
        raw: bool,
        mirror: bool,
    ) -> Result<(), ForwarderError> {
        let _inside = Reentry::enter();
        let _lifecycle = self.lifecycle.lock();
        match self.state() {
            ForwarderState::Active => return Err(ForwarderError::AlreadyActive),
            ForwarderState::Restoring => {
                return Err(ForwarderError::InvalidState(ForwarderState::Restoring))
            }
            ForwarderState::Uninstalled | ForwarderState::EarlyBuffering => {}
        }

        let encoder = if raw {
            LineEncoder::Raw
        } else {
            LineEncoder::Syslog(Template::new(
                self.config.hostname.as_deref(),
                app_name,
                self.config.facility,
            ))
        };
        let collector = transport.destination();
        *self.link.lock() = Some(Link { transport, encoder });
        self.mirror.store(mirror, Ordering::Relaxed);

        if self.buffer.load().is_none() {
            self.buffer
                .store(Some(Arc::new(LineBuffer::new(self.config.buffer_capacity))));
        }
        self.install(Arc::new(ForwardingSink {
            shared: Arc::clone(self),
        }));
        self.set_state(ForwarderState::Active);

        match collector {
            Some(addr) => tracing::info!(collector = %addr, raw, mirror, "remote logging started"),
            None => tracing::info!(raw, mirror, "remote logging started"),
        }
        Ok(())
    }

    fn stop(&self) {
        let _inside = Reentry::enter();
        let _lifecycle = self.lifecycle.lock();
        if self.state() == ForwarderState::Uninstalled {
            return;
        }
        self.set_state(ForwarderState::Restoring);

        let previous = self.previous_sink();
        let mut link = self.link.lock().take();
        let buffer = self.buffer.swap(None);

        let mut failed = None;
        if let (Some(buffer), Some(active)) = (&buffer, link.as_mut()) {
            for _ in 0..buffer.len() {
                let Some(entry) = buffer.drain_one() else {
                    break;
                };
                Counters::bump(&self.counters.drained, 1);
                if let Err(err) = self.transmit(active, entry.task.as_deref(), &entry.text) {
                    Counters::bump(&self.counters.failures, 1);
                    self.replay_entry(&*previous, &entry);
                    failed = Some(err);
                    break;
                }
            }
        }
        if let Some(link) = link {
            link.close();
        }
        if let Some(buffer) = &buffer {
            self.replay(&*previous, buffer);
        }
        if let Some(err) = &failed {
            self.report_disabled(&*previous, err);
        }
        let _ = previous.flush();

        let restored = self.slot.restore_if(self.id, previous);
        *self.previous.write() = None;
        self.mirror.store(self.config.mirror, Ordering::Relaxed);
        self.set_state(ForwarderState::Uninstalled);

        tracing::info!(restored, "remote logging stopped");
    }

    fn shutdown(&self) {
        if self.state() != ForwarderState::Uninstalled {
            std::thread::sleep(self.config.shutdown_grace());
        }
        self.stop();
    }
}

/// Handler installed while waiting for the network.
struct BufferingSink {
    shared: Arc<Shared>,
}

impl Sink for BufferingSink {
    fn write(&self, record: &LogRecord<'_>) -> io::Result<()> {
        self.shared.defer(record);
        Ok(())
    }
}

/// Handler installed while a collector is reachable.
struct ForwardingSink {
    shared: Arc<Shared>,
}

impl Sink for ForwardingSink {
    fn write(&self, record: &LogRecord<'_>) -> io::Result<()> {
        self.shared.forward(record);
        Ok(())
    }
}

/// Remote log forwarder bound to one sink slot.
///
/// Dropping the forwarder stops it.
pub struct Forwarder {
    shared: Arc<Shared>,
}

impl Forwarder {
    /// Forwarder for the process-wide slot.
    pub fn new(config: ForwarderConfig) -> Self {
        Self::with_slot(config, SinkSlot::global())
    }

    pub fn with_slot(config: ForwarderConfig, slot: Arc<SinkSlot>) -> Self {
        let mirror = config.mirror;
        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                slot,
                config,
                lifecycle: Mutex::new(()),
                state: AtomicU8::new(ForwarderState::Uninstalled as u8),
                previous: RwLock::new(None),
                buffer: ArcSwapOption::from(None),
                link: Mutex::new(None),
                mirror: AtomicBool::new(mirror),
                boot: Arc::new(BootSignal::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Provenance id of this forwarder's handlers.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.shared.config
    }

    pub fn slot(&self) -> &Arc<SinkSlot> {
        &self.shared.slot
    }

    pub fn state(&self) -> ForwarderState {
        self.shared.state()
    }

    /// Start buffering console lines until the collector is reachable.
    ///
    /// Only valid while uninstalled. A capacity of 0 passes every line
    /// straight to the previous sink.
    pub fn start_early_buffering(&self, capacity: usize) -> Result<(), ForwarderError> {
        self.shared.start_early_buffering(capacity)
    }

    /// Resolve `host`, open the UDP transport and start forwarding.
    ///
    /// On error nothing changes: an early-buffering forwarder keeps
    /// buffering.
    pub fn start(
        &self,
        host: &str,
        port: u16,
        app_name: Option<&str>,
        raw: bool,
        mirror: bool,
    ) -> Result<(), ForwarderError> {
        match self.state() {
            ForwarderState::Active => return Err(ForwarderError::AlreadyActive),
            ForwarderState::Restoring => {
                return Err(ForwarderError::InvalidState(ForwarderState::Restoring))
            }
            ForwarderState::Uninstalled | ForwarderState::EarlyBuffering => {}
        }

        let _inside = Reentry::enter();
        let config = &self.shared.config;
        let resolver = HostResolver::with_mdns_timeout(config.mdns_timeout());
        let addr = resolver
            .resolve(host)
            .map_err(|source| ForwarderError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let options = TransportOptions {
            send_timeout: config.send_timeout(),
            retry: RetryPolicy {
                interval: config.retry_interval(),
            },
        };
        let transport = UdpTransport::open(addr, port, options)?;
        self.shared.activate(Box::new(transport), app_name, raw, mirror)
    }

    /// [`start`](Self::start) with the configured collector and options.
    pub fn start_from_config(&self) -> Result<(), ForwarderError> {
        let config = &self.shared.config;
        self.start(
            &config.host,
            config.port,
            config.app_name.as_deref(),
            config.raw,
            config.mirror,
        )
    }

    /// Start forwarding through an already open transport.
    pub fn activate(
        &self,
        transport: Box<dyn Transport>,
        app_name: Option<&str>,
        raw: bool,
        mirror: bool,
    ) -> Result<(), ForwarderError> {
        self.shared.activate(transport, app_name, raw, mirror)
    }

    /// Flush buffered lines, close the transport and give the slot back.
    ///
    /// Idempotent. The slot is only touched if it still holds one of this
    /// forwarder's handlers.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Wait the shutdown grace period, then [`stop`](Self::stop).
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn shutdown_hook(&self) -> ShutdownHook {
        ShutdownHook {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Lines currently held in the deferred buffer.
    pub fn buffered(&self) -> usize {
        self.shared
            .buffer
            .load_full()
            .map_or(0, |buffer| buffer.len())
    }

    pub fn stats(&self) -> ForwarderStats {
        self.shared.counters.snapshot()
    }

    pub fn boot_signal(&self) -> &Arc<BootSignal> {
        &self.shared.boot
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Cloneable handle that shuts a forwarder down from another thread
/// (e.g. a signal handler).
#[derive(Clone)]
pub struct ShutdownHook {
    shared: Weak<Shared>,
}

impl ShutdownHook {
    /// Run the shutdown sequence. Does nothing once the forwarder is gone.
    pub fn run(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.shutdown();
        }
    }
}

impl fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
