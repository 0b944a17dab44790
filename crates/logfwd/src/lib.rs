// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote Syslog Log Forwarder
//!
//! Redirect everything a process prints to its console to a remote syslog
//! collector over UDP.
//!
//! # Features
//!
//! - **Console takeover**: One process-wide sink slot; the forwarder installs
//!   itself there and hands the slot back when it stops or fails
//! - **RFC 5424 lines**: `<PRI>1 - HOST APP TASK - - MSG`, severity taken from
//!   the `E/W/I/D/V (` marker of the line
//! - **Early buffering**: Lines logged before the network is up are kept and
//!   sent first
//! - **Reentrancy safe**: Lines logged by network-stack tasks, or from inside
//!   the send path, are deferred instead of deadlocking
//! - **Graceful degradation**: Buffer exhaustion is retried; any other send
//!   error restores the previous sink
//! - **tracing integration**: [`SlotLayer`] routes `tracing` events into the
//!   slot
//!
//! # Example
//!
//! ```rust,ignore
//! use logfwd::{Forwarder, ForwarderConfig, SlotLayer};
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry().with(SlotLayer::global()).init();
//!
//! let config = ForwarderConfig::builder()
//!     .collector("loghost", 514)
//!     .app_name("player")
//!     .build()?;
//!
//! let forwarder = Forwarder::new(config);
//! forwarder.start_early_buffering(64)?;
//! // ... network comes up ...
//! forwarder.start_from_config()?;
//!
//! logfwd::emit("I (1200) app: hello collector\n")?;
//! ```

pub mod boot;
pub mod buffer;
pub mod config;
pub mod encoder;
pub mod error;
pub mod forwarder;
pub mod layer;
pub mod resolve;
pub mod severity;
pub mod sink;
pub mod transport;

pub use boot::{BootMarkPolicy, BootMarker, BootSignal};
pub use buffer::{AppendOutcome, BufferedEntry, LineBuffer, MAX_ENTRY_LEN};
pub use config::{ForwarderConfig, ForwarderConfigBuilder};
pub use encoder::{clean_line, encode, LineBuf, LineEncoder, Template};
pub use error::{ConfigError, EncodeError, ForwarderError, ResolveError, TransportError};
pub use forwarder::{Forwarder, ForwarderState, ForwarderStats, ShutdownHook, MAX_LINE_LEN};
pub use layer::SlotLayer;
pub use resolve::{HostResolver, MdnsResolver, Resolver, SystemResolver};
pub use severity::{Severity, SyslogFacility};
pub use sink::{emit, ConsoleSink, LogRecord, Provenance, Sink, SinkSlot};
pub use transport::{
    classify_error, send_with_retry, RetryPolicy, SendErrorClass, Transport, TransportOptions,
    UdpTransport,
};
