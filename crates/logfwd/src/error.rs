// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for each layer of the forwarder.

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Failure to build a wire record.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot allocate {needed} bytes for syslog record: {source}")]
    Alloc {
        needed: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Failure to turn a collector host name into an address.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("host '{0}' was not found")]
    NotFound(String),

    #[error("mDNS query for '{host}.local' timed out")]
    Timeout { host: String },

    #[error("resolver I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("DNS message error: {0}")]
    Dns(#[from] hickory_proto::error::ProtoError),
}

/// Datagram transport errors.
///
/// Transient exhaustion never shows up here: it is retried inside the
/// transport. Every variant is permanent from the caller's point of view.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot open UDP socket: {0}")]
    Socket(#[source] io::Error),

    #[error("cannot configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    #[error("sendto {dest} failed: {source}")]
    Send {
        dest: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("transport is closed")]
    Closed,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by the forwarder's lifecycle operations.
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("cannot resolve collector host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote logging is already active")]
    AlreadyActive,

    #[error("operation not allowed in state {0}")]
    InvalidState(crate::forwarder::ForwarderState),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
