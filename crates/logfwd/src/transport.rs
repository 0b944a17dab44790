// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport to the syslog collector.
//!
//! The network stack shares a small pool of send buffers between all
//! traffic. Running out of them is temporary, so such sends are retried after
//! a short pause until they go through. Every other send error is permanent.

use crate::error::TransportError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Default `SO_SNDTIMEO` for the collector socket.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause between retries after transient exhaustion.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Datagram transport the forwarder sends encoded records through.
pub trait Transport: Send {
    /// Send one record; blocks through transient exhaustion.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Release the endpoint. Safe to call more than once.
    fn close(&mut self);

    /// Collector address, if known.
    fn destination(&self) -> Option<SocketAddr> {
        None
    }

    /// Transient failures absorbed so far.
    fn retries(&self) -> u64 {
        0
    }
}

/// Classification of a send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorClass {
    /// Buffers temporarily exhausted; retry the same payload.
    Transient,
    /// Anything else; the transport is dead.
    Permanent,
}

/// Classify an IO error returned by a datagram send.
pub fn classify_error(err: &io::Error) -> SendErrorClass {
    match err.kind() {
        // EAGAIN/EWOULDBLOCK, or SO_SNDTIMEO expired waiting for buffers
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
            SendErrorClass::Transient
        }
        io::ErrorKind::OutOfMemory => SendErrorClass::Transient,
        _ => {
            #[cfg(unix)]
            if matches!(err.raw_os_error(), Some(libc::ENOBUFS) | Some(libc::ENOMEM)) {
                return SendErrorClass::Transient;
            }
            SendErrorClass::Permanent
        }
    }
}

/// Retry behavior for transient send failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Pause before resending the same payload.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Run `op` until it succeeds or fails permanently.
///
/// Returns the number of transient failures that were absorbed.
pub fn send_with_retry<F>(policy: RetryPolicy, mut op: F) -> Result<u64, io::Error>
where
    F: FnMut() -> io::Result<usize>,
{
    let mut retries = 0;
    loop {
        match op() {
            Ok(_) => return Ok(retries),
            Err(err) if classify_error(&err) == SendErrorClass::Transient => {
                retries += 1;
                std::thread::sleep(policy.interval);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Socket options for [`UdpTransport::open`].
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// UDP socket bound to an ephemeral port, sending to one collector.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    dest: SocketAddr,
    retry: RetryPolicy,
    retries: u64,
}

impl UdpTransport {
    /// Create the endpoint for `addr:port`.
    ///
    /// On failure the half-built socket is dropped before returning.
    pub fn open(
        addr: IpAddr,
        port: u16,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let dest = SocketAddr::new(addr, port);
        let domain = if dest.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket =
            Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(TransportError::Socket)?;
        socket
            .set_write_timeout(Some(options.send_timeout))
            .map_err(TransportError::Configure)?;

        let bind_addr = match dest {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        socket
            .bind(&bind_addr.into())
            .map_err(TransportError::Configure)?;

        tracing::debug!(collector = %dest, "UDP transport opened");

        Ok(Self {
            socket: Some(socket.into()),
            dest,
            retry: options.retry,
            retries: 0,
        })
    }

    /// Local address of the sending socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Some(socket) => socket.local_addr(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let dest = self.dest;
        match send_with_retry(self.retry, || socket.send_to(payload, dest)) {
            Ok(retries) => {
                self.retries += retries;
                Ok(())
            }
            Err(source) => Err(TransportError::Send { dest, source }),
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            let socket = Socket::from(socket);
            // UDP sockets report ENOTCONN here; closing happens on drop anyway.
            let _ = socket.shutdown(std::net::Shutdown::Both);
        }
    }

    fn destination(&self) -> Option<SocketAddr> {
        Some(self.dest)
    }

    fn retries(&self) -> u64 {
        self.retries
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
