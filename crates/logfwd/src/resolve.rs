// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector name resolution.
//!
//! The platform resolver is tried first. Small networks often have no DNS
//! entry for the log host, so on failure a single multicast DNS query for
//! `<host>.local` is sent (RFC 6762 one-shot query, answered by unicast).

use crate::error::ResolveError;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

/// mDNS IPv4 group and port.
pub const MDNS_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(224, 0, 0, 251)), 5353);

/// Default time to wait for an mDNS answer.
pub const DEFAULT_MDNS_TIMEOUT: Duration = Duration::from_secs(2);

/// Turns a host name into an address.
pub trait Resolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError>;
}

/// Platform resolver (`getaddrinfo`). IPv4 answers are preferred.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<SocketAddr> = (host, 0u16).to_socket_addrs()?.collect();
        let found = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip);

        match found {
            Some(ip) => {
                tracing::debug!(host, %ip, "dns result");
                Ok(ip)
            }
            None => Err(ResolveError::NotFound(host.to_string())),
        }
    }
}

/// One-shot multicast DNS resolver for `<host>.local`.
#[derive(Debug, Clone, Copy)]
pub struct MdnsResolver {
    pub timeout: Duration,
}

impl Default for MdnsResolver {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_MDNS_TIMEOUT,
        }
    }
}

impl MdnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn open_socket() -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into())?;
        socket.set_multicast_ttl_v4(255)?;
        Ok(socket.into())
    }
}

impl Resolver for MdnsResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let host = host.strip_suffix(".local").unwrap_or(host);
        tracing::debug!("Query A: {}.local", host);

        let socket = Self::open_socket()?;
        let id = std::process::id() as u16;
        let query = build_query(id, host)?;
        socket.send_to(&query, MDNS_ADDR)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 1500];
        loop {
            let now = Instant::now();
            if now >= deadline {
                tracing::error!("Host '{}' was not found!", host);
                return Err(ResolveError::Timeout {
                    host: host.to_string(),
                });
            }
            socket.set_read_timeout(Some(deadline - now))?;

            let len = match socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(ip) = parse_a_answer(&buf[..len], host) {
                tracing::info!("{} has IP address {}", host, ip);
                return Ok(IpAddr::V4(ip));
            }
        }
    }
}

/// Platform resolver with mDNS fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostResolver {
    pub system: SystemResolver,
    pub mdns: MdnsResolver,
}

impl HostResolver {
    pub fn with_mdns_timeout(timeout: Duration) -> Self {
        Self {
            system: SystemResolver,
            mdns: MdnsResolver::new(timeout),
        }
    }
}

impl Resolver for HostResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        match self.system.resolve(host) {
            Ok(ip) => Ok(ip),
            Err(err) => {
                tracing::debug!(host, error = %err, "DNS lookup failed, trying mDNS");
                self.mdns.resolve(host)
            }
        }
    }
}

/// Build a one-shot query for the A record of `<host>.local`, asking for a
/// unicast answer.
pub fn build_query(id: u16, host: &str) -> Result<Vec<u8>, ResolveError> {
    let name = Name::from_ascii(format!("{}.local.", host.trim_end_matches('.')))?;
    let mut query = Query::query(name, RecordType::A);
    query.set_mdns_unicast_response(true);

    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(query);
    Ok(message.to_vec()?)
}

/// Find an A record for `<host>.local` in a DNS response.
pub fn parse_a_answer(msg: &[u8], host: &str) -> Option<Ipv4Addr> {
    let message = Message::from_vec(msg).ok()?;
    if message.message_type() != MessageType::Response {
        // Another host's query echoed back
        return None;
    }
    let wanted = Name::from_ascii(format!("{}.local.", host.trim_end_matches('.'))).ok()?;

    message
        .answers()
        .iter()
        .chain(message.name_servers())
        .chain(message.additionals())
        .filter(|record| record.record_type() == RecordType::A && *record.name() == wanted)
        .find_map(|record| match record.data() {
            Some(RData::A(a)) => Some(a.0),
            _ => None,
        })
}
