// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarder configuration.
//!
//! Supports programmatic, environment and file-based configuration.

use crate::boot::BootMarkPolicy;
use crate::error::ConfigError;
use crate::severity::SyslogFacility;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Standard syslog UDP port.
pub const DEFAULT_PORT: u16 = 514;

/// Environment variables read by [`ForwarderConfig::from_env`].
pub const ENV_HOST: &str = "LOGFWD_HOST";
pub const ENV_PORT: &str = "LOGFWD_PORT";
pub const ENV_APP: &str = "LOGFWD_APP";
pub const ENV_HOSTNAME: &str = "LOGFWD_HOSTNAME";
pub const ENV_RAW: &str = "LOGFWD_RAW";
pub const ENV_MIRROR: &str = "LOGFWD_MIRROR";
pub const ENV_BUFFER: &str = "LOGFWD_BUFFER";

/// Forwarder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Collector host name or address.
    pub host: String,

    /// Collector UDP port.
    pub port: u16,

    /// APP-NAME field; `-` when absent.
    pub app_name: Option<String>,

    /// HOSTNAME field (this machine); `-` when absent.
    pub hostname: Option<String>,

    /// Send console text unchanged instead of syslog lines.
    pub raw: bool,

    /// Keep printing to the local console while forwarding.
    pub mirror: bool,

    /// Syslog facility for the PRI field.
    pub facility: SyslogFacility,

    /// Deferred line buffer size in entries (0 disables buffering).
    pub buffer_capacity: usize,

    /// Tasks that must never transmit synchronously (network stack tasks).
    pub conflicting_tasks: Vec<String>,

    /// `SO_SNDTIMEO` for the collector socket (milliseconds).
    pub send_timeout_ms: u64,

    /// Pause between retries on buffer exhaustion (milliseconds).
    pub retry_interval_ms: u64,

    /// How long to wait for an mDNS answer (milliseconds).
    pub mdns_timeout_ms: u64,

    /// Delay before stopping on shutdown, for in-flight lines (milliseconds).
    pub shutdown_grace_ms: u64,

    /// When to confirm the running boot.
    pub boot_mark: BootMarkPolicy,
}

fn default_hostname() -> Option<String> {
    ["HOSTNAME", "HOST"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
        .or_else(system_hostname)
}

/// Interface host name from the kernel.
#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if ret != 0 {
        return None;
    }

    let hostname = std::ffi::CStr::from_bytes_until_nul(&buf)
        .ok()?
        .to_string_lossy()
        .into_owned();
    if hostname.is_empty() || hostname == "localhost" {
        None
    } else {
        Some(hostname)
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().filter(|h| !h.is_empty())
}

fn default_conflicting_tasks() -> Vec<String> {
    vec!["tIT".to_string(), "wifi".to_string()]
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            app_name: None,
            hostname: default_hostname(),
            raw: false,
            mirror: false,
            facility: SyslogFacility::Local0,
            buffer_capacity: 64,
            conflicting_tasks: default_conflicting_tasks(),
            send_timeout_ms: 1000,
            retry_interval_ms: 100,
            mdns_timeout_ms: 2000,
            shutdown_grace_ms: 500,
            boot_mark: BootMarkPolicy::FirstTransmit,
        }
    }
}

impl ForwarderConfig {
    /// Create a configuration builder.
    pub fn builder() -> ForwarderConfigBuilder {
        ForwarderConfigBuilder::default()
    }

    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `LOGFWD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LOGFWD_*` overrides obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = parse_env(ENV_PORT, &port)?;
        }
        if let Some(app) = lookup(ENV_APP) {
            self.app_name = Some(app).filter(|s| !s.is_empty());
        }
        if let Some(hostname) = lookup(ENV_HOSTNAME) {
            self.hostname = Some(hostname).filter(|s| !s.is_empty());
        }
        if let Some(raw) = lookup(ENV_RAW) {
            self.raw = parse_bool(ENV_RAW, &raw)?;
        }
        if let Some(mirror) = lookup(ENV_MIRROR) {
            self.mirror = parse_bool(ENV_MIRROR, &mirror)?;
        }
        if let Some(capacity) = lookup(ENV_BUFFER) {
            self.buffer_capacity = parse_env(ENV_BUFFER, &capacity)?;
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("Collector host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("Collector port must not be 0".into()));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn mdns_timeout(&self) -> Duration {
        Duration::from_millis(self.mdns_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// True if records from `task` must only ever be buffered.
    pub fn is_conflicting(&self, task: Option<&str>) -> bool {
        task.is_some_and(|task| self.conflicting_tasks.iter().any(|t| t == task))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}: cannot parse '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "{}: expected a boolean, got '{}'",
            key, value
        ))),
    }
}

/// Builder for ForwarderConfig.
#[derive(Debug, Default)]
pub struct ForwarderConfigBuilder {
    config: ForwarderConfig,
}

impl ForwarderConfigBuilder {
    /// Set collector host and port.
    pub fn collector(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.host = host.into();
        self.config.port = port;
        self
    }

    /// Set APP-NAME.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = Some(app_name.into());
        self
    }

    /// Set HOSTNAME.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = Some(hostname.into());
        self
    }

    /// Send raw console text.
    pub fn raw(mut self, raw: bool) -> Self {
        self.config.raw = raw;
        self
    }

    /// Also print to the local console.
    pub fn mirror(mut self, mirror: bool) -> Self {
        self.config.mirror = mirror;
        self
    }

    pub fn facility(mut self, facility: SyslogFacility) -> Self {
        self.config.facility = facility;
        self
    }

    /// Set deferred buffer size in entries.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Replace the list of tasks that must not transmit synchronously.
    pub fn conflicting_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.conflicting_tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn mdns_timeout(mut self, timeout: Duration) -> Self {
        self.config.mdns_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn boot_mark(mut self, policy: BootMarkPolicy) -> Self {
        self.config.boot_mark = policy;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ForwarderConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
