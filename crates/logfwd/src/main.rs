// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! logfwd CLI
//!
//! Forward standard input, line by line, to a remote syslog collector.
//!
//! # Usage
//!
//! ```bash
//! # Forward a program's console output
//! ./player 2>&1 | logfwd --host loghost --app player
//!
//! # Raw text to a non-standard port, keeping local output
//! tail -f app.log | logfwd --host 10.0.0.5 --port 5140 --raw --mirror
//!
//! # Settings from a JSON file, overridden on the command line
//! logfwd --config logfwd.json --facility local3
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use logfwd::{Forwarder, ForwarderConfig, ShutdownHook, SlotLayer, SyslogFacility};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logfwd")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forward console lines to a remote syslog collector over UDP")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file (LOGFWD_* environment variables otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collector host name or address
    #[arg(long)]
    host: Option<String>,

    /// Collector UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// APP-NAME field
    #[arg(short, long)]
    app: Option<String>,

    /// HOSTNAME field (defaults to $HOSTNAME)
    #[arg(long)]
    hostname: Option<String>,

    /// Send lines unchanged instead of RFC 5424 records
    #[arg(long)]
    raw: bool,

    /// Keep printing lines to stderr while forwarding
    #[arg(long)]
    mirror: bool,

    /// Lines kept while the collector is not reachable yet
    #[arg(long)]
    early_buffer: Option<usize>,

    /// Syslog facility
    #[arg(long, value_enum)]
    facility: Option<FacilityArg>,

    /// Verbose mode (show internal logs)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FacilityArg {
    Kern,
    User,
    Daemon,
    Auth,
    Syslog,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl From<FacilityArg> for SyslogFacility {
    fn from(arg: FacilityArg) -> Self {
        match arg {
            FacilityArg::Kern => SyslogFacility::Kern,
            FacilityArg::User => SyslogFacility::User,
            FacilityArg::Daemon => SyslogFacility::Daemon,
            FacilityArg::Auth => SyslogFacility::Auth,
            FacilityArg::Syslog => SyslogFacility::Syslog,
            FacilityArg::Local0 => SyslogFacility::Local0,
            FacilityArg::Local1 => SyslogFacility::Local1,
            FacilityArg::Local2 => SyslogFacility::Local2,
            FacilityArg::Local3 => SyslogFacility::Local3,
            FacilityArg::Local4 => SyslogFacility::Local4,
            FacilityArg::Local5 => SyslogFacility::Local5,
            FacilityArg::Local6 => SyslogFacility::Local6,
            FacilityArg::Local7 => SyslogFacility::Local7,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Internal logs go through the same slot as forwarded lines
    let filter = if cli.verbose {
        EnvFilter::new("logfwd=debug")
    } else {
        EnvFilter::new("logfwd=info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(SlotLayer::global())
        .init();

    let config = build_config(&cli)?;
    let collector = format!("{}:{}", config.host, config.port);
    let early_capacity = cli.early_buffer.unwrap_or(config.buffer_capacity);

    let forwarder = Forwarder::new(config);
    forwarder
        .start_early_buffering(early_capacity)
        .context("Failed to start early buffering")?;

    ctrlc_handler(forwarder.shutdown_hook());

    forwarder
        .start_from_config()
        .with_context(|| format!("Failed to start forwarding to {}", collector))?;

    forward_stdin().context("Failed to read standard input")?;

    forwarder.shutdown();

    let stats = forwarder.stats();
    tracing::info!(
        sent = stats.sent,
        retried = stats.retried,
        buffered = stats.buffered,
        local = stats.local,
        failures = stats.failures,
        "Forwarder shutdown complete"
    );

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ForwarderConfig> {
    let mut config = match &cli.config {
        Some(path) => ForwarderConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ForwarderConfig::from_env().context("Invalid LOGFWD_* environment")?,
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(app) = &cli.app {
        config.app_name = Some(app.clone());
    }
    if let Some(hostname) = &cli.hostname {
        config.hostname = Some(hostname.clone());
    }
    if let Some(facility) = cli.facility {
        config.facility = facility.into();
    }
    config.raw |= cli.raw;
    config.mirror |= cli.mirror;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Hand every stdin line to the sink slot until EOF.
fn forward_stdin() -> io::Result<()> {
    let mut input = io::stdin().lock();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        // The slot never fails a line; the local fallback takes it
        let _ = logfwd::emit(&line);
    }
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(hook: ShutdownHook) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        hook.run();
        std::process::exit(130);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "logfwd",
            "--host",
            "10.1.1.1",
            "--port",
            "5140",
            "--app",
            "player",
            "--hostname",
            "kitchen",
            "--facility",
            "local3",
            "--raw",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.host, "10.1.1.1");
        assert_eq!(config.port, 5140);
        assert_eq!(config.app_name.as_deref(), Some("player"));
        assert_eq!(config.hostname.as_deref(), Some("kitchen"));
        assert_eq!(config.facility, SyslogFacility::Local3);
        assert!(config.raw);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let cli = Cli::parse_from(["logfwd", "--host", "h", "--port", "0"]);
        assert!(build_config(&cli).is_err());
    }
}
