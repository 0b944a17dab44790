// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Syslog severities and facilities (RFC 5424 section 6.2.1).

use serde::{Deserialize, Serialize};

/// Syslog severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    /// Used when a line carries no recognizable level marker.
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

impl Severity {
    /// Numeric severity code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a console level marker (`E`, `W`, `I`, `D`, `V`) to a severity.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'E' => Some(Self::Error),
            b'W' => Some(Self::Warning),
            b'I' => Some(Self::Informational),
            b'D' | b'V' => Some(Self::Debug),
            _ => None,
        }
    }

    /// Derive the severity of a cleaned console line.
    ///
    /// Only lines shaped like `"<L> (<timestamp>) tag: msg"` carry a level;
    /// everything else is [`Severity::Notice`].
    pub fn of_line(line: &str) -> Self {
        match line.as_bytes() {
            [marker, b' ', b'(', ..] => Self::from_marker(*marker).unwrap_or(Self::Notice),
            _ => Self::Notice,
        }
    }

    /// Get severity name as string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "EMERG",
            Self::Alert => "ALERT",
            Self::Critical => "CRIT",
            Self::Error => "ERROR",
            Self::Warning => "WARN",
            Self::Notice => "NOTICE",
            Self::Informational => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Syslog facility (RFC 5424).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyslogFacility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    #[default]
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl SyslogFacility {
    /// Get the numeric facility code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Kern => 0,
            Self::User => 1,
            Self::Mail => 2,
            Self::Daemon => 3,
            Self::Auth => 4,
            Self::Syslog => 5,
            Self::Lpr => 6,
            Self::News => 7,
            Self::Uucp => 8,
            Self::Cron => 9,
            Self::Local0 => 16,
            Self::Local1 => 17,
            Self::Local2 => 18,
            Self::Local3 => 19,
            Self::Local4 => 20,
            Self::Local5 => 21,
            Self::Local6 => 22,
            Self::Local7 => 23,
        }
    }

    /// Calculate PRI value (facility * 8 + severity).
    pub fn priority(&self, severity: Severity) -> u8 {
        self.code() * 8 + severity.code()
    }
}
