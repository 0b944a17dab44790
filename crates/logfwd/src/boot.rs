// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot "this boot is good" signal.
//!
//! A firmware updater keeps a freshly installed image on probation until the
//! application confirms it works. Reaching the log collector is taken as that
//! confirmation. The signal fires at most once per process.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Receiver of the boot confirmation (OTA layer).
pub trait BootMarker: Send + Sync {
    fn mark_boot_good(&self);
}

/// When the forwarder fires the boot signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMarkPolicy {
    /// After the first record reaches the transport.
    #[default]
    FirstTransmit,
    /// Only when the application calls [`BootSignal::mark`].
    Manual,
}

/// Idempotent one-shot signal.
pub struct BootSignal {
    fired: AtomicBool,
    marker: OnceLock<Arc<dyn BootMarker>>,
}

impl BootSignal {
    /// Signal with no receiver; only the flag is recorded.
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            marker: OnceLock::new(),
        }
    }

    pub fn with_marker(marker: Arc<dyn BootMarker>) -> Self {
        let signal = Self::new();
        signal.set_marker(marker);
        signal
    }

    /// Attach the receiver. Only the first receiver is kept.
    pub fn set_marker(&self, marker: Arc<dyn BootMarker>) -> bool {
        self.marker.set(marker).is_ok()
    }

    /// Fire the signal. Returns true only for the call that fired it.
    pub fn mark(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(marker) = self.marker.get() {
            marker.mark_boot_good();
        }
        true
    }

    pub fn is_marked(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Default for BootSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BootSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootSignal")
            .field("fired", &self.is_marked())
            .field("has_marker", &self.marker.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingMarker(AtomicUsize);

    impl BootMarker for CountingMarker {
        fn mark_boot_good(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fires_once() {
        let marker = Arc::new(CountingMarker::default());
        let signal = BootSignal::with_marker(marker.clone());
        assert!(!signal.is_marked());
        assert!(signal.mark());
        assert!(!signal.mark());
        assert!(signal.is_marked());
        assert_eq!(marker.0.load(Ordering::SeqCst), 1);
        assert!(!signal.set_marker(Arc::new(CountingMarker::default())));
    }

    #[test]
    fn test_concurrent_mark_single_winner() {
        let marker = Arc::new(CountingMarker::default());
        let signal = Arc::new(BootSignal::with_marker(marker.clone()));
        let winners: usize = (0..8)
            .map(|_| {
                let signal = Arc::clone(&signal);
                std::thread::spawn(move || signal.mark())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(marker.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_serde() {
        let policy: BootMarkPolicy = serde_json::from_str("\"manual\"").unwrap();
        assert_eq!(policy, BootMarkPolicy::Manual);
        assert_eq!(
            serde_json::to_string(&BootMarkPolicy::FirstTransmit).unwrap(),
            "\"first_transmit\""
        );
    }
}
