// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers

//! Forwarder lifecycle scenarios
//!
//! Drives the forwarder through a private sink slot with a scripted
//! transport, checking what reaches the collector and what reaches the
//! local console.

mod common;

use common::{console_slot, log, test_config, Wire};
use logfwd::{Forwarder, ForwarderConfig, ForwarderError, ForwarderState, Provenance};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_conflicting_task_never_transmits() {
    let (slot, console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    let wire = Wire::default();
    fwd.activate(wire.transport(), Some("app"), false, false)
        .unwrap();

    log(&slot, "tIT", "I (10) tcpip: dhcp lease renewed\n");

    assert_eq!(wire.attempts(), 0);
    assert_eq!(fwd.buffered(), 1);
    assert_eq!(fwd.stats().buffered, 1);
    assert_eq!(console.len(), 0);
}

#[test]
fn test_permanent_failure_falls_back_once() {
    let (slot, console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    let wire = Wire::default();
    fwd.activate(wire.transport(), Some("app"), false, false)
        .unwrap();

    log(&slot, "main", "I (1) app: ok\n");
    wire.break_link();
    log(&slot, "main", "E (2) app: lost link\n");

    assert_eq!(fwd.state(), ForwarderState::Uninstalled);
    assert_eq!(slot.provenance(), Provenance::Foreign);
    assert!(wire.is_closed());
    assert_eq!(fwd.stats().failures, 1);

    let texts = console.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with("remote logging disabled: "));
    assert_eq!(texts[1], "E (2) app: lost link\n");

    // Restored sink services later calls directly; no second teardown
    log(&slot, "main", "I (3) app: local only\n");
    assert_eq!(console.len(), 3);
    assert_eq!(wire.attempts(), 2);
    assert_eq!(fwd.stats().failures, 1);
}

#[test]
fn test_early_buffer_flushed_in_order() {
    let (slot, console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    fwd.start_early_buffering(5).unwrap();

    for i in 0..5 {
        log(&slot, "main", &format!("I ({}) boot: step {}\n", i, i));
    }
    assert_eq!(fwd.buffered(), 5);

    let wire = Wire::default();
    fwd.activate(wire.transport(), Some("amp"), false, false)
        .unwrap();
    assert!(wire.sent().is_empty());

    log(&slot, "main", "W (99) app: first live line\n");

    let expected: Vec<String> = (0..5)
        .map(|i| format!("<134>1 - dev1 amp main - - I ({}) boot: step {}", i, i))
        .chain(std::iter::once(
            "<132>1 - dev1 amp main - - W (99) app: first live line".to_string(),
        ))
        .collect();
    assert_eq!(wire.sent(), expected);
    assert_eq!(fwd.buffered(), 0);
    assert_eq!(console.len(), 0);
}

#[test]
fn test_early_buffer_overflow_keeps_newest() {
    let (slot, _console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    fwd.start_early_buffering(3).unwrap();

    for i in 0..5 {
        log(&slot, "main", &format!("{}\n", i));
    }
    assert_eq!(fwd.buffered(), 3);
    assert_eq!(fwd.stats().evicted, 2);

    let wire = Wire::default();
    fwd.activate(wire.transport(), None, true, false).unwrap();
    log(&slot, "main", "5\n");
    assert_eq!(wire.sent(), ["2\n", "3\n", "4\n", "5\n"]);
}

#[test]
fn test_partial_lines_coalesced() {
    let (slot, _console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    fwd.start_early_buffering(4).unwrap();

    log(&slot, "main", "I (1) app: value=");
    log(&slot, "main", "42\n");

    let wire = Wire::default();
    fwd.activate(wire.transport(), Some("app"), false, false)
        .unwrap();
    log(&slot, "main", "I (2) app: done\n");
    assert_eq!(
        wire.sent()[0],
        "<134>1 - dev1 app main - - I (1) app: value=42"
    );
}

#[test]
fn test_restart_does_not_chain_to_itself() {
    let (slot, console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));

    for _ in 0..3 {
        fwd.start_early_buffering(4).unwrap();
        let wire = Wire::default();
        fwd.activate(wire.transport(), None, true, false).unwrap();
        fwd.stop();
        assert_eq!(slot.provenance(), Provenance::Foreign);
    }

    log(&slot, "main", "back to console\n");
    assert_eq!(console.texts(), ["back to console\n"]);
}

#[test]
fn test_second_forwarder_falls_back_to_default() {
    let (slot, console) = console_slot();
    let first = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    let second = Forwarder::with_slot(test_config(), Arc::clone(&slot));

    let wire_a = Wire::default();
    first
        .activate(wire_a.transport(), None, true, false)
        .unwrap();
    let wire_b = Wire::default();
    second
        .activate(wire_b.transport(), None, true, false)
        .unwrap();
    assert_eq!(slot.provenance(), Provenance::Forwarder(second.id()));

    wire_b.break_link();
    log(&slot, "main", "x\n");

    // The second forwarder never remembered the first one's handler
    assert_eq!(slot.provenance(), Provenance::Foreign);
    assert!(wire_a.sent().is_empty());
    assert_eq!(console.texts().last().map(String::as_str), Some("x\n"));

    // The first one no longer owns the slot, so stopping leaves it alone
    first.stop();
    assert_eq!(slot.provenance(), Provenance::Foreign);
    log(&slot, "main", "y\n");
    assert_eq!(console.texts().last().map(String::as_str), Some("y\n"));
}

#[test]
fn test_foreign_sink_installed_over_forwarder_is_kept() {
    let (slot, console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    let wire = Wire::default();
    fwd.activate(wire.transport(), None, true, false).unwrap();

    let other = Arc::new(common::Recorder::default());
    slot.install(other.clone(), Provenance::Foreign);
    fwd.stop();

    log(&slot, "main", "z\n");
    assert_eq!(other.texts(), ["z\n"]);
    assert_eq!(console.len(), 0);
}

#[test]
fn test_start_failure_keeps_buffering() {
    let config = ForwarderConfig::builder()
        .hostname("dev1")
        .mdns_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let (slot, _console) = console_slot();
    let fwd = Forwarder::with_slot(config, Arc::clone(&slot));
    fwd.start_early_buffering(4).unwrap();
    log(&slot, "main", "kept\n");

    let result = fwd.start("no-such-collector.invalid", 514, None, false, false);
    assert!(matches!(result, Err(ForwarderError::Resolve { .. })));
    assert_eq!(fwd.state(), ForwarderState::EarlyBuffering);
    assert_eq!(fwd.buffered(), 1);
}

#[test]
fn test_concurrent_callers_keep_per_thread_order() {
    let (slot, _console) = console_slot();
    let fwd = Forwarder::with_slot(test_config(), Arc::clone(&slot));
    let wire = Wire::default();
    fwd.activate(wire.transport(), None, true, false).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let task = format!("worker{}", t);
                for i in 0..50 {
                    log(&slot, &task, &format!("{} {}\n", t, i));
                }
                // Network task noise, drained by the ordinary lines
                log(&slot, "wifi", &format!("{} stack\n", t));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    fwd.stop();

    let sent = wire.sent();
    assert_eq!(sent.len(), 4 * 51);
    for t in 0..4 {
        let seen: Vec<usize> = sent
            .iter()
            .filter_map(|line| line.strip_prefix(&format!("{} ", t)))
            .filter_map(|rest| rest.trim_end().parse().ok())
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}
