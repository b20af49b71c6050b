// crates/ngd-gateway-mcp/src/workflow/tests.rs
// ============================================================================
// Module: Workflow Gate Unit Tests
// Description: Tests for tier enforcement and monotonic transitions.
// Purpose: Ensure sessions never regress except on explicit reset.
// Dependencies: ngd-gateway-mcp
// ============================================================================

//! ## Overview
//! Exercises gate denials, advances, resets, session bounds, and concurrent
//! advances.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

use std::sync::Arc;
use std::thread;

use ngd_gateway_config::ServerConfig;

use super::GateDenial;
use super::SessionState;
use super::WorkflowGate;
use crate::envelope::ErrorCode;
use crate::identity::SessionId;
use crate::tools::ToolName;

fn session(name: &str) -> SessionId {
    SessionId::new(name)
}

fn fetched(gate: &WorkflowGate, s: &SessionId) {
    gate.advance(s, SessionState::ContextEstablished, &[]);
    gate.advance(s, SessionState::QueryablesFetched, &["a-1".to_string()]);
}

#[test]
fn open_tools_are_always_allowed() {
    let gate = WorkflowGate::new();
    let s = session("S");
    assert!(gate.authorize(&s, ToolName::HelloWorld).is_ok());
    assert!(gate.authorize(&s, ToolName::GetWorkflowContext).is_ok());
    assert_eq!(gate.tracked_sessions(), 0);
}

#[test]
fn search_follows_the_discovery_sequence() {
    let gate = WorkflowGate::new();
    let s = session("S");
    assert_eq!(
        gate.authorize(&s, ToolName::SearchFeatures),
        Err(GateDenial::ContextRequired)
    );
    assert_eq!(gate.state(&s), SessionState::Uninitialized);

    gate.advance(&s, SessionState::ContextEstablished, &[]);
    assert!(gate.authorize(&s, ToolName::ListCollections).is_ok());
    let denial = gate.authorize(&s, ToolName::SearchFeatures).unwrap_err();
    assert_eq!(denial, GateDenial::QueryablesRequired);
    assert_eq!(denial.code(), ErrorCode::QueryablesRequired);

    gate.advance(&s, SessionState::QueryablesFetched, &["bld-fts-building-1".to_string()]);
    assert!(gate.authorize(&s, ToolName::SearchFeatures).is_ok());
    let snapshot = gate.snapshot(&s);
    assert!(snapshot.queryable_collections.contains("bld-fts-building-1"));
}

#[test]
fn context_tools_denied_before_context() {
    let gate = WorkflowGate::new();
    let denial = gate.authorize(&session("S"), ToolName::ListCollections).unwrap_err();
    assert_eq!(denial.code(), ErrorCode::WorkflowContextRequired);
}

#[test]
fn advance_never_regresses() {
    let gate = WorkflowGate::new();
    let s = session("S");
    fetched(&gate, &s);
    let state = gate.advance(&s, SessionState::ContextEstablished, &[]);
    assert_eq!(state, SessionState::QueryablesFetched);
}

#[test]
fn reset_returns_to_uninitialized() {
    let gate = WorkflowGate::new();
    let s = session("S");
    fetched(&gate, &s);
    assert_eq!(gate.reset(&s), SessionState::Uninitialized);
    assert!(gate.snapshot(&s).queryable_collections.is_empty());
    assert_eq!(gate.authorize(&s, ToolName::GetFeature), Err(GateDenial::ContextRequired));
}

#[test]
fn sessions_are_isolated_and_can_end() {
    let gate = WorkflowGate::new();
    gate.advance(&session("A"), SessionState::ContextEstablished, &[]);
    assert_eq!(gate.state(&session("B")), SessionState::Uninitialized);
    assert!(gate.end_session(&session("A")));
    assert!(!gate.end_session(&session("A")));
    assert_eq!(gate.state(&session("A")), SessionState::Uninitialized);
}

#[test]
fn concurrent_context_burst_never_regresses_fetched_session() {
    let gate = Arc::new(WorkflowGate::new());
    let s = session("S");
    fetched(&gate, &s);
    let handles: Vec<_> = (0 .. 16)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let s = s.clone();
            thread::spawn(move || {
                for _ in 0 .. 100 {
                    gate.advance(&s, SessionState::ContextEstablished, &[]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(gate.state(&s), SessionState::QueryablesFetched);
}

#[test]
fn queryables_advance_requires_context() {
    let gate = WorkflowGate::new();
    let s = session("S");
    let state = gate.advance(&s, SessionState::QueryablesFetched, &["a-1".to_string()]);
    assert_eq!(state, SessionState::Uninitialized);
    assert_eq!(gate.tracked_sessions(), 0);
    assert_eq!(gate.authorize(&s, ToolName::SearchFeatures), Err(GateDenial::ContextRequired));
}

#[test]
fn fetch_completing_after_reset_is_discarded() {
    let gate = WorkflowGate::new();
    let s = session("S");
    gate.advance(&s, SessionState::ContextEstablished, &[]);
    gate.reset(&s);
    let state = gate.advance(&s, SessionState::QueryablesFetched, &["a-1".to_string()]);
    assert_eq!(state, SessionState::Uninitialized);
    assert!(gate.snapshot(&s).queryable_collections.is_empty());
}

#[test]
fn reset_of_unknown_session_tracks_nothing() {
    let gate = WorkflowGate::new();
    for index in 0 .. 500 {
        assert_eq!(gate.reset(&session(&format!("S{index}"))), SessionState::Uninitialized);
    }
    assert_eq!(gate.tracked_sessions(), 0);
}

#[test]
fn session_table_stays_within_bound() {
    let gate = WorkflowGate::new().with_max_sessions(8);
    for index in 0 .. 100 {
        gate.advance(&session(&format!("S{index}")), SessionState::ContextEstablished, &[]);
    }
    assert_eq!(gate.tracked_sessions(), 8);
    assert_eq!(gate.state(&session("S99")), SessionState::ContextEstablished);
    assert_eq!(gate.state(&session("S0")), SessionState::Uninitialized);
}

#[test]
fn eviction_prefers_idle_then_least_recently_used() {
    let gate = WorkflowGate::new().with_max_sessions(3);
    fetched(&gate, &session("A"));
    gate.advance(&session("B"), SessionState::ContextEstablished, &[]);
    gate.advance(&session("C"), SessionState::ContextEstablished, &[]);
    gate.reset(&session("C"));
    assert!(gate.authorize(&session("A"), ToolName::SearchFeatures).is_ok());

    gate.advance(&session("D"), SessionState::ContextEstablished, &[]);
    assert_eq!(gate.tracked_sessions(), 3);
    assert_eq!(gate.state(&session("A")), SessionState::QueryablesFetched);
    assert_eq!(gate.state(&session("B")), SessionState::ContextEstablished);

    gate.advance(&session("E"), SessionState::ContextEstablished, &[]);
    assert_eq!(gate.tracked_sessions(), 3);
    assert_eq!(gate.state(&session("B")), SessionState::Uninitialized);
    assert_eq!(gate.state(&session("A")), SessionState::QueryablesFetched);
}

#[test]
fn configured_bound_comes_from_server_section() {
    let config = ServerConfig {
        max_sessions: 2,
        ..ServerConfig::default()
    };
    let gate = WorkflowGate::from_config(&config);
    for name in ["A", "B", "C"] {
        gate.advance(&session(name), SessionState::ContextEstablished, &[]);
    }
    assert_eq!(gate.tracked_sessions(), 2);
}
