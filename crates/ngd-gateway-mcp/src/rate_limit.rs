// crates/ngd-gateway-mcp/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiter
// Description: Per-client sliding-window admission control.
// Purpose: Protect the upstream API from overload by any single caller.
// Dependencies: ngd-gateway-config
// ============================================================================

//! ## Overview
//! [`RateLimiter`] keeps a sliding-window log of admitted request instants
//! per [`ClientId`]. Each call prunes instants older than the window and
//! admits when fewer than the client's limit remain.
//!
//! ## Invariants
//! - Never admits more than the configured limit within any window.
//! - `retry_after` on rejection is always positive and equals the time until
//!   the oldest admitted instant leaves the window.
//! - Each client's log is guarded by its own mutex; the shared table lock is
//!   held only to look up or insert a slot.
//! - Calls never block on I/O.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use ngd_gateway_config::RateLimitConfig;

use crate::identity::ClientId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Smallest retry delay reported to callers.
const MIN_RETRY_AFTER: Duration = Duration::from_millis(1);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Admission decision for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Allowed,
    /// The call was rejected.
    Rejected {
        /// Time until the next call can be admitted.
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns true when the call was admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Admitted request instants for one client.
type RateWindow = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-window rate limiter keyed by client identity.
pub struct RateLimiter {
    /// Whether admission control is active.
    enabled: bool,
    /// Window length.
    window: Duration,
    /// Default per-window ceiling.
    default_limit: u32,
    /// Per-client ceiling overrides.
    overrides: BTreeMap<String, u32>,
    /// Maximum number of tracked clients.
    max_entries: usize,
    /// Per-client request logs.
    windows: Mutex<HashMap<ClientId, RateWindow>>,
}

impl RateLimiter {
    /// Builds a limiter with a single ceiling for every client.
    #[must_use]
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            enabled: true,
            window,
            default_limit: max_requests,
            overrides: BTreeMap::new(),
            max_entries: usize::MAX,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a limiter from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let overrides = config
            .overrides
            .iter()
            .map(|entry| (entry.client.clone(), entry.max_requests))
            .collect();
        Self {
            enabled: config.enabled,
            window: Duration::from_millis(config.window_ms),
            default_limit: config.max_requests,
            overrides,
            max_entries: config.max_entries,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy with a ceiling override for one client.
    #[must_use]
    pub fn with_override(mut self, client: &ClientId, max_requests: u32) -> Self {
        self.overrides.insert(client.as_str().to_string(), max_requests);
        self
    }

    /// Returns a copy bounded to `max_entries` tracked clients.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Returns the per-window ceiling for a client.
    #[must_use]
    pub fn limit_for(&self, client: &ClientId) -> u32 {
        self.overrides.get(client.as_str()).copied().unwrap_or(self.default_limit)
    }

    /// Returns the configured window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Admits or rejects a call at the current instant.
    #[must_use]
    pub fn admit(&self, client: &ClientId) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Admits or rejects a call at an explicit instant.
    #[must_use]
    pub fn admit_at(&self, client: &ClientId, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }
        let Some(slot) = self.slot(client, now) else {
            return Admission::Rejected {
                retry_after: self.window.max(MIN_RETRY_AFTER),
            };
        };
        let limit = usize::try_from(self.limit_for(client)).unwrap_or(usize::MAX);
        let mut log = slot.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut log, now, self.window);
        if log.len() < limit {
            log.push_back(now);
            return Admission::Allowed;
        }
        let retry_after = log.front().map_or(self.window, |oldest| {
            oldest.checked_add(self.window).map_or(self.window, |free_at| {
                free_at.saturating_duration_since(now)
            })
        });
        Admission::Rejected {
            retry_after: retry_after.max(MIN_RETRY_AFTER),
        }
    }

    /// Returns the client's log, inserting one when the table has room.
    fn slot(&self, client: &ClientId, now: Instant) -> Option<RateWindow> {
        let mut table = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = table.get(client) {
            return Some(Arc::clone(slot));
        }
        if table.len() >= self.max_entries {
            let window = self.window;
            table.retain(|_, slot| {
                let mut log = slot.lock().unwrap_or_else(PoisonError::into_inner);
                prune(&mut log, now, window);
                !log.is_empty()
            });
            if table.len() >= self.max_entries {
                return None;
            }
        }
        let slot: RateWindow = Arc::new(Mutex::new(VecDeque::new()));
        table.insert(client.clone(), Arc::clone(&slot));
        Some(slot)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Drops instants that have left the window ending at `now`.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.saturating_duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
