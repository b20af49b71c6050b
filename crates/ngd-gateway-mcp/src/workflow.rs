// crates/ngd-gateway-mcp/src/workflow.rs
// ============================================================================
// Module: Workflow Gate
// Description: Per-session state machine enforcing discovery before query.
// Purpose: Reject filtered searches until context and queryables are known.
// Dependencies: ngd-gateway-config, serde, thiserror
// ============================================================================

//! ## Overview
//! Each session moves through `Uninitialized -> ContextEstablished ->
//! QueryablesFetched`. Tools declare a static [`ToolTier`]; the gate denies a
//! tool whose tier is above the session's state.
//!
//! ## Invariants
//! - Denial never mutates state.
//! - Advances take `max(current, target)` under the session's own lock, so
//!   concurrent duplicate calls can never regress a session.
//! - An advance applies only when the session already holds the target's
//!   predecessor state. A fetch that completes after a reset is discarded.
//! - Only an explicit reset moves a session backwards.
//! - At most `max_sessions` records are held. When full, uninitialized
//!   records go first, then the least recently used one.
//! - The table lock is taken before a session lock, never after.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use ngd_gateway_config::ServerConfig;
use serde::Serialize;
use thiserror::Error;

use crate::envelope::ErrorCode;
use crate::identity::SessionId;
use crate::tools::ToolName;

// ============================================================================
// SECTION: States and Tiers
// ============================================================================

/// Workflow state of a session, ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No context has been established.
    #[default]
    Uninitialized,
    /// `get_workflow_context` has succeeded.
    ContextEstablished,
    /// `fetch_detailed_collections` has succeeded for at least one collection.
    QueryablesFetched,
}

impl SessionState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::ContextEstablished => "CONTEXT_ESTABLISHED",
            Self::QueryablesFetched => "QUERYABLES_FETCHED",
        }
    }

    /// Returns the state a session must hold before advancing to `self`.
    #[must_use]
    pub const fn predecessor(self) -> Self {
        match self {
            Self::Uninitialized | Self::ContextEstablished => Self::Uninitialized,
            Self::QueryablesFetched => Self::ContextEstablished,
        }
    }
}

/// Minimum workflow state a tool requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    /// Always allowed.
    Open,
    /// Requires an established context.
    RequiresContext,
    /// Requires fetched queryables.
    RequiresQueryables,
}

impl ToolTier {
    /// Returns the lowest state that satisfies the tier.
    #[must_use]
    pub const fn required_state(self) -> SessionState {
        match self {
            Self::Open => SessionState::Uninitialized,
            Self::RequiresContext => SessionState::ContextEstablished,
            Self::RequiresQueryables => SessionState::QueryablesFetched,
        }
    }
}

/// Gate denial reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateDenial {
    /// The session has no established context.
    #[error("workflow context required: call get_workflow_context first")]
    ContextRequired,
    /// The session has not fetched queryables.
    #[error("queryables required: call fetch_detailed_collections for the target collection first")]
    QueryablesRequired,
}

impl GateDenial {
    /// Returns the envelope code for the denial.
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::ContextRequired => ErrorCode::WorkflowContextRequired,
            Self::QueryablesRequired => ErrorCode::QueryablesRequired,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Collections whose queryables were fetched in this session.
    pub queryable_collections: BTreeSet<String>,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Stored record for one session.
#[derive(Debug, Default)]
struct SessionRecord {
    /// Visible state.
    snapshot: SessionSnapshot,
    /// Gate clock value at the last access.
    last_used: u64,
}

/// Shared handle to one session's record.
type SessionSlot = Arc<Mutex<SessionRecord>>;

/// Workflow gate keyed by session.
pub struct WorkflowGate {
    /// Upper bound on tracked sessions.
    max_sessions: usize,
    /// Logical clock ordering session accesses.
    clock: AtomicU64,
    /// Per-session records.
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl Default for WorkflowGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowGate {
    /// Creates an empty, unbounded gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_sessions: usize::MAX,
            clock: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a gate bounded by `server.max_sessions`.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new().with_max_sessions(config.max_sessions)
    }

    /// Returns a copy bounded to `max_sessions` tracked sessions.
    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Checks whether `tool` may run in `session`.
    ///
    /// # Errors
    ///
    /// Returns [`GateDenial`] when the session has not reached the tool's tier.
    pub fn authorize(&self, session: &SessionId, tool: ToolName) -> Result<(), GateDenial> {
        self.authorize_tier(session, tool.tier())
    }

    /// Checks whether a tier is satisfied in `session`.
    ///
    /// # Errors
    ///
    /// Returns [`GateDenial`] when the session has not reached the tier.
    pub fn authorize_tier(&self, session: &SessionId, tier: ToolTier) -> Result<(), GateDenial> {
        let state = self.read(session, true).state;
        if state >= tier.required_state() {
            return Ok(());
        }
        match tier {
            ToolTier::RequiresQueryables if state >= SessionState::ContextEstablished => {
                Err(GateDenial::QueryablesRequired)
            }
            _ => Err(GateDenial::ContextRequired),
        }
    }

    /// Advances a session to at least `target`, recording any collections
    /// whose queryables were fetched. Returns the resulting state.
    ///
    /// The advance is dropped when the session no longer holds the target's
    /// predecessor, which happens when a reset lands while the work that
    /// earned the advance was in flight.
    pub fn advance(
        &self,
        session: &SessionId,
        target: SessionState,
        collections: &[String],
    ) -> SessionState {
        let required = target.predecessor();
        let slot = if required == SessionState::Uninitialized {
            self.slot(session)
        } else {
            match self.existing(session) {
                Some(slot) => slot,
                None => return SessionState::Uninitialized,
            }
        };
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        record.last_used = self.tick();
        if record.snapshot.state < required {
            return record.snapshot.state;
        }
        record.snapshot.state = record.snapshot.state.max(target);
        if target == SessionState::QueryablesFetched {
            record.snapshot.queryable_collections.extend(collections.iter().cloned());
        }
        record.snapshot.state
    }

    /// Resets a session to `Uninitialized`. Unknown sessions are left untracked.
    pub fn reset(&self, session: &SessionId) -> SessionState {
        if let Some(slot) = self.existing(session) {
            let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
            record.snapshot = SessionSnapshot::default();
            record.last_used = self.tick();
        }
        SessionState::Uninitialized
    }

    /// Drops a session's record when its owning session ends.
    pub fn end_session(&self, session: &SessionId) -> bool {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).remove(session).is_some()
    }

    /// Returns the session's current state without creating a record.
    #[must_use]
    pub fn state(&self, session: &SessionId) -> SessionState {
        self.snapshot(session).state
    }

    /// Returns a copy of the session's record without creating one.
    #[must_use]
    pub fn snapshot(&self, session: &SessionId) -> SessionSnapshot {
        self.read(session, false)
    }

    /// Returns the number of tracked sessions.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copies a session's record, optionally marking it as used.
    fn read(&self, session: &SessionId, touch: bool) -> SessionSnapshot {
        let Some(slot) = self.existing(session) else {
            return SessionSnapshot::default();
        };
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if touch {
            record.last_used = self.tick();
        }
        record.snapshot.clone()
    }

    /// Returns the next clock value.
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the session's record if it is tracked.
    fn existing(&self, session: &SessionId) -> Option<SessionSlot> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).get(session).cloned()
    }

    /// Returns the session's record, inserting an empty one if missing.
    fn slot(&self, session: &SessionId) -> SessionSlot {
        let mut table = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = table.get(session) {
            return Arc::clone(slot);
        }
        if table.len() >= self.max_sessions {
            table.retain(|_, slot| {
                slot.lock().unwrap_or_else(PoisonError::into_inner).snapshot.state
                    != SessionState::Uninitialized
            });
        }
        while table.len() >= self.max_sessions {
            let oldest = table
                .iter()
                .min_by_key(|(_, slot)| slot.lock().unwrap_or_else(PoisonError::into_inner).last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    table.remove(&id);
                }
                None => break,
            }
        }
        let slot: SessionSlot = Arc::new(Mutex::new(SessionRecord::default()));
        table.insert(session.clone(), Arc::clone(&slot));
        slot
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
