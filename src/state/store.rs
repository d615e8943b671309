//! State store contract and per-scope serialization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::state::model::{
    ContractorProfileRecord, ContractorState, DailyReportRecord, FieldWorkerState,
};

// ── Scope keys ──────────────────────────────────────────────────────

/// Key under which one live conversation state is stored.
///
/// Exactly one live state exists per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Reporting workflow: one state per (user, calendar day).
    Report { user_id: String, date: NaiveDate },
    /// Onboarding workflow: one lifetime state per user.
    Onboarding { user_id: String },
}

impl ScopeKey {
    pub fn report(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::Report {
            user_id: user_id.into(),
            date,
        }
    }

    pub fn onboarding(user_id: impl Into<String>) -> Self {
        Self::Onboarding {
            user_id: user_id.into(),
        }
    }
}

// ── Conversation log ────────────────────────────────────────────────

/// Direction of a conversation-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDirection {
    Inbound,
    Outbound,
}

impl std::fmt::Display for LogDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        };
        write!(f, "{s}")
    }
}

// ── Store trait ─────────────────────────────────────────────────────

/// Backend-agnostic persistence for conversation states, finalized records,
/// and the append-only conversation log.
///
/// The store performs no merging — all merge logic lives in the workflows.
/// `get_*_state` returns a freshly default-initialized state when no row
/// exists for the key; `put_*_state` replaces the full state for that key.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    // ── Conversation states ─────────────────────────────────────────

    async fn get_report_state(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<FieldWorkerState, StoreError>;

    async fn put_report_state(&self, state: &FieldWorkerState) -> Result<(), StoreError>;

    async fn get_contractor_state(&self, user_id: &str) -> Result<ContractorState, StoreError>;

    async fn put_contractor_state(&self, state: &ContractorState) -> Result<(), StoreError>;

    // ── Finalized records ───────────────────────────────────────────

    /// Persist a completed daily report. Idempotent on (user, date): a
    /// retried finalization replaces the row instead of duplicating it.
    async fn upsert_daily_report(&self, record: &DailyReportRecord) -> Result<(), StoreError>;

    async fn get_daily_report(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, StoreError>;

    /// Persist a submitted contractor profile. Idempotent on user id.
    async fn upsert_contractor_profile(
        &self,
        record: &ContractorProfileRecord,
    ) -> Result<(), StoreError>;

    async fn get_contractor_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<ContractorProfileRecord>, StoreError>;

    // ── Conversation log ────────────────────────────────────────────

    /// Append one entry to the audit log. Callers treat failures as
    /// non-fatal — a reply is never blocked on the log.
    async fn append_conversation(
        &self,
        user_id: &str,
        channel: &str,
        direction: LogDirection,
        text: &str,
    ) -> Result<(), StoreError>;
}

// ── Per-scope serialization ─────────────────────────────────────────

/// One async mutex per active scope key.
///
/// Two messages from the same user arriving close together would otherwise
/// race on the store's read-modify-write cycle; the dispatcher holds the
/// scope's lock for the duration of one workflow invocation so merges are
/// atomic per key. Keys are user-scoped, so no global locking is involved.
#[derive(Default)]
pub struct ScopeLocks {
    locks: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a scope key, creating it on first use.
    ///
    /// The map grows with active scopes; entries are small and bounded by
    /// the user population.
    pub async fn acquire(&self, key: &ScopeKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
