//! In-memory `IntakeStore` — for tests and single-process demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::model::{
    ContractorProfileRecord, ContractorState, DailyReportRecord, FieldWorkerState,
};
use crate::state::store::{IntakeStore, LogDirection};

/// One audit-log line, kept so tests can assert on what was written.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub user_id: String,
    pub channel: String,
    pub direction: LogDirection,
    pub text: String,
    pub at: chrono::DateTime<Utc>,
}

/// HashMap-backed store. States are cloned on the way in and out, so callers
/// get the same full-replace semantics as the SQL backend.
#[derive(Default)]
pub struct MemoryStore {
    report_states: RwLock<HashMap<(String, NaiveDate), FieldWorkerState>>,
    contractor_states: RwLock<HashMap<String, ContractorState>>,
    daily_reports: RwLock<HashMap<(String, NaiveDate), DailyReportRecord>>,
    contractor_profiles: RwLock<HashMap<String, ContractorProfileRecord>>,
    conversation_log: RwLock<Vec<LogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the conversation log, oldest first.
    pub async fn conversation_log(&self) -> Vec<LogEntry> {
        self.conversation_log.read().await.clone()
    }

    /// Number of persisted daily-report records (for idempotence asserts).
    pub async fn daily_report_count(&self) -> usize {
        self.daily_reports.read().await.len()
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn get_report_state(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<FieldWorkerState, StoreError> {
        let states = self.report_states.read().await;
        Ok(states
            .get(&(user_id.to_string(), date))
            .cloned()
            .unwrap_or_else(|| FieldWorkerState::new(user_id, date)))
    }

    async fn put_report_state(&self, state: &FieldWorkerState) -> Result<(), StoreError> {
        let mut states = self.report_states.write().await;
        states.insert((state.user_id.clone(), state.date), state.clone());
        Ok(())
    }

    async fn get_contractor_state(&self, user_id: &str) -> Result<ContractorState, StoreError> {
        let states = self.contractor_states.read().await;
        Ok(states
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| ContractorState::new(user_id)))
    }

    async fn put_contractor_state(&self, state: &ContractorState) -> Result<(), StoreError> {
        let mut states = self.contractor_states.write().await;
        states.insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn upsert_daily_report(&self, record: &DailyReportRecord) -> Result<(), StoreError> {
        let mut records = self.daily_reports.write().await;
        records.insert((record.user_id.clone(), record.date), record.clone());
        Ok(())
    }

    async fn get_daily_report(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, StoreError> {
        let records = self.daily_reports.read().await;
        Ok(records.get(&(user_id.to_string(), date)).cloned())
    }

    async fn upsert_contractor_profile(
        &self,
        record: &ContractorProfileRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.contractor_profiles.write().await;
        records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get_contractor_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<ContractorProfileRecord>, StoreError> {
        let records = self.contractor_profiles.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn append_conversation(
        &self,
        user_id: &str,
        channel: &str,
        direction: LogDirection,
        text: &str,
    ) -> Result<(), StoreError> {
        let mut log = self.conversation_log.write().await;
        log.push(LogEntry {
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            direction,
            text: text.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }
}
