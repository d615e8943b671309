//! libSQL backend — async `IntakeStore` implementation.
//!
//! Conversation states are stored as one JSON blob per scope key, matching
//! the contract's full-replace `put`. Finalized records get real columns so
//! the reporting views can query them directly.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::state::migrations;
use crate::state::model::{
    ContractorProfileRecord, ContractorState, DailyReportRecord, FieldWorkerState,
    VerificationStatus,
};
use crate::state::store::{IntakeStore, LogDirection};

/// libSQL store backend.
///
/// Holds a single connection reused for all operations; `libsql::Connection`
/// is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Intake database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    s.parse::<NaiveDate>()
        .map_err(|e| StoreError::Serialization(format!("Bad date column '{s}': {e}")))
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn verification_to_str(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::CollectingProfile => "collecting_profile",
        VerificationStatus::CollectingDocuments => "collecting_documents",
        VerificationStatus::PendingReview => "pending_review",
        VerificationStatus::Verified => "verified",
    }
}

fn str_to_verification(s: &str) -> VerificationStatus {
    match s {
        "collecting_documents" => VerificationStatus::CollectingDocuments,
        "pending_review" => VerificationStatus::PendingReview,
        "verified" => VerificationStatus::Verified,
        _ => VerificationStatus::CollectingProfile,
    }
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<f64>` to a libsql Value.
fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn urls_to_json(urls: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(urls).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn json_to_urls(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

#[async_trait]
impl IntakeStore for LibSqlStore {
    async fn get_report_state(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<FieldWorkerState, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM report_states WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_report_state: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_report_state row: {e}")))?
        {
            Some(row) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("state column: {e}")))?;
                serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(format!("report state: {e}")))
            }
            None => Ok(FieldWorkerState::new(user_id, date)),
        }
    }

    async fn put_report_state(&self, state: &FieldWorkerState) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO report_states (user_id, date, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, date) DO UPDATE SET state = ?3, updated_at = ?4",
                params![
                    state.user_id.as_str(),
                    state.date.to_string(),
                    json,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put_report_state: {e}")))?;
        Ok(())
    }

    async fn get_contractor_state(&self, user_id: &str) -> Result<ContractorState, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM contractor_states WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_contractor_state: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_contractor_state row: {e}")))?
        {
            Some(row) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("state column: {e}")))?;
                serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(format!("contractor state: {e}")))
            }
            None => Ok(ContractorState::new(user_id)),
        }
    }

    async fn put_contractor_state(&self, state: &ContractorState) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO contractor_states (user_id, state, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET state = ?2, updated_at = ?3",
                params![state.user_id.as_str(), json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put_contractor_state: {e}")))?;
        Ok(())
    }

    async fn upsert_daily_report(&self, record: &DailyReportRecord) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO daily_reports
                   (user_id, date, description, site, hours, blockers, proof_urls,
                    productivity_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (user_id, date) DO UPDATE SET
                   description = ?3, site = ?4, hours = ?5, blockers = ?6,
                   proof_urls = ?7, productivity_score = ?8",
                params![
                    record.user_id.as_str(),
                    record.date.to_string(),
                    opt_text(record.description.as_deref()),
                    opt_text(record.site.as_deref()),
                    opt_real(record.hours),
                    opt_text(record.blockers.as_deref()),
                    urls_to_json(&record.proof_urls)?,
                    record.productivity_score as f64,
                    record.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_daily_report: {e}")))?;
        Ok(())
    }

    async fn get_daily_report(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, date, description, site, hours, blockers, proof_urls,
                        productivity_score, created_at
                 FROM daily_reports WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_daily_report: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_daily_report row: {e}")))?
        else {
            return Ok(None);
        };

        let date_str: String = row
            .get(1)
            .map_err(|e| StoreError::Query(format!("date column: {e}")))?;
        let proof_urls: String = row
            .get(6)
            .map_err(|e| StoreError::Query(format!("proof_urls column: {e}")))?;
        let created_str: String = row
            .get(8)
            .map_err(|e| StoreError::Query(format!("created_at column: {e}")))?;

        Ok(Some(DailyReportRecord {
            user_id: row
                .get(0)
                .map_err(|e| StoreError::Query(format!("user_id column: {e}")))?,
            date: parse_date(&date_str)?,
            description: row.get(2).ok(),
            site: row.get(3).ok(),
            hours: row.get::<f64>(4).ok(),
            blockers: row.get(5).ok(),
            proof_urls: json_to_urls(&proof_urls),
            productivity_score: row
                .get::<f64>(7)
                .map_err(|e| StoreError::Query(format!("score column: {e}")))?
                as f32,
            created_at: parse_datetime(&created_str),
        }))
    }

    async fn upsert_contractor_profile(
        &self,
        record: &ContractorProfileRecord,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO contractor_profiles
                   (user_id, company_name, license_number, gst, category, document_urls,
                    verification_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (user_id) DO UPDATE SET
                   company_name = ?2, license_number = ?3, gst = ?4, category = ?5,
                   document_urls = ?6, verification_status = ?7",
                params![
                    record.user_id.as_str(),
                    record.company_name.as_str(),
                    record.license_number.as_str(),
                    record.gst.as_str(),
                    record.category.as_str(),
                    urls_to_json(&record.document_urls)?,
                    verification_to_str(record.verification_status),
                    record.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_contractor_profile: {e}")))?;
        Ok(())
    }

    async fn get_contractor_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<ContractorProfileRecord>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, company_name, license_number, gst, category, document_urls,
                        verification_status, created_at
                 FROM contractor_profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_contractor_profile: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_contractor_profile row: {e}")))?
        else {
            return Ok(None);
        };

        let document_urls: String = row
            .get(5)
            .map_err(|e| StoreError::Query(format!("document_urls column: {e}")))?;
        let status_str: String = row
            .get(6)
            .map_err(|e| StoreError::Query(format!("status column: {e}")))?;
        let created_str: String = row
            .get(7)
            .map_err(|e| StoreError::Query(format!("created_at column: {e}")))?;

        Ok(Some(ContractorProfileRecord {
            user_id: row
                .get(0)
                .map_err(|e| StoreError::Query(format!("user_id column: {e}")))?,
            company_name: row
                .get(1)
                .map_err(|e| StoreError::Query(format!("company_name column: {e}")))?,
            license_number: row
                .get(2)
                .map_err(|e| StoreError::Query(format!("license_number column: {e}")))?,
            gst: row
                .get(3)
                .map_err(|e| StoreError::Query(format!("gst column: {e}")))?,
            category: row
                .get(4)
                .map_err(|e| StoreError::Query(format!("category column: {e}")))?,
            document_urls: json_to_urls(&document_urls),
            verification_status: str_to_verification(&status_str),
            created_at: parse_datetime(&created_str),
        }))
    }

    async fn append_conversation(
        &self,
        user_id: &str,
        channel: &str,
        direction: LogDirection,
        text: &str,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_log (id, user_id, channel, direction, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    channel,
                    direction.to_string(),
                    text,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_conversation: {e}")))?;
        Ok(())
    }
}
