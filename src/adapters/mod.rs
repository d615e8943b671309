//! Adapter contracts consumed by the workflows.
//!
//! Extraction, validation, scoring, and object storage are opaque, possibly
//! slow, possibly failing capabilities. The workflows call them through
//! these traits and wrap every call in a bounded timeout; nothing here leaks
//! how an implementation reasons.

pub mod llm;
pub mod storage;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::MediaPayload;
use crate::error::AdapterError;
use crate::state::model::{ProfileField, ProfileFields, ReportField, ReportFields};

// ── Transient results (never persisted) ─────────────────────────────

/// Extraction output for a daily report turn.
///
/// `missing` is the adapter's own view and is used for logging only — the
/// workflows always re-derive missing fields from the merged record.
#[derive(Debug, Clone, Default)]
pub struct ReportExtraction {
    pub fields: ReportFields,
    pub missing: Vec<ReportField>,
}

/// Extraction output for a contractor profile turn.
#[derive(Debug, Clone, Default)]
pub struct ProfileExtraction {
    pub fields: ProfileFields,
    pub missing: Vec<ProfileField>,
}

/// Verdict on a work-proof photo.
#[derive(Debug, Clone)]
pub struct ProofAnalysis {
    pub valid: bool,
    pub explanation: String,
    pub confidence: f32,
}

/// Verdict on an onboarding document, with any fields read off it.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub valid: bool,
    pub extracted: ProfileFields,
    pub explanation: String,
}

// ── Adapter traits ──────────────────────────────────────────────────

/// Pulls structured fields out of free text.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_report(
        &self,
        text: &str,
        current: &ReportFields,
        required: &[ReportField],
    ) -> Result<ReportExtraction, AdapterError>;

    async fn extract_profile(
        &self,
        text: &str,
        current: &ProfileFields,
        required: &[ProfileField],
    ) -> Result<ProfileExtraction, AdapterError>;
}

/// Judges whether a photo plausibly evidences the reported work.
#[async_trait]
pub trait ProofValidator: Send + Sync {
    async fn validate_proof(
        &self,
        report: &ReportFields,
        media_url: &str,
    ) -> Result<ProofAnalysis, AdapterError>;
}

/// Judges an onboarding document and reads fields off it.
#[async_trait]
pub trait DocumentValidator: Send + Sync {
    async fn validate_document(&self, media_url: &str) -> Result<DocumentAnalysis, AdapterError>;
}

/// Scores a finalized report against its validation verdict.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Returns a quality score in [0, 10].
    async fn score(
        &self,
        report: &ReportFields,
        analysis: &ProofAnalysis,
    ) -> Result<f32, AdapterError>;
}

/// Uploads raw media and returns a stable reference URL.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, owner_id: &str, media: &MediaPayload) -> Result<String, AdapterError>;
}

// ── Bounded timeout ─────────────────────────────────────────────────

/// Wrap an adapter call in a bounded timeout.
///
/// Expiry yields `AdapterError::Timeout`; the caller must not have written
/// any state before the call resolves, so a timeout never leaves a
/// half-merged record behind.
pub async fn bounded<T, F>(name: &str, timeout: Duration, call: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            name: name.to_string(),
            timeout,
        }),
    }
}
