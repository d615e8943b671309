//! Conversation state and finalized records.
//!
//! `missing_fields` on both states is derived data: it is always recomputed
//! as (required set) minus (fields with a value), never set independently.
//! Status transitions are monotonic — nothing in this crate moves a state
//! backwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Daily report fields ─────────────────────────────────────────────

/// Fields of a field worker's daily report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportField {
    Description,
    Site,
    Hours,
    Blockers,
}

/// Required before a report can advance to proof collection.
/// Blockers are optional.
pub const REPORT_REQUIRED: &[ReportField] =
    &[ReportField::Description, ReportField::Site, ReportField::Hours];

impl std::fmt::Display for ReportField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Description => "description",
            Self::Site => "site",
            Self::Hours => "hours",
            Self::Blockers => "blockers",
        };
        write!(f, "{s}")
    }
}

/// Partial daily-report record, each field nullable until supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFields {
    pub description: Option<String>,
    pub site: Option<String>,
    pub hours: Option<f64>,
    pub blockers: Option<String>,
}

impl ReportFields {
    /// Whether a field currently holds a value.
    pub fn is_set(&self, field: ReportField) -> bool {
        match field {
            ReportField::Description => self.description.is_some(),
            ReportField::Site => self.site.is_some(),
            ReportField::Hours => self.hours.is_some(),
            ReportField::Blockers => self.blockers.is_some(),
        }
    }

    /// Merge contract: last non-null value wins per field.
    ///
    /// Fields that are `None` in `update` leave the current value alone.
    pub fn merge_from(&mut self, update: &ReportFields) {
        if let Some(v) = &update.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = &update.site {
            self.site = Some(v.clone());
        }
        if let Some(v) = update.hours {
            self.hours = Some(v);
        }
        if let Some(v) = &update.blockers {
            self.blockers = Some(v.clone());
        }
    }

    /// Required fields still unset.
    pub fn missing(&self, required: &[ReportField]) -> Vec<ReportField> {
        required
            .iter()
            .copied()
            .filter(|f| !self.is_set(*f))
            .collect()
    }
}

// ── Daily report status ─────────────────────────────────────────────

/// Progress of one day's report conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Collecting,
    AwaitingProof,
    Complete,
}

impl ReportStatus {
    /// Valid forward transitions only.
    pub fn can_transition_to(&self, target: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, target),
            (Collecting, AwaitingProof) | (Collecting, Complete) | (AwaitingProof, Complete)
        )
    }

    /// Terminal for the scope date.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::AwaitingProof => "awaiting_proof",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

// ── Field worker state ──────────────────────────────────────────────

/// Live conversation state for one (user, date) reporting scope.
///
/// A new calendar date creates a fresh instance; the store never returns two
/// states for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWorkerState {
    pub user_id: String,
    pub date: NaiveDate,
    pub report: ReportFields,
    /// Proof media references, append-only until finalization.
    pub proofs: Vec<String>,
    pub missing_fields: Vec<ReportField>,
    pub status: ReportStatus,
}

impl FieldWorkerState {
    /// Default-initialized state: all fields null, full missing set.
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            report: ReportFields::default(),
            proofs: Vec::new(),
            missing_fields: REPORT_REQUIRED.to_vec(),
            status: ReportStatus::Collecting,
        }
    }

    /// Re-derive `missing_fields` from the current report values.
    pub fn recompute_missing(&mut self) {
        self.missing_fields = self.report.missing(REPORT_REQUIRED);
    }
}

// ── Contractor profile fields ───────────────────────────────────────

/// Fields of a contractor's onboarding profile. All four are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    CompanyName,
    LicenseNumber,
    Gst,
    Category,
}

pub const PROFILE_REQUIRED: &[ProfileField] = &[
    ProfileField::CompanyName,
    ProfileField::LicenseNumber,
    ProfileField::Gst,
    ProfileField::Category,
];

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CompanyName => "company_name",
            Self::LicenseNumber => "license_number",
            Self::Gst => "gst",
            Self::Category => "category",
        };
        write!(f, "{s}")
    }
}

/// Partial contractor profile, each field nullable until supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub company_name: Option<String>,
    pub license_number: Option<String>,
    pub gst: Option<String>,
    pub category: Option<String>,
}

impl ProfileFields {
    pub fn is_set(&self, field: ProfileField) -> bool {
        match field {
            ProfileField::CompanyName => self.company_name.is_some(),
            ProfileField::LicenseNumber => self.license_number.is_some(),
            ProfileField::Gst => self.gst.is_some(),
            ProfileField::Category => self.category.is_some(),
        }
    }

    /// Merge contract: last non-null value wins per field.
    pub fn merge_from(&mut self, update: &ProfileFields) {
        if let Some(v) = &update.company_name {
            self.company_name = Some(v.clone());
        }
        if let Some(v) = &update.license_number {
            self.license_number = Some(v.clone());
        }
        if let Some(v) = &update.gst {
            self.gst = Some(v.clone());
        }
        if let Some(v) = &update.category {
            self.category = Some(v.clone());
        }
    }

    /// Subtractive merge for document-extracted fields: only fills fields
    /// that are still unset, so a value the contractor already supplied is
    /// never overwritten by OCR output.
    pub fn fill_missing_from(&mut self, update: &ProfileFields) {
        if self.company_name.is_none() {
            self.company_name = update.company_name.clone();
        }
        if self.license_number.is_none() {
            self.license_number = update.license_number.clone();
        }
        if self.gst.is_none() {
            self.gst = update.gst.clone();
        }
        if self.category.is_none() {
            self.category = update.category.clone();
        }
    }

    pub fn missing(&self, required: &[ProfileField]) -> Vec<ProfileField> {
        required
            .iter()
            .copied()
            .filter(|f| !self.is_set(*f))
            .collect()
    }

    /// Fields that currently hold values, for "here's what I got" replies.
    pub fn known(&self) -> Vec<ProfileField> {
        PROFILE_REQUIRED
            .iter()
            .copied()
            .filter(|f| self.is_set(*f))
            .collect()
    }
}

// ── Verification status ─────────────────────────────────────────────

/// Progress of a contractor through onboarding.
///
/// `Verified` is set by an administrative process outside this engine; the
/// workflows here only ever advance as far as `PendingReview`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    CollectingProfile,
    CollectingDocuments,
    PendingReview,
    Verified,
}

impl VerificationStatus {
    pub fn can_transition_to(&self, target: VerificationStatus) -> bool {
        use VerificationStatus::*;
        matches!(
            (self, target),
            (CollectingProfile, CollectingDocuments)
                | (CollectingProfile, PendingReview)
                | (CollectingDocuments, PendingReview)
                | (PendingReview, Verified)
        )
    }

    /// Terminal from this engine's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PendingReview | Self::Verified)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CollectingProfile => "collecting_profile",
            Self::CollectingDocuments => "collecting_documents",
            Self::PendingReview => "pending_review",
            Self::Verified => "verified",
        };
        write!(f, "{s}")
    }
}

// ── Contractor state ────────────────────────────────────────────────

/// Live onboarding state for one contractor. Lifetime scope — one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorState {
    pub user_id: String,
    pub profile: ProfileFields,
    /// Document media references, append-only until finalization.
    pub documents: Vec<String>,
    pub missing_fields: Vec<ProfileField>,
    pub verification_status: VerificationStatus,
}

impl ContractorState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            profile: ProfileFields::default(),
            documents: Vec::new(),
            missing_fields: PROFILE_REQUIRED.to_vec(),
            verification_status: VerificationStatus::CollectingProfile,
        }
    }

    pub fn recompute_missing(&mut self) {
        self.missing_fields = self.profile.missing(PROFILE_REQUIRED);
    }
}

// ── Finalized records ───────────────────────────────────────────────

/// Persisted output of a completed daily report. Write-once per (user, date):
/// re-finalization upserts the same key and never duplicates.
///
/// Field values stay nullable — a proof photo can arrive and validate before
/// every report field was collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReportRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub site: Option<String>,
    pub hours: Option<f64>,
    pub blockers: Option<String>,
    pub proof_urls: Vec<String>,
    pub productivity_score: f32,
    pub created_at: DateTime<Utc>,
}

/// Persisted output of a submitted contractor profile. Keyed by user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorProfileRecord {
    pub user_id: String,
    pub company_name: String,
    pub license_number: String,
    pub gst: String,
    pub category: String,
    pub document_urls: Vec<String>,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
}
