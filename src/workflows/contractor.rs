//! Contractor onboarding state machine.
//!
//! Lifetime scope — one conversation state per contractor. Profile fields
//! come from chat text or are read off uploaded documents; once every
//! required field is known and at least one document is on file, the
//! profile is submitted for review. `Verified` is set by an administrative
//! process elsewhere; this workflow never writes it.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::adapters::{DocumentValidator, FieldExtractor, ObjectStorage, bounded};
use crate::config::IntakeConfig;
use crate::envelope::{MediaPayload, MessageEnvelope, OutboundReply};
use crate::error::WorkflowError;
use crate::state::model::{
    ContractorProfileRecord, ContractorState, PROFILE_REQUIRED, ProfileField, VerificationStatus,
};
use crate::state::store::IntakeStore;

/// Fixed ordered question table — the first missing field picks the question.
const QUESTIONS: &[(ProfileField, &str)] = &[
    (ProfileField::CompanyName, "What is your company's registered name?"),
    (ProfileField::LicenseNumber, "What is your contractor license number?"),
    (ProfileField::Gst, "What is your GST number?"),
    (
        ProfileField::Category,
        "What category of work do you take up (civil, electrical, plumbing, ...)?",
    ),
];

const ASK_FIRST_DOCUMENT: &str =
    "Profile details complete. Now please send a photo or scan of your contractor license or GST certificate.";
const UNDER_REVIEW: &str =
    "Your onboarding is submitted and under review. We will notify you once verification is done.";
const VERIFIED: &str = "You are verified and ready to receive work orders.";

fn question_for(field: ProfileField) -> &'static str {
    QUESTIONS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, q)| *q)
        .unwrap_or("Please share your company details.")
}

fn field_label(field: ProfileField) -> &'static str {
    match field {
        ProfileField::CompanyName => "company name",
        ProfileField::LicenseNumber => "license number",
        ProfileField::Gst => "GST number",
        ProfileField::Category => "work category",
    }
}

fn label_list(fields: &[ProfileField]) -> String {
    fields
        .iter()
        .map(|f| field_label(*f))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stateless onboarding workflow; all dependencies injected.
pub struct ContractorWorkflow {
    store: Arc<dyn IntakeStore>,
    extractor: Arc<dyn FieldExtractor>,
    validator: Arc<dyn DocumentValidator>,
    storage: Arc<dyn ObjectStorage>,
    config: IntakeConfig,
}

impl ContractorWorkflow {
    pub fn new(
        store: Arc<dyn IntakeStore>,
        extractor: Arc<dyn FieldExtractor>,
        validator: Arc<dyn DocumentValidator>,
        storage: Arc<dyn ObjectStorage>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            validator,
            storage,
            config,
        }
    }

    /// Handle one inbound message for this workflow.
    pub async fn handle(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<OutboundReply, WorkflowError> {
        let state = self.store.get_contractor_state(&envelope.user_id).await?;

        if state.verification_status.is_terminal() {
            let reply = match state.verification_status {
                VerificationStatus::Verified => VERIFIED,
                _ => UNDER_REVIEW,
            };
            return Ok(OutboundReply::text(reply));
        }
        if let Some(media) = &envelope.media {
            return self.handle_media(state, media).await;
        }
        if envelope.has_text() {
            let text = envelope.text.as_deref().unwrap_or_default();
            return self.handle_text(state, text).await;
        }
        Ok(OutboundReply::text(
            "Please share your company details, or send a document photo.",
        ))
    }

    /// Text turn: extract, merge (last non-null wins), ask or advance.
    async fn handle_text(
        &self,
        mut state: ContractorState,
        text: &str,
    ) -> Result<OutboundReply, WorkflowError> {
        let extraction = bounded(
            "field_extraction",
            self.config.adapter_timeout,
            self.extractor
                .extract_profile(text, &state.profile, PROFILE_REQUIRED),
        )
        .await
        .map_err(WorkflowError::Extraction)?;

        state.profile.merge_from(&extraction.fields);
        state.recompute_missing();

        if let Some(next) = state.missing_fields.first().copied() {
            self.store.put_contractor_state(&state).await?;
            return Ok(OutboundReply::text(question_for(next)));
        }

        if state.verification_status == VerificationStatus::CollectingProfile {
            state.verification_status = VerificationStatus::CollectingDocuments;
        }

        if state.documents.is_empty() {
            self.store.put_contractor_state(&state).await?;
            return Ok(OutboundReply::text(ASK_FIRST_DOCUMENT));
        }

        // Documents already on file and nothing missing — submit.
        self.finalize(state).await
    }

    /// Media turn: upload, analyze, fill gaps from the document, maybe submit.
    async fn handle_media(
        &self,
        mut state: ContractorState,
        media: &MediaPayload,
    ) -> Result<OutboundReply, WorkflowError> {
        let url = bounded(
            "object_storage",
            self.config.adapter_timeout,
            self.storage.upload(&state.user_id, media),
        )
        .await
        .map_err(WorkflowError::Upload)?;
        state.documents.push(url.clone());

        let analysis = bounded(
            "document_validation",
            self.config.adapter_timeout,
            self.validator.validate_document(&url),
        )
        .await
        .map_err(WorkflowError::Validation)?;

        if !analysis.valid {
            // Keep the uploaded document reference; the upload already
            // succeeded.
            self.store.put_contractor_state(&state).await?;
            return Ok(OutboundReply::text(format!(
                "{} Please send a clearer copy of the document.",
                analysis.explanation
            )));
        }

        // Subtractive merge: a field already known is not overwritten and
        // not re-asked.
        state.profile.fill_missing_from(&analysis.extracted);
        state.recompute_missing();

        if state.verification_status == VerificationStatus::CollectingProfile
            && state.missing_fields.is_empty()
        {
            state.verification_status = VerificationStatus::CollectingDocuments;
        }

        if state.missing_fields.is_empty() && !state.documents.is_empty() {
            return self.finalize(state).await;
        }

        self.store.put_contractor_state(&state).await?;

        let known = state.profile.known();
        let got = if known.is_empty() {
            "Document received.".to_string()
        } else {
            format!("Document received — noted your {}.", label_list(&known))
        };
        Ok(OutboundReply::text(format!(
            "{got} Still needed: {}.",
            label_list(&state.missing_fields)
        )))
    }

    /// Persist the profile record and move to review.
    ///
    /// Record first, then status: a persistence failure leaves the state
    /// pre-completion so a retried message re-attempts the idempotent
    /// upsert.
    async fn finalize(&self, mut state: ContractorState) -> Result<OutboundReply, WorkflowError> {
        let record = ContractorProfileRecord {
            user_id: state.user_id.clone(),
            company_name: state.profile.company_name.clone().unwrap_or_default(),
            license_number: state.profile.license_number.clone().unwrap_or_default(),
            gst: state.profile.gst.clone().unwrap_or_default(),
            category: state.profile.category.clone().unwrap_or_default(),
            document_urls: state.documents.clone(),
            verification_status: VerificationStatus::PendingReview,
            created_at: Utc::now(),
        };
        self.store
            .upsert_contractor_profile(&record)
            .await
            .map_err(WorkflowError::Persistence)?;

        state.verification_status = VerificationStatus::PendingReview;
        self.store.put_contractor_state(&state).await?;

        info!(
            user = %state.user_id,
            documents = state.documents.len(),
            "Contractor profile submitted for review"
        );
        Ok(OutboundReply::text(format!(
            "Onboarding submitted for review.\nCompany: {}\nLicense: {}\nGST: {}\nCategory: {}\nDocuments: {}",
            record.company_name,
            record.license_number,
            record.gst,
            record.category,
            record.document_urls.len()
        )))
    }
}
