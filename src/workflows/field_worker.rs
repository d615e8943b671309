//! Field-worker daily-report state machine.
//!
//! One conversation per (user, calendar day): `Collecting` gathers the
//! report fields over any number of text turns, `AwaitingProof` waits for a
//! work photo, `Complete` is terminal for the day.
//!
//! Write ordering: the store is only written after the relevant adapter
//! call has returned. A failed adapter call propagates out before any
//! `put`, so the previously persisted state is never half-merged.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapters::{
    FieldExtractor, ObjectStorage, ProofAnalysis, ProofValidator, Scorer, bounded,
};
use crate::config::{IntakeConfig, ValidationFallback};
use crate::envelope::{MediaPayload, MessageEnvelope, OutboundReply};
use crate::error::WorkflowError;
use crate::state::model::{
    DailyReportRecord, FieldWorkerState, REPORT_REQUIRED, ReportField, ReportStatus,
};
use crate::state::store::IntakeStore;

/// Fixed ordered question table — the first missing field picks the question.
const QUESTIONS: &[(ReportField, &str)] = &[
    (ReportField::Description, "What work did you do today?"),
    (ReportField::Site, "Which site were you working at?"),
    (ReportField::Hours, "How many hours did you work?"),
];

const ASK_PROOF: &str =
    "Thanks, that's everything I need. Now please send a photo of the completed work.";
const ASK_SOMETHING: &str =
    "Please send today's work update as a message, or a photo of the work.";

fn question_for(field: ReportField) -> &'static str {
    QUESTIONS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, q)| *q)
        .unwrap_or(ASK_SOMETHING)
}

/// Stateless daily-report workflow; all dependencies injected.
pub struct FieldWorkerWorkflow {
    store: Arc<dyn IntakeStore>,
    extractor: Arc<dyn FieldExtractor>,
    validator: Arc<dyn ProofValidator>,
    scorer: Arc<dyn Scorer>,
    storage: Arc<dyn ObjectStorage>,
    config: IntakeConfig,
}

impl FieldWorkerWorkflow {
    pub fn new(
        store: Arc<dyn IntakeStore>,
        extractor: Arc<dyn FieldExtractor>,
        validator: Arc<dyn ProofValidator>,
        scorer: Arc<dyn Scorer>,
        storage: Arc<dyn ObjectStorage>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            validator,
            scorer,
            storage,
            config,
        }
    }

    /// Handle one inbound message for this workflow.
    pub async fn handle(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<OutboundReply, WorkflowError> {
        let date = envelope.received_at.date_naive();
        let state = self
            .store
            .get_report_state(&envelope.user_id, date)
            .await?;

        if state.status.is_terminal() {
            return self.already_submitted(&state).await;
        }
        if let Some(media) = &envelope.media {
            return self.handle_media(state, media).await;
        }
        if envelope.has_text() {
            let text = envelope.text.as_deref().unwrap_or_default();
            return self.handle_text(state, text).await;
        }
        Ok(OutboundReply::text(ASK_SOMETHING))
    }

    /// Text turn: extract, merge (last non-null wins), ask or advance.
    async fn handle_text(
        &self,
        mut state: FieldWorkerState,
        text: &str,
    ) -> Result<OutboundReply, WorkflowError> {
        let extraction = bounded(
            "field_extraction",
            self.config.adapter_timeout,
            self.extractor
                .extract_report(text, &state.report, REPORT_REQUIRED),
        )
        .await
        .map_err(WorkflowError::Extraction)?;

        state.report.merge_from(&extraction.fields);
        state.recompute_missing();

        if let Some(next) = state.missing_fields.first().copied() {
            self.store.put_report_state(&state).await?;
            return Ok(OutboundReply::text(question_for(next)));
        }

        // All required fields present — move on to proof collection. A
        // reminder turn while already awaiting proof keeps its status.
        if state.status == ReportStatus::Collecting {
            state.status = ReportStatus::AwaitingProof;
        }
        self.store.put_report_state(&state).await?;
        Ok(OutboundReply::text(ASK_PROOF))
    }

    /// Media turn: upload, validate, and on a valid proof finalize the day.
    async fn handle_media(
        &self,
        mut state: FieldWorkerState,
        media: &MediaPayload,
    ) -> Result<OutboundReply, WorkflowError> {
        let url = bounded(
            "object_storage",
            self.config.adapter_timeout,
            self.storage.upload(&state.user_id, media),
        )
        .await
        .map_err(WorkflowError::Upload)?;
        state.proofs.push(url.clone());

        let analysis = match bounded(
            "proof_validation",
            self.config.adapter_timeout,
            self.validator.validate_proof(&state.report, &url),
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(err) => match self.config.proof_fallback {
                ValidationFallback::FailOpen { confidence } => {
                    warn!(
                        user = %state.user_id,
                        error = %err,
                        "Proof validation unavailable — accepting proof fail-open"
                    );
                    ProofAnalysis {
                        valid: true,
                        explanation: "Accepted without automated validation".into(),
                        confidence,
                    }
                }
                ValidationFallback::FailClosed => {
                    return Err(WorkflowError::Validation(err));
                }
            },
        };

        if !analysis.valid {
            // Keep the uploaded proof reference; the upload already
            // succeeded. Status does not change.
            self.store.put_report_state(&state).await?;
            return Ok(OutboundReply::text(format!(
                "{} Please send a clearer photo of the work.",
                analysis.explanation
            )));
        }

        let score = bounded(
            "scoring",
            self.config.adapter_timeout,
            self.scorer.score(&state.report, &analysis),
        )
        .await
        .map_err(WorkflowError::Scoring)?;

        // Record first, then status: a persistence failure here leaves the
        // state pre-completion, so a retried photo re-attempts finalization
        // against the idempotent upsert.
        let record = DailyReportRecord {
            user_id: state.user_id.clone(),
            date: state.date,
            description: state.report.description.clone(),
            site: state.report.site.clone(),
            hours: state.report.hours,
            blockers: state.report.blockers.clone(),
            proof_urls: state.proofs.clone(),
            productivity_score: score,
            created_at: Utc::now(),
        };
        self.store
            .upsert_daily_report(&record)
            .await
            .map_err(WorkflowError::Persistence)?;

        state.status = ReportStatus::Complete;
        self.store.put_report_state(&state).await?;

        info!(
            user = %state.user_id,
            date = %state.date,
            score,
            proofs = state.proofs.len(),
            "Daily report finalized"
        );
        Ok(OutboundReply::text(format!(
            "Work report submitted — productivity score {score:.1}/10. Thank you!"
        )))
    }

    /// Terminal turn: summarize the persisted record, touch nothing.
    async fn already_submitted(
        &self,
        state: &FieldWorkerState,
    ) -> Result<OutboundReply, WorkflowError> {
        let record = self
            .store
            .get_daily_report(&state.user_id, state.date)
            .await?;
        let reply = match record {
            Some(record) => format!(
                "Today's report is already submitted.\nSite: {}\nHours: {}\nWork: {}",
                record.site.as_deref().unwrap_or("-"),
                record
                    .hours
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "-".into()),
                record.description.as_deref().unwrap_or("-"),
            ),
            None => "Today's report is already submitted.".to_string(),
        };
        Ok(OutboundReply::text(reply))
    }
}
