//! Message dispatcher — routes one normalized envelope to the matching
//! workflow and translates failures into user-safe replies.
//!
//! The dispatcher owns two cross-cutting concerns the workflows don't see:
//! per-scope serialization (the lock around each get→mutate→put cycle) and
//! the append-only conversation log. Log writes never block a reply.

use std::sync::Arc;

use tracing::{error, warn};

use crate::envelope::{MessageEnvelope, OutboundReply, Role, UserContext};
use crate::error::WorkflowError;
use crate::state::store::{IntakeStore, LogDirection, ScopeKey, ScopeLocks};
use crate::workflows::{ContractorWorkflow, FieldWorkerWorkflow};

const REGISTER_FIRST: &str =
    "You are not registered yet. Please contact your department office to get onboarded.";
const TRY_AGAIN: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";
const RESEND_MEDIA: &str = "I couldn't save that file. Please send it again.";

/// Stateless dispatch service; all dependencies injected.
pub struct MessageDispatcher {
    field_worker: FieldWorkerWorkflow,
    contractor: ContractorWorkflow,
    store: Arc<dyn IntakeStore>,
    locks: ScopeLocks,
}

impl MessageDispatcher {
    pub fn new(
        field_worker: FieldWorkerWorkflow,
        contractor: ContractorWorkflow,
        store: Arc<dyn IntakeStore>,
    ) -> Self {
        Self {
            field_worker,
            contractor,
            store,
            locks: ScopeLocks::new(),
        }
    }

    /// Route one inbound message and produce the reply.
    ///
    /// Holds the scope lock for the whole workflow invocation so two
    /// messages from the same user merge atomically.
    pub async fn dispatch(
        &self,
        envelope: &MessageEnvelope,
        user: &UserContext,
    ) -> OutboundReply {
        let result = match user.role {
            Role::Unknown => {
                // Fixed guidance, zero state mutation — not even a log line.
                return OutboundReply::text(REGISTER_FIRST);
            }
            Role::FieldWorker => {
                let key =
                    ScopeKey::report(&user.user_id, envelope.received_at.date_naive());
                let _guard = self.locks.acquire(&key).await;
                self.field_worker.handle(envelope).await
            }
            Role::Contractor => {
                let key = ScopeKey::onboarding(&user.user_id);
                let _guard = self.locks.acquire(&key).await;
                self.contractor.handle(envelope).await
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                error!(
                    user = %user.user_id,
                    role = %user.role,
                    error = %err,
                    "Workflow failed — sending safe reply"
                );
                user_safe_reply(&err)
            }
        };

        self.log_turn(envelope, &reply).await;
        reply
    }

    /// Append both sides of the turn to the audit log. Failures are logged
    /// and swallowed.
    async fn log_turn(&self, envelope: &MessageEnvelope, reply: &OutboundReply) {
        let inbound = envelope
            .text
            .clone()
            .unwrap_or_else(|| "[media]".to_string());
        if let Err(err) = self
            .store
            .append_conversation(
                &envelope.user_id,
                &envelope.channel,
                LogDirection::Inbound,
                &inbound,
            )
            .await
        {
            warn!(user = %envelope.user_id, error = %err, "Conversation log write failed");
        }
        if let Err(err) = self
            .store
            .append_conversation(
                &envelope.user_id,
                &envelope.channel,
                LogDirection::Outbound,
                &reply.text,
            )
            .await
        {
            warn!(user = %envelope.user_id, error = %err, "Conversation log write failed");
        }
    }
}

/// Map a workflow failure onto the short reply the sender sees.
fn user_safe_reply(err: &WorkflowError) -> OutboundReply {
    let text = match err {
        WorkflowError::Upload(_) => RESEND_MEDIA,
        WorkflowError::Extraction(_)
        | WorkflowError::Validation(_)
        | WorkflowError::Scoring(_)
        | WorkflowError::Store(_)
        | WorkflowError::Persistence(_) => TRY_AGAIN,
    };
    OutboundReply::text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    use crate::adapters::{
        DocumentAnalysis, DocumentValidator, FieldExtractor, ObjectStorage, ProfileExtraction,
        ProofAnalysis, ProofValidator, ReportExtraction, Scorer,
    };
    use crate::config::IntakeConfig;
    use crate::envelope::MediaPayload;
    use crate::error::{AdapterError, StoreError};
    use crate::state::MemoryStore;
    use crate::state::model::{
        ContractorProfileRecord, ContractorState, DailyReportRecord, FieldWorkerState,
        ProfileField, ProfileFields, ReportField, ReportFields, ReportStatus,
    };

    // ── Mock adapters ───────────────────────────────────────────────

    struct KvExtractor;

    #[async_trait]
    impl FieldExtractor for KvExtractor {
        async fn extract_report(
            &self,
            text: &str,
            _current: &ReportFields,
            _required: &[ReportField],
        ) -> Result<ReportExtraction, AdapterError> {
            let mut fields = ReportFields::default();
            for pair in text.split(';') {
                match pair.split_once('=') {
                    Some(("desc", v)) => fields.description = Some(v.to_string()),
                    Some(("site", v)) => fields.site = Some(v.to_string()),
                    Some(("hours", v)) => fields.hours = v.parse().ok(),
                    _ => {}
                }
            }
            Ok(ReportExtraction {
                fields,
                missing: vec![],
            })
        }

        async fn extract_profile(
            &self,
            text: &str,
            _current: &ProfileFields,
            _required: &[ProfileField],
        ) -> Result<ProfileExtraction, AdapterError> {
            let mut fields = ProfileFields::default();
            for pair in text.split(';') {
                match pair.split_once('=') {
                    Some(("company", v)) => fields.company_name = Some(v.to_string()),
                    Some(("license", v)) => fields.license_number = Some(v.to_string()),
                    Some(("gst", v)) => fields.gst = Some(v.to_string()),
                    Some(("category", v)) => fields.category = Some(v.to_string()),
                    _ => {}
                }
            }
            Ok(ProfileExtraction {
                fields,
                missing: vec![],
            })
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl FieldExtractor for FailingExtractor {
        async fn extract_report(
            &self,
            _text: &str,
            _current: &ReportFields,
            _required: &[ReportField],
        ) -> Result<ReportExtraction, AdapterError> {
            Err(AdapterError::CallFailed {
                name: "field_extraction".into(),
                reason: "provider down".into(),
            })
        }

        async fn extract_profile(
            &self,
            _text: &str,
            _current: &ProfileFields,
            _required: &[ProfileField],
        ) -> Result<ProfileExtraction, AdapterError> {
            Err(AdapterError::CallFailed {
                name: "field_extraction".into(),
                reason: "provider down".into(),
            })
        }
    }

    struct AlwaysValidProof;

    #[async_trait]
    impl ProofValidator for AlwaysValidProof {
        async fn validate_proof(
            &self,
            _report: &ReportFields,
            _media_url: &str,
        ) -> Result<ProofAnalysis, AdapterError> {
            Ok(ProofAnalysis {
                valid: true,
                explanation: "ok".into(),
                confidence: 0.9,
            })
        }
    }

    struct AlwaysValidDoc;

    #[async_trait]
    impl DocumentValidator for AlwaysValidDoc {
        async fn validate_document(
            &self,
            _media_url: &str,
        ) -> Result<DocumentAnalysis, AdapterError> {
            Ok(DocumentAnalysis {
                valid: true,
                extracted: ProfileFields::default(),
                explanation: "ok".into(),
            })
        }
    }

    struct FixedScorer;

    #[async_trait]
    impl Scorer for FixedScorer {
        async fn score(
            &self,
            _report: &ReportFields,
            _analysis: &ProofAnalysis,
        ) -> Result<f32, AdapterError> {
            Ok(7.0)
        }
    }

    struct StubStorage;

    #[async_trait]
    impl ObjectStorage for StubStorage {
        async fn upload(
            &self,
            owner_id: &str,
            _media: &MediaPayload,
        ) -> Result<String, AdapterError> {
            Ok(format!("https://media/{owner_id}/x.jpg"))
        }
    }

    /// Forwards everything to an inner store but fails every log append.
    struct FlakyLogStore(MemoryStore);

    #[async_trait]
    impl crate::state::store::IntakeStore for FlakyLogStore {
        async fn get_report_state(
            &self,
            user_id: &str,
            date: NaiveDate,
        ) -> Result<FieldWorkerState, StoreError> {
            self.0.get_report_state(user_id, date).await
        }
        async fn put_report_state(&self, state: &FieldWorkerState) -> Result<(), StoreError> {
            self.0.put_report_state(state).await
        }
        async fn get_contractor_state(
            &self,
            user_id: &str,
        ) -> Result<ContractorState, StoreError> {
            self.0.get_contractor_state(user_id).await
        }
        async fn put_contractor_state(&self, state: &ContractorState) -> Result<(), StoreError> {
            self.0.put_contractor_state(state).await
        }
        async fn upsert_daily_report(
            &self,
            record: &DailyReportRecord,
        ) -> Result<(), StoreError> {
            self.0.upsert_daily_report(record).await
        }
        async fn get_daily_report(
            &self,
            user_id: &str,
            date: NaiveDate,
        ) -> Result<Option<DailyReportRecord>, StoreError> {
            self.0.get_daily_report(user_id, date).await
        }
        async fn upsert_contractor_profile(
            &self,
            record: &ContractorProfileRecord,
        ) -> Result<(), StoreError> {
            self.0.upsert_contractor_profile(record).await
        }
        async fn get_contractor_profile(
            &self,
            user_id: &str,
        ) -> Result<Option<ContractorProfileRecord>, StoreError> {
            self.0.get_contractor_profile(user_id).await
        }
        async fn append_conversation(
            &self,
            _user_id: &str,
            _channel: &str,
            _direction: LogDirection,
            _text: &str,
        ) -> Result<(), StoreError> {
            Err(StoreError::Query("log table unavailable".into()))
        }
    }

    // ── Harness ─────────────────────────────────────────────────────

    fn dispatcher_over(store: Arc<dyn IntakeStore>) -> MessageDispatcher {
        dispatcher_with_extractor(store, Arc::new(KvExtractor))
    }

    fn dispatcher_with_extractor(
        store: Arc<dyn IntakeStore>,
        extractor: Arc<dyn FieldExtractor>,
    ) -> MessageDispatcher {
        let config = IntakeConfig::default();
        let field_worker = FieldWorkerWorkflow::new(
            store.clone(),
            extractor.clone(),
            Arc::new(AlwaysValidProof),
            Arc::new(FixedScorer),
            Arc::new(StubStorage),
            config.clone(),
        );
        let contractor = ContractorWorkflow::new(
            store.clone(),
            extractor,
            Arc::new(AlwaysValidDoc),
            Arc::new(StubStorage),
            config,
        );
        MessageDispatcher::new(field_worker, contractor, store)
    }

    fn text_message(user_id: &str, text: &str) -> MessageEnvelope {
        MessageEnvelope {
            channel: "cli".into(),
            user_id: user_id.into(),
            user_name: "Test".into(),
            text: Some(text.into()),
            media: None,
            location: None,
            external_message_id: "m-1".into(),
            received_at: Utc::now(),
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_role_gets_guidance_and_touches_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_over(store.clone());

        let reply = dispatcher
            .dispatch(
                &text_message("u-9", "desc=x;site=y;hours=1"),
                &UserContext::new("u-9", Role::Unknown),
            )
            .await;

        assert_eq!(reply.text, REGISTER_FIRST);
        // No state mutation, not even a log line
        assert!(store.conversation_log().await.is_empty());
        let state = store
            .get_report_state("u-9", Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(state.report, ReportFields::default());
    }

    #[tokio::test]
    async fn role_selects_workflow() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_over(store.clone());

        dispatcher
            .dispatch(
                &text_message("w-1", "site=Sector 5"),
                &UserContext::new("w-1", Role::FieldWorker),
            )
            .await;
        dispatcher
            .dispatch(
                &text_message("c-1", "company=Shakti Infra"),
                &UserContext::new("c-1", Role::Contractor),
            )
            .await;

        let report = store
            .get_report_state("w-1", Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(report.report.site.as_deref(), Some("Sector 5"));

        let contractor = store.get_contractor_state("c-1").await.unwrap();
        assert_eq!(
            contractor.profile.company_name.as_deref(),
            Some("Shakti Infra")
        );
    }

    #[tokio::test]
    async fn both_turn_sides_land_in_conversation_log() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_over(store.clone());

        dispatcher
            .dispatch(
                &text_message("w-1", "site=Sector 5"),
                &UserContext::new("w-1", Role::FieldWorker),
            )
            .await;

        let log = store.conversation_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].direction, LogDirection::Inbound);
        assert_eq!(log[0].text, "site=Sector 5");
        assert_eq!(log[1].direction, LogDirection::Outbound);
        assert_eq!(log[1].text, "What work did you do today?");
    }

    #[tokio::test]
    async fn log_failure_does_not_block_reply() {
        let store = Arc::new(FlakyLogStore(MemoryStore::new()));
        let dispatcher = dispatcher_over(store);

        let reply = dispatcher
            .dispatch(
                &text_message("w-1", "site=Sector 5"),
                &UserContext::new("w-1", Role::FieldWorker),
            )
            .await;
        assert_eq!(reply.text, "What work did you do today?");
    }

    #[tokio::test]
    async fn workflow_failure_becomes_safe_reply() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_with_extractor(store, Arc::new(FailingExtractor));

        let reply = dispatcher
            .dispatch(
                &text_message("w-1", "anything"),
                &UserContext::new("w-1", Role::FieldWorker),
            )
            .await;
        assert_eq!(reply.text, TRY_AGAIN);
    }

    #[tokio::test]
    async fn concurrent_messages_from_one_user_merge_atomically() {
        // Two near-simultaneous texts, each supplying a different field.
        // The per-scope lock serializes get→mutate→put, so both survive.
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(dispatcher_over(store.clone()));
        let user = UserContext::new("w-1", Role::FieldWorker);

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            let user = user.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&text_message("w-1", "site=Sector 5"), &user)
                    .await
            })
        };
        let second = {
            let dispatcher = Arc::clone(&dispatcher);
            let user = user.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&text_message("w-1", "hours=6"), &user)
                    .await
            })
        };
        let (a, b) = futures::future::join(first, second).await;
        a.unwrap();
        b.unwrap();

        let state = store
            .get_report_state("w-1", Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(state.report.site.as_deref(), Some("Sector 5"));
        assert_eq!(state.report.hours, Some(6.0));
        assert_eq!(state.missing_fields, vec![ReportField::Description]);
        assert_eq!(state.status, ReportStatus::Collecting);
    }
}
