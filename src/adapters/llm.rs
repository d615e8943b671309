//! LLM-backed adapter implementations.
//!
//! Each capability is one tight prompt: the model gets the current partial
//! record and the new input, and must answer with a single JSON object.
//! Responses are pulled out of markdown wrapping before parsing; a response
//! that still doesn't parse is an `AdapterError::InvalidResponse`, never a
//! silent default verdict.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapters::{
    DocumentAnalysis, DocumentValidator, FieldExtractor, ProfileExtraction, ProofAnalysis,
    ProofValidator, ReportExtraction, Scorer,
};
use crate::error::AdapterError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::state::model::{ProfileField, ProfileFields, ReportField, ReportFields};

/// Max tokens per adapter call (kept tight — these run on every message).
const ADAPTER_MAX_TOKENS: u32 = 512;

/// Temperature for structured extraction (deterministic-ish).
const ADAPTER_TEMPERATURE: f32 = 0.1;

/// LLM-backed implementation of extraction, validation, and scoring.
///
/// Stateless; holds only the injected provider, so one instance can serve
/// all four adapter seams.
pub struct LlmAnalysisAdapter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmAnalysisAdapter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn complete(&self, name: &str, system: String, user: String) -> Result<String, AdapterError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_max_tokens(ADAPTER_MAX_TOKENS)
        .with_temperature(ADAPTER_TEMPERATURE);

        let response = self.llm.complete(request).await.map_err(|e| {
            AdapterError::CallFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(
            adapter = name,
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Adapter call complete"
        );
        Ok(response.content)
    }
}

// ── Field extraction ────────────────────────────────────────────────

#[async_trait]
impl FieldExtractor for LlmAnalysisAdapter {
    async fn extract_report(
        &self,
        text: &str,
        current: &ReportFields,
        required: &[ReportField],
    ) -> Result<ReportExtraction, AdapterError> {
        let raw = self
            .complete(
                "report_extraction",
                report_extraction_system_prompt(),
                extraction_user_prompt(text, &to_json(current)?, &field_names(required)),
            )
            .await?;
        parse_report_extraction(&raw).map_err(|reason| {
            warn!(raw = %raw, %reason, "Unparseable report extraction");
            AdapterError::InvalidResponse {
                name: "report_extraction".into(),
                reason,
            }
        })
    }

    async fn extract_profile(
        &self,
        text: &str,
        current: &ProfileFields,
        required: &[ProfileField],
    ) -> Result<ProfileExtraction, AdapterError> {
        let raw = self
            .complete(
                "profile_extraction",
                profile_extraction_system_prompt(),
                extraction_user_prompt(text, &to_json(current)?, &profile_field_names(required)),
            )
            .await?;
        parse_profile_extraction(&raw).map_err(|reason| {
            warn!(raw = %raw, %reason, "Unparseable profile extraction");
            AdapterError::InvalidResponse {
                name: "profile_extraction".into(),
                reason,
            }
        })
    }
}

// ── Proof validation ────────────────────────────────────────────────

#[async_trait]
impl ProofValidator for LlmAnalysisAdapter {
    async fn validate_proof(
        &self,
        report: &ReportFields,
        media_url: &str,
    ) -> Result<ProofAnalysis, AdapterError> {
        let raw = self
            .complete(
                "proof_validation",
                proof_validation_system_prompt(),
                format!(
                    "Report so far:\n{}\n\nProof photo: {media_url}",
                    to_json(report)?
                ),
            )
            .await?;
        parse_proof_analysis(&raw).map_err(|reason| {
            warn!(raw = %raw, %reason, "Unparseable proof verdict");
            AdapterError::InvalidResponse {
                name: "proof_validation".into(),
                reason,
            }
        })
    }
}

// ── Document validation ─────────────────────────────────────────────

#[async_trait]
impl DocumentValidator for LlmAnalysisAdapter {
    async fn validate_document(&self, media_url: &str) -> Result<DocumentAnalysis, AdapterError> {
        let raw = self
            .complete(
                "document_validation",
                document_validation_system_prompt(),
                format!("Document: {media_url}"),
            )
            .await?;
        parse_document_analysis(&raw).map_err(|reason| {
            warn!(raw = %raw, %reason, "Unparseable document verdict");
            AdapterError::InvalidResponse {
                name: "document_validation".into(),
                reason,
            }
        })
    }
}

// ── Scoring ─────────────────────────────────────────────────────────

#[async_trait]
impl Scorer for LlmAnalysisAdapter {
    async fn score(
        &self,
        report: &ReportFields,
        analysis: &ProofAnalysis,
    ) -> Result<f32, AdapterError> {
        let raw = self
            .complete(
                "scoring",
                scoring_system_prompt(),
                format!(
                    "Report:\n{}\n\nProof verdict: valid={} confidence={:.2} ({})",
                    to_json(report)?,
                    analysis.valid,
                    analysis.confidence,
                    analysis.explanation
                ),
            )
            .await?;
        parse_score(&raw).map_err(|reason| {
            warn!(raw = %raw, %reason, "Unparseable score");
            AdapterError::InvalidResponse {
                name: "scoring".into(),
                reason,
            }
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn report_extraction_system_prompt() -> String {
    "You extract daily work report fields from a field worker's chat message.\n\
     Fields: description (what work was done), site (where), hours (numeric), \
     blockers (problems encountered, optional).\n\n\
     Respond with ONLY a JSON object:\n\
     {\"description\": \"...\", \"site\": \"...\", \"hours\": 0, \"blockers\": \"...\", \"missing\": [\"...\"]}\n\n\
     Rules:\n\
     - Include a field only when the message actually supplies it\n\
     - Never invent values; omit unknown fields entirely\n\
     - `missing` lists required field names still unknown after this message\n\
     - hours must be a number, not a string"
        .to_string()
}

fn profile_extraction_system_prompt() -> String {
    "You extract contractor onboarding fields from a chat message.\n\
     Fields: company_name, license_number, gst, category (type of work).\n\n\
     Respond with ONLY a JSON object:\n\
     {\"company_name\": \"...\", \"license_number\": \"...\", \"gst\": \"...\", \"category\": \"...\", \"missing\": [\"...\"]}\n\n\
     Rules:\n\
     - Include a field only when the message actually supplies it\n\
     - Never invent values; omit unknown fields entirely\n\
     - `missing` lists required field names still unknown after this message"
        .to_string()
}

fn extraction_user_prompt(text: &str, current_json: &str, required: &[String]) -> String {
    // Content truncated for token efficiency
    let preview: String = text.chars().take(1000).collect();
    format!(
        "Known so far:\n{current_json}\n\nRequired fields: {}\n\nMessage:\n{preview}",
        required.join(", ")
    )
}

fn proof_validation_system_prompt() -> String {
    "You verify whether a photo plausibly evidences the described municipal field work.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"valid\": true, \"explanation\": \"...\", \"confidence\": 0.0}\n\n\
     Rules:\n\
     - confidence is 0.0-1.0\n\
     - explanation is one sentence, written for the worker who sent the photo\n\
     - When the photo is unusable (blurry, unrelated, a screenshot), set valid to false"
        .to_string()
}

fn document_validation_system_prompt() -> String {
    "You verify a contractor onboarding document (license, GST certificate, registration) \
     and read fields off it.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"valid\": true, \"explanation\": \"...\", \"extracted\": {\"company_name\": \"...\", \"license_number\": \"...\", \"gst\": \"...\", \"category\": \"...\"}}\n\n\
     Rules:\n\
     - Include an extracted field only when it is legible on the document\n\
     - When the document is unreadable or not an onboarding document, set valid to false\n\
     - explanation is one sentence, written for the contractor who sent it"
        .to_string()
}

fn scoring_system_prompt() -> String {
    "You score a completed municipal daily work report for productivity and completeness.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"score\": 0.0}\n\n\
     Rules:\n\
     - score is 0.0-10.0\n\
     - Weigh hours worked, specificity of the description, and the proof verdict confidence"
        .to_string()
}

fn field_names(fields: &[ReportField]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn profile_field_names(fields: &[ProfileField]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AdapterError> {
    serde_json::to_string(value).map_err(|e| AdapterError::InvalidResponse {
        name: "serialize".into(),
        reason: e.to_string(),
    })
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ReportExtractionRaw {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    site: Option<String>,
    #[serde(default)]
    hours: Option<serde_json::Value>,
    #[serde(default)]
    blockers: Option<String>,
    #[serde(default)]
    missing: Vec<String>,
}

fn parse_report_extraction(raw: &str) -> Result<ReportExtraction, String> {
    let json_str = extract_json_object(raw);
    let parsed: ReportExtractionRaw =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    Ok(ReportExtraction {
        fields: ReportFields {
            description: parsed.description,
            site: parsed.site,
            hours: parsed.hours.as_ref().and_then(json_number),
            blockers: parsed.blockers,
        },
        missing: parsed
            .missing
            .iter()
            .filter_map(|name| parse_report_field(name))
            .collect(),
    })
}

#[derive(serde::Deserialize)]
struct ProfileExtractionRaw {
    #[serde(flatten)]
    fields: ProfileFields,
    #[serde(default)]
    missing: Vec<String>,
}

fn parse_profile_extraction(raw: &str) -> Result<ProfileExtraction, String> {
    let json_str = extract_json_object(raw);
    let parsed: ProfileExtractionRaw =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    Ok(ProfileExtraction {
        fields: parsed.fields,
        missing: parsed
            .missing
            .iter()
            .filter_map(|name| parse_profile_field(name))
            .collect(),
    })
}

#[derive(serde::Deserialize)]
struct ProofAnalysisRaw {
    valid: bool,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_proof_analysis(raw: &str) -> Result<ProofAnalysis, String> {
    let json_str = extract_json_object(raw);
    let parsed: ProofAnalysisRaw =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    Ok(ProofAnalysis {
        valid: parsed.valid,
        explanation: if parsed.explanation.is_empty() {
            "No explanation given".into()
        } else {
            parsed.explanation
        },
        confidence: parsed.confidence.clamp(0.0, 1.0),
    })
}

#[derive(serde::Deserialize)]
struct DocumentAnalysisRaw {
    valid: bool,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    extracted: ProfileFields,
}

fn parse_document_analysis(raw: &str) -> Result<DocumentAnalysis, String> {
    let json_str = extract_json_object(raw);
    let parsed: DocumentAnalysisRaw =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    Ok(DocumentAnalysis {
        valid: parsed.valid,
        extracted: parsed.extracted,
        explanation: if parsed.explanation.is_empty() {
            "No explanation given".into()
        } else {
            parsed.explanation
        },
    })
}

#[derive(serde::Deserialize)]
struct ScoreRaw {
    score: f32,
}

fn parse_score(raw: &str) -> Result<f32, String> {
    let json_str = extract_json_object(raw);
    let parsed: ScoreRaw =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    Ok(parsed.score.clamp(0.0, 10.0))
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        // Some models quote numbers despite instructions
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_report_field(name: &str) -> Option<ReportField> {
    match name {
        "description" => Some(ReportField::Description),
        "site" => Some(ReportField::Site),
        "hours" => Some(ReportField::Hours),
        "blockers" => Some(ReportField::Blockers),
        _ => None,
    }
}

fn parse_profile_field(name: &str) -> Option<ProfileField> {
    match name {
        "company_name" => Some(ProfileField::CompanyName),
        "license_number" => Some(ProfileField::LicenseNumber),
        "gst" => Some(ProfileField::Gst),
        "category" => Some(ProfileField::Category),
        _ => None,
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    // ── Parsing tests ───────────────────────────────────────────────

    #[test]
    fn parse_report_extraction_full() {
        let raw = r#"{"description": "Fixed the water pipes", "site": "Sector 5", "hours": 6, "missing": []}"#;
        let extraction = parse_report_extraction(raw).unwrap();
        assert_eq!(
            extraction.fields.description.as_deref(),
            Some("Fixed the water pipes")
        );
        assert_eq!(extraction.fields.site.as_deref(), Some("Sector 5"));
        assert_eq!(extraction.fields.hours, Some(6.0));
        assert!(extraction.fields.blockers.is_none());
        assert!(extraction.missing.is_empty());
    }

    #[test]
    fn parse_report_extraction_partial_with_missing() {
        let raw = r#"{"site": "Ward 12", "missing": ["description", "hours"]}"#;
        let extraction = parse_report_extraction(raw).unwrap();
        assert!(extraction.fields.description.is_none());
        assert_eq!(
            extraction.missing,
            vec![ReportField::Description, ReportField::Hours]
        );
    }

    #[test]
    fn parse_report_extraction_quoted_hours() {
        let raw = r#"{"hours": "7.5", "missing": []}"#;
        let extraction = parse_report_extraction(raw).unwrap();
        assert_eq!(extraction.fields.hours, Some(7.5));
    }

    #[test]
    fn parse_report_extraction_unknown_missing_names_skipped() {
        let raw = r#"{"missing": ["description", "weather"]}"#;
        let extraction = parse_report_extraction(raw).unwrap();
        assert_eq!(extraction.missing, vec![ReportField::Description]);
    }

    #[test]
    fn parse_report_extraction_garbage_fails() {
        assert!(parse_report_extraction("sorry, I can't help with that").is_err());
    }

    #[test]
    fn parse_profile_extraction_flattened_fields() {
        let raw = r#"{"company_name": "Shakti Infra", "gst": "29GST7788", "missing": ["license_number", "category"]}"#;
        let extraction = parse_profile_extraction(raw).unwrap();
        assert_eq!(
            extraction.fields.company_name.as_deref(),
            Some("Shakti Infra")
        );
        assert!(extraction.fields.license_number.is_none());
        assert_eq!(
            extraction.missing,
            vec![ProfileField::LicenseNumber, ProfileField::Category]
        );
    }

    #[test]
    fn parse_proof_analysis_clamps_confidence() {
        let raw = r#"{"valid": true, "explanation": "Shows repaired pipe", "confidence": 1.7}"#;
        let analysis = parse_proof_analysis(raw).unwrap();
        assert!(analysis.valid);
        assert!((analysis.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_proof_analysis_empty_explanation_gets_default() {
        let raw = r#"{"valid": false, "confidence": 0.2}"#;
        let analysis = parse_proof_analysis(raw).unwrap();
        assert!(!analysis.valid);
        assert_eq!(analysis.explanation, "No explanation given");
    }

    #[test]
    fn parse_document_analysis_with_extracted() {
        let raw = r#"{"valid": true, "explanation": "Clear license scan", "extracted": {"license_number": "L123"}}"#;
        let analysis = parse_document_analysis(raw).unwrap();
        assert!(analysis.valid);
        assert_eq!(analysis.extracted.license_number.as_deref(), Some("L123"));
        assert!(analysis.extracted.gst.is_none());
    }

    #[test]
    fn parse_score_clamps_to_range() {
        assert!((parse_score(r#"{"score": 8.4}"#).unwrap() - 8.4).abs() < 0.001);
        assert!((parse_score(r#"{"score": 14.0}"#).unwrap() - 10.0).abs() < 0.001);
        assert!((parse_score(r#"{"score": -2.0}"#).unwrap() - 0.0).abs() < 0.001);
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "Here you go:\n```json\n{\"valid\": true, \"confidence\": 0.9}\n```";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.contains("valid"));
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "My verdict: {\"valid\": false, \"confidence\": 0.1} based on the blur.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    // ── Adapter-over-mock tests ─────────────────────────────────────

    /// Mock LLM that returns a fixed response.
    struct FixedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 50,
                output_tokens: 20,
            })
        }
    }

    #[tokio::test]
    async fn extract_report_through_adapter() {
        let adapter = LlmAnalysisAdapter::new(Arc::new(FixedLlm {
            response: r#"{"description": "Cleared the drain", "site": "Sector 5", "hours": 6, "missing": []}"#.into(),
        }));
        let extraction = adapter
            .extract_report(
                "Cleared the drain at Sector 5, 6 hours",
                &ReportFields::default(),
                crate::state::model::REPORT_REQUIRED,
            )
            .await
            .unwrap();
        assert_eq!(extraction.fields.site.as_deref(), Some("Sector 5"));
    }

    #[tokio::test]
    async fn invalid_response_is_an_error_not_a_default() {
        let adapter = LlmAnalysisAdapter::new(Arc::new(FixedLlm {
            response: "I am unable to comply".into(),
        }));
        let result = adapter
            .validate_document("https://media/license.pdf")
            .await;
        assert!(matches!(
            result,
            Err(AdapterError::InvalidResponse { .. })
        ));
    }
}
