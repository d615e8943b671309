//! Configuration types.

use std::time::Duration;

/// What to do when the proof-validation adapter itself fails to answer.
///
/// This is a deliberate policy knob, not an accident: `FailOpen` keeps the
/// citizen-facing flow moving by accepting the proof with a low confidence
/// value; `FailClosed` turns the failure into a retry reply and writes no
/// state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationFallback {
    /// Treat the proof as valid with the given confidence.
    FailOpen { confidence: f32 },
    /// Treat the failure as a hard error (generic retry reply).
    FailClosed,
}

/// Intake engine configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Bounded timeout applied to every adapter and upload call.
    pub adapter_timeout: Duration,
    /// Policy applied when proof validation fails to respond.
    pub proof_fallback: ValidationFallback,
    /// Directory where the local object storage writes media files.
    pub media_dir: std::path::PathBuf,
    /// Base URL under which stored media is served.
    pub media_base_url: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(20),
            proof_fallback: ValidationFallback::FailOpen { confidence: 0.25 },
            media_dir: std::path::PathBuf::from("./data/media"),
            media_base_url: "http://localhost:8080/media".to_string(),
        }
    }
}
