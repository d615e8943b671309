use std::sync::Arc;

use chrono::Utc;
use civic_intake::adapters::llm::LlmAnalysisAdapter;
use civic_intake::adapters::storage::LocalObjectStorage;
use civic_intake::config::{IntakeConfig, ValidationFallback};
use civic_intake::dispatcher::MessageDispatcher;
use civic_intake::envelope::{MessageEnvelope, Role, UserContext};
use civic_intake::llm::{LlmBackend, LlmConfig, create_provider};
use civic_intake::state::{IntakeStore, LibSqlStore};
use civic_intake::workflows::{ContractorWorkflow, FieldWorkerWorkflow};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("CIVIC_INTAKE_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    // The CLI loop plays one sender; pick the role via env.
    let role = match std::env::var("CIVIC_INTAKE_ROLE").as_deref() {
        Ok("contractor") => Role::Contractor,
        Ok("unknown") => Role::Unknown,
        _ => Role::FieldWorker,
    };
    let user_id =
        std::env::var("CIVIC_INTAKE_USER").unwrap_or_else(|_| "cli-user".to_string());

    let mut config = IntakeConfig::default();
    if std::env::var("CIVIC_INTAKE_FAIL_CLOSED").is_ok() {
        config.proof_fallback = ValidationFallback::FailClosed;
    }

    eprintln!("Civic Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Role:  {role}");
    eprintln!("   Type a message; prefix a file path with @ to attach it. /quit to exit.\n");

    // ── LLM-backed adapters ─────────────────────────────────────────
    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;
    let analysis = Arc::new(LlmAnalysisAdapter::new(llm));

    // ── Store ───────────────────────────────────────────────────────
    let db_path = std::env::var("CIVIC_INTAKE_DB_PATH")
        .unwrap_or_else(|_| "./data/civic-intake.db".to_string());
    let store: Arc<dyn IntakeStore> =
        Arc::new(LibSqlStore::new_local(std::path::Path::new(&db_path)).await?);
    eprintln!("   Database: {db_path}");

    // ── Object storage ──────────────────────────────────────────────
    let storage = Arc::new(LocalObjectStorage::new(
        config.media_dir.clone(),
        config.media_base_url.clone(),
    ));

    // ── Dispatcher ──────────────────────────────────────────────────
    let field_worker = FieldWorkerWorkflow::new(
        store.clone(),
        analysis.clone(),
        analysis.clone(),
        analysis.clone(),
        storage.clone(),
        config.clone(),
    );
    let contractor = ContractorWorkflow::new(
        store.clone(),
        analysis.clone(),
        analysis.clone(),
        storage,
        config,
    );
    let dispatcher = MessageDispatcher::new(field_worker, contractor, store);
    let user = UserContext::new(user_id.clone(), role);

    // ── CLI loop ────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seq = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        seq += 1;
        let envelope = match line.strip_prefix('@') {
            Some(path) => match read_media(path).await {
                Ok(media) => make_envelope(&user_id, None, Some(media), seq),
                Err(e) => {
                    eprintln!("Could not read {path}: {e}");
                    continue;
                }
            },
            None => make_envelope(&user_id, Some(line), None, seq),
        };

        let reply = dispatcher.dispatch(&envelope, &user).await;
        println!("{}", reply.text);
    }

    Ok(())
}

fn make_envelope(
    user_id: &str,
    text: Option<String>,
    media: Option<civic_intake::envelope::MediaPayload>,
    seq: u64,
) -> MessageEnvelope {
    MessageEnvelope {
        channel: "cli".to_string(),
        user_id: user_id.to_string(),
        user_name: user_id.to_string(),
        text,
        media,
        location: None,
        external_message_id: format!("cli-{seq}"),
        received_at: Utc::now(),
    }
}

async fn read_media(path: &str) -> std::io::Result<civic_intake::envelope::MediaPayload> {
    use civic_intake::envelope::{MediaPayload, MediaSource};

    let bytes = tokio::fs::read(path).await?;
    let filename = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let mime_type = match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string();
    Ok(MediaPayload {
        mime_type,
        source: MediaSource::Bytes(bytes),
        filename,
    })
}
