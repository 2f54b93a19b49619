// Entry point of the moderation worker.
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize stores and services (dependency injection)
// 3. Moderate submissions read as JSON lines from a file or stdin
//
// Each result is printed to stdout as one JSON line and stored in the
// review queue.

use anyhow::{bail, Context};
use chrono::Utc;
use shared_thread_moderation::core::moderation::{
    AuditSink, BehaviorSignalSource, ContentSubmission, HistoryBehaviorAnalyzer,
    ModerationConfig, ModerationService, PlaceholderBehaviorSignals, ReputationStore,
};
use shared_thread_moderation::core::review::ReviewService;
use shared_thread_moderation::infra::db;
use shared_thread_moderation::infra::moderation::{
    HttpReputationClient, SqliteAuditStore, SqliteReputationStore, TracingAuditSink,
};
use shared_thread_moderation::infra::review::SqliteReviewStore;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_DB_PATH: &str = "data/moderation.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = match std::env::var("MODERATION_CONFIG_FILE") {
        Ok(path) => ModerationConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load moderation config from {}", path))?,
        Err(_) => ModerationConfig::default(),
    };

    let db_path = std::env::var("MODERATION_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let pool = db::connect(&db_path)
        .await
        .with_context(|| format!("Failed to open moderation DB at {}", db_path))?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let reputation: Arc<dyn ReputationStore> = match std::env::var("REPUTATION_API_URL") {
        Ok(url) => {
            let token = std::env::var("REPUTATION_API_TOKEN").ok();
            tracing::info!(url = %url, "Using remote reputation service");
            Arc::new(HttpReputationClient::new(&url, token)?)
        }
        Err(_) => {
            let store = SqliteReputationStore::new(pool.clone());
            store.migrate().await?;
            Arc::new(store)
        }
    };

    let audit_store = SqliteAuditStore::new(pool.clone());
    audit_store.migrate().await?;

    // History outside the behaviour window is never read again
    let cutoff = Utc::now() - chrono::Duration::seconds(config.behavior_window_secs as i64);
    match audit_store.cleanup_history(cutoff).await {
        Ok(removed) if removed > 0 => tracing::info!(removed, "Pruned submission history"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to prune submission history"),
    }

    let behavior_mode = std::env::var("BEHAVIOR_MODE").unwrap_or_else(|_| "history".to_string());
    let behavior: Box<dyn BehaviorSignalSource> = match behavior_mode.as_str() {
        "history" => Box::new(HistoryBehaviorAnalyzer::new(audit_store.clone(), &config)),
        "placeholder" => Box::new(PlaceholderBehaviorSignals::new(config.placeholder_behavior)),
        other => bail!("Unknown BEHAVIOR_MODE '{}' (expected history or placeholder)", other),
    };

    let audit_mode = std::env::var("AUDIT_MODE").unwrap_or_else(|_| "sqlite".to_string());
    let audit: Box<dyn AuditSink> = match audit_mode.as_str() {
        "sqlite" => Box::new(audit_store.clone()),
        "log" => Box::new(TracingAuditSink),
        other => bail!("Unknown AUDIT_MODE '{}' (expected sqlite or log)", other),
    };

    let review_store = SqliteReviewStore::new(pool.clone());
    review_store.migrate().await?;

    let pipeline = ModerationService::new(&config, Arc::clone(&reputation), behavior, audit);
    let review = ReviewService::new(&config, review_store, reputation);

    tracing::info!(
        version = %config.system_version,
        behavior = %behavior_mode,
        audit = %audit_mode,
        "Moderation pipeline ready"
    );

    // ========================================================================
    // SUBMISSION LOOP
    // ========================================================================

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = input.lines();
    let mut stdout = tokio::io::stdout();
    let mut processed = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let submission: ContentSubmission = match serde_json::from_str(line) {
            Ok(submission) => submission,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed submission");
                continue;
            }
        };

        let result = pipeline.moderate(&submission).await;
        if let Err(e) = review.enqueue(&submission.author_id, result.clone()).await {
            tracing::warn!(
                submission_id = %submission.id,
                error = %e,
                "Failed to queue moderation result"
            );
        }

        let json = serde_json::to_string(&result)?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        processed += 1;
    }

    stdout.flush().await?;
    tracing::info!(processed, "Input exhausted, shutting down");
    Ok(())
}
