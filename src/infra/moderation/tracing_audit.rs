use crate::core::moderation::{AuditRecord, AuditSink, ModerationError};
use async_trait::async_trait;

/// Development audit sink: every record becomes a structured `info` event.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError> {
        let json = serde_json::to_string(record)
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        tracing::info!(
            target: "moderation_audit",
            submission_id = %record.submission_id,
            author_id = %record.author_id,
            status = %record.status,
            confidence = record.confidence,
            record = %json,
            "moderation decision"
        );
        Ok(())
    }
}
