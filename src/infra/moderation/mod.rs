mod http_reputation_client;
mod in_memory;
mod sqlite_audit_store;
mod sqlite_reputation_store;
mod tracing_audit;

pub use http_reputation_client::HttpReputationClient;
pub use in_memory::{InMemoryAuditLog, InMemoryReputationStore, InMemorySubmissionHistory};
pub use sqlite_audit_store::SqliteAuditStore;
pub use sqlite_reputation_store::SqliteReputationStore;
pub use tracing_audit::TracingAuditSink;
