mod in_memory;
mod sqlite_review_store;

pub use in_memory::InMemoryReviewStore;
pub use sqlite_review_store::SqliteReviewStore;
