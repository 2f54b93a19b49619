// Moderation scoring for Shared Thread submissions.
//
// - `core/` = Business logic (no storage or network dependencies)
// - `infra/` = Implementations of core traits (SQLite, in-memory, HTTP)
//
// The binary in `main.rs` is the composition root.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;
