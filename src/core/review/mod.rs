// Staff review queue and appeals.
//
// The pipeline decides; this module covers what happens after: the queue
// staff work through, manual decisions, and author appeals.

pub mod review_models;
pub mod review_service;

pub use review_models::*;
pub use review_service::*;
