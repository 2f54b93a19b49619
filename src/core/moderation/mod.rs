// Core moderation module - contains the spam-scoring pipeline.
// Following the same pattern as the other core modules: models, ports and
// services live here, implementations of the ports live in infra.

pub mod content_analyzer;
pub mod decision;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderation_service;
pub mod signals;

pub use content_analyzer::*;
pub use decision::*;
pub use moderation_config::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use signals::*;
