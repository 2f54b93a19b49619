// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

pub mod db;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "review/mod.rs"]
pub mod review;
