// Review domain models - queue entries and appeals.

use crate::core::moderation::ModerationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A moderation result sitting in the staff queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub author_id: String,
    pub queued_at: DateTime<Utc>,
    pub result: ModerationResult,
}

/// What a staff member can do to a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    /// Escalate for a second look
    Flag,
}

impl std::fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewAction::Approve => write!(f, "approve"),
            ReviewAction::Reject => write!(f, "reject"),
            ReviewAction::Flag => write!(f, "flag"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Open,
    Upheld,
    Overturned,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Open => "open",
            AppealStatus::Upheld => "upheld",
            AppealStatus::Overturned => "overturned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(AppealStatus::Open),
            "upheld" => Some(AppealStatus::Upheld),
            "overturned" => Some(AppealStatus::Overturned),
            _ => None,
        }
    }
}

/// How staff close an appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealOutcome {
    /// The rejection stands
    Upheld,
    /// The rejection is reversed and the submission approved
    Overturned,
}

/// An author's request to reverse a rejection. At most one per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appeal {
    pub submission_id: String,
    pub appellant_id: String,
    pub statement: String,
    pub filed_at: DateTime<Utc>,
    pub status: AppealStatus,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution_note: Option<String>,
}
