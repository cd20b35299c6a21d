use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::utils::time::{deserialize_timestamp, deserialize_timestamp_opt};

pub const MAX_COMMENT_CHARS: usize = 1000;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Approved => f.write_str("Approved"),
            ApprovalStatus::Rejected => f.write_str("Rejected"),
        }
    }
}

/// Server-confirmed evaluation attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub approval_status: ApprovalStatus,
    pub performance_rating: u8,
    pub comments: String,
    pub submitted_by: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub submitted_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edit_count: u32,
}

impl Feedback {
    pub fn was_edited(&self) -> bool {
        self.edit_count > 0 || self.edited_at.is_some()
    }
}

fn deserialize_bool_flexible<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
        String(String),
        Null(()),
    }

    match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => Ok(b),
        BoolOrInt::Int(i) => Ok(i != 0),
        BoolOrInt::String(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("Invalid boolean string: {}", s))),
        },
        BoolOrInt::Null(()) => Ok(false),
    }
}

/// Feedback as returned by the feedback endpoints, with server-computed flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(flatten)]
    pub feedback: Feedback,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub can_edit: bool,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub is_read_only: bool,
    #[serde(default)]
    pub submitter_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naive_backend_timestamps() {
        let json = serde_json::json!({
            "approval_status": "Approved",
            "performance_rating": 8,
            "comments": "Solid",
            "submitted_by": "u1",
            "submitted_at": "2025-02-01T09:00:00",
            "edited_at": null,
        });
        let fb: Feedback = serde_json::from_value(json).unwrap();
        assert_eq!(fb.edit_count, 0);
        assert!(!fb.was_edited());
        assert_eq!(fb.approval_status, ApprovalStatus::Approved);
    }

    #[test]
    fn record_flattens_feedback_fields() {
        let json = serde_json::json!({
            "approval_status": "Rejected",
            "performance_rating": 3,
            "comments": "Weak",
            "submitted_by": "u2",
            "submitted_at": "2025-02-01T09:00:00Z",
            "edit_count": 2,
            "can_edit": true,
        });
        let rec: FeedbackRecord = serde_json::from_value(json).unwrap();
        assert!(rec.can_edit);
        assert!(!rec.is_read_only);
        assert_eq!(rec.feedback.edit_count, 2);
    }

    #[test]
    fn record_flags_accept_numeric_booleans() {
        let json = serde_json::json!({
            "approval_status": "Approved",
            "performance_rating": 7,
            "comments": "Fine",
            "submitted_by": "u3",
            "submitted_at": "2025-02-01T09:00:00Z",
            "can_edit": 0,
            "is_read_only": "true",
        });
        let rec: FeedbackRecord = serde_json::from_value(json).unwrap();
        assert!(!rec.can_edit);
        assert!(rec.is_read_only);
    }
}
