use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::stage::StageNumber;
use crate::utils::time::{deserialize_timestamp, deserialize_timestamp_opt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Assignment,
    Reassignment,
    DeadlineWarning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub application_id: String,
    pub stage_number: StageNumber,
    #[serde(default)]
    pub is_read: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub stage_name: Option<String>,
}
