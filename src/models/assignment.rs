use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::application::StageStatus;
use crate::models::stage::StageNumber;
use crate::utils::time::{deserialize_timestamp, deserialize_timestamp_opt};

/// Append-only audit record written for every assign, bulk-assign and reassign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAssignment {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub application_id: String,
    pub stage_number: StageNumber,
    pub assigned_to: String,
    pub assigned_by: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reassigned_from: Option<String>,
    #[serde(default)]
    pub reassignment_reason: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to_name: Option<String>,
    #[serde(default)]
    pub assigned_by_name: Option<String>,
}

impl StageAssignment {
    pub fn is_reassignment(&self) -> bool {
        self.reassigned_from.is_some()
    }
}

/// One row of the caller's work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyAssignment {
    pub application_id: String,
    pub stage_number: StageNumber,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_history_record_with_mongo_id() {
        let rec: StageAssignment = serde_json::from_value(json!({
            "_id": "66aa",
            "application_id": "a1",
            "stage_number": 3,
            "assigned_to": "tm2",
            "assigned_by": "admin1",
            "assigned_at": "2025-04-02T08:15:00.123000",
            "status": "assigned",
            "deadline": null,
            "reassigned_from": "tm1",
            "reassignment_reason": "On leave",
        }))
        .unwrap();
        assert_eq!(rec.id.as_deref(), Some("66aa"));
        assert_eq!(rec.stage_number.get(), 3);
        assert!(rec.is_reassignment());
        assert!(rec.deadline.is_none());
    }
}
