use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::models::feedback::Feedback;
use crate::models::recommendation::FinalRecommendation;
use crate::models::stage::{StageNumber, TOTAL_STAGES};
use crate::utils::time::{deserialize_timestamp_opt, parse_timestamp, to_rfc3339};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Forwarded,
    Approved,
    Rejected,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Assigned => "assigned",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Forwarded => "forwarded",
            StageStatus::Approved => "approved",
            StageStatus::Rejected => "rejected",
        }
    }

    /// Statuses in which a stage must name its evaluator.
    pub fn holds_assignee(self) -> bool {
        matches!(
            self,
            StageStatus::Assigned
                | StageStatus::InProgress
                | StageStatus::Completed
                | StageStatus::Forwarded
        )
    }

    /// Statuses in which feedback may be attached.
    pub fn allows_feedback(self) -> bool {
        matches!(
            self,
            StageStatus::Completed
                | StageStatus::Forwarded
                | StageStatus::Approved
                | StageStatus::Rejected
        )
    }
}

impl From<String> for StageStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "assigned" => StageStatus::Assigned,
            "in_progress" | "in-progress" => StageStatus::InProgress,
            "completed" => StageStatus::Completed,
            "forwarded" => StageStatus::Forwarded,
            "approved" => StageStatus::Approved,
            "rejected" => StageStatus::Rejected,
            "pending" | "" => StageStatus::Pending,
            other => {
                tracing::debug!(status = other, "unknown stage status, treating as pending");
                StageStatus::Pending
            }
        }
    }
}

impl From<StageStatus> for String {
    fn from(status: StageStatus) -> String {
        status.as_str().to_string()
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Rejected)
    }
}

impl From<String> for ApplicationStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "in_progress" | "in-progress" => ApplicationStatus::InProgress,
            "completed" => ApplicationStatus::Completed,
            "rejected" => ApplicationStatus::Rejected,
            _ => ApplicationStatus::Pending,
        }
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> String {
        status.as_str().to_string()
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage state, projected out of the flattened `stages` record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageState {
    pub status: StageStatus,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub feedback: Option<Feedback>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    /// Stage-specific evaluation form (panel name, scale, outcome, ...).
    pub evaluation: Option<JsonValue>,
}

impl StageState {
    /// The 1–10 `scale` recorded on the stage evaluation form, if any.
    pub fn scale(&self) -> Option<u8> {
        self.evaluation
            .as_ref()
            .and_then(|e| e.get("scale"))
            .and_then(JsonValue::as_u64)
            .filter(|s| (1..=10).contains(s))
            .map(|s| s as u8)
    }
}

/// The seven stage slots of an application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawStages", into = "RawStages")]
pub struct Stages([StageState; TOTAL_STAGES as usize]);

impl Stages {
    pub fn get(&self, stage: StageNumber) -> &StageState {
        &self.0[stage.index()]
    }

    pub fn get_mut(&mut self, stage: StageNumber) -> &mut StageState {
        &mut self.0[stage.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageNumber, &StageState)> {
        StageNumber::all().zip(self.0.iter())
    }
}

/// Wire shape: `stage{n}_status`, `stage{n}_assigned_to`, ... in one flat object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawStages(Map<String, JsonValue>);

fn lenient<T: DeserializeOwned>(map: &Map<String, JsonValue>, key: &str) -> Option<T> {
    match map.get(key) {
        None | Some(JsonValue::Null) => None,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(field = key, error = %e, "ignoring malformed stage field");
                None
            }
        },
    }
}

impl From<RawStages> for Stages {
    fn from(raw: RawStages) -> Self {
        let map = raw.0;
        let mut stages = Stages::default();
        for stage in StageNumber::all() {
            let n = stage.get();
            let slot = stages.get_mut(stage);
            slot.status = lenient::<String>(&map, &format!("stage{}_status", n))
                .map(StageStatus::from)
                .unwrap_or_default();
            slot.assigned_to = lenient(&map, &format!("stage{}_assigned_to", n));
            slot.assigned_by = lenient(&map, &format!("stage{}_assigned_by", n));
            slot.deadline = lenient::<String>(&map, &format!("stage{}_deadline", n))
                .and_then(|s| parse_timestamp(&s).ok());
            slot.feedback = lenient(&map, &format!("stage{}_feedback", n));
            slot.notes = lenient(&map, &format!("stage{}_notes", n));
            slot.rejection_reason = lenient(&map, &format!("stage{}_rejection_reason", n));
            slot.evaluation = map
                .get(stage.info().evaluation_key)
                .filter(|v| v.is_object())
                .cloned();
        }
        stages
    }
}

impl From<Stages> for RawStages {
    fn from(stages: Stages) -> Self {
        let mut map = Map::new();
        for (stage, slot) in stages.iter() {
            let n = stage.get();
            map.insert(
                format!("stage{}_status", n),
                JsonValue::String(slot.status.as_str().to_string()),
            );
            let mut put = |suffix: &str, value: JsonValue| {
                map.insert(format!("stage{}_{}", n, suffix), value);
            };
            put("assigned_to", opt_string(&slot.assigned_to));
            put("assigned_by", opt_string(&slot.assigned_by));
            put(
                "deadline",
                slot.deadline
                    .map(|d| JsonValue::String(to_rfc3339(d)))
                    .unwrap_or(JsonValue::Null),
            );
            put(
                "feedback",
                slot.feedback
                    .as_ref()
                    .and_then(|f| serde_json::to_value(f).ok())
                    .unwrap_or(JsonValue::Null),
            );
            put("notes", opt_string(&slot.notes));
            put("rejection_reason", opt_string(&slot.rejection_reason));
            map.insert(
                stage.info().evaluation_key.to_string(),
                slot.evaluation.clone().unwrap_or(JsonValue::Null),
            );
        }
        RawStages(map)
    }
}

fn opt_string(value: &Option<String>) -> JsonValue {
    value
        .as_ref()
        .map(|s| JsonValue::String(s.clone()))
        .unwrap_or(JsonValue::Null)
}

/// One candidate's run through one job's pipeline, as last read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(alias = "_id")]
    pub id: String,
    pub candidate_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub job_id: String,
    #[serde(default = "default_current_stage")]
    pub current_stage: u8,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub stages: Stages,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub date_of_application: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_current_stage() -> u8 {
    1
}

impl Application {
    pub fn new(id: impl Into<String>, candidate_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            candidate_id: candidate_id.into(),
            name: None,
            email: None,
            job_id: job_id.into(),
            current_stage: 1,
            status: ApplicationStatus::Pending,
            stages: Stages::default(),
            date_of_application: Some(now),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// `current_stage` clamped into the valid stage range.
    pub fn current_stage_number(&self) -> StageNumber {
        StageNumber::new(self.current_stage.clamp(1, TOTAL_STAGES)).unwrap_or(StageNumber::FIRST)
    }

    pub fn stage(&self, stage: StageNumber) -> &StageState {
        self.stages.get(stage)
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn final_recommendation(&self) -> Option<FinalRecommendation> {
        self.stages
            .get(StageNumber::FINAL)
            .evaluation
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
