use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::application::Application;
use crate::models::assignment::StageAssignment;
use crate::models::feedback::ApprovalStatus;
use crate::models::recommendation::FinalStatus;
use crate::models::stage::StageNumber;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AssignStageRequest {
    pub stage_number: StageNumber,
    #[validate(length(min = 1, message = "Please select a team member."))]
    pub assigned_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[validate(length(max = 500, message = "Notes must not exceed 500 characters."))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BulkAssignRequest {
    #[validate(length(min = 1, message = "Please select at least one stage."))]
    pub stage_numbers: Vec<StageNumber>,
    #[validate(length(min = 1, message = "Please select a team member."))]
    pub assigned_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[validate(length(max = 500, message = "Notes must not exceed 500 characters."))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReassignStageRequest {
    pub stage_number: StageNumber,
    #[validate(length(min = 1, message = "Please select a team member."))]
    pub assigned_to: String,
    #[validate(length(min = 1, message = "A reason is required for reassignment."))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FeedbackSubmission {
    pub approval_status: ApprovalStatus,
    #[validate(range(
        min = 1,
        max = 10,
        message = "Performance rating must be between 1 and 10."
    ))]
    pub performance_rating: u8,
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comments are required and must not exceed 1000 characters."
    ))]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RejectStageRequest {
    #[validate(length(min = 1, message = "A rejection reason is required."))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FinalRecommendationRequest {
    pub status: FinalStatus,
    #[validate(range(min = 1, max = 10, message = "Cumulative scale must be between 1 and 10."))]
    pub cumulative_scale: u8,
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Suggestions are required and must not exceed 1000 characters."
    ))]
    pub suggestions: String,
}

/// `{message, assignment}` returned by assign and reassign.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub assignment: StageAssignment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentHistoryEnvelope {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub assignments: Vec<StageAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MyAssignmentsEnvelope {
    #[serde(default)]
    pub assignments: Vec<crate::models::assignment::MyAssignment>,
    #[serde(default)]
    pub total_count: Option<usize>,
}

/// `{message, application}` returned by feedback submission and stage start.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub application: Application,
}

/// Some endpoints wrap the application, others return it bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApplicationPayload {
    Wrapped(ApplicationEnvelope),
    Bare(Application),
}

impl ApplicationPayload {
    pub fn into_application(self) -> Application {
        match self {
            ApplicationPayload::Wrapped(envelope) => envelope.application,
            ApplicationPayload::Bare(application) => application,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackEnvelope {
    #[serde(default)]
    pub feedback: Option<crate::models::feedback::FeedbackRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStageOutcome {
    pub stage_number: StageNumber,
    #[serde(default)]
    pub stage_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Server-side bulk result, wrapped as `{message, result}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAssignResponse {
    pub success_count: usize,
    pub total_requested: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default)]
    pub successful_assignments: Vec<BulkStageOutcome>,
    #[serde(default)]
    pub failed_assignments: Vec<BulkStageOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAssignEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub result: BulkAssignResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage_number: StageNumber,
    pub message: String,
}

/// Per-stage outcome of a bulk assignment. Partial success is the common case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAssignResult {
    pub success_count: usize,
    pub total_requested: usize,
    pub failures: Vec<StageFailure>,
}

impl BulkAssignResult {
    pub fn failed_stages(&self) -> Vec<StageNumber> {
        self.failures.iter().map(|f| f.stage_number).collect()
    }

    pub fn is_partial(&self) -> bool {
        self.success_count < self.total_requested
    }

    pub fn summary(&self) -> String {
        format!(
            "Assigned {} of {} stages",
            self.success_count, self.total_requested
        )
    }
}
