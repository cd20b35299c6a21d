use async_trait::async_trait;

use crate::dto::pipeline_dto::{
    AssignStageRequest, BulkAssignRequest, BulkAssignResponse, FeedbackSubmission,
    FinalRecommendationRequest, ReassignStageRequest,
};
use crate::error::Result;
use crate::models::application::Application;
use crate::models::assignment::{MyAssignment, StageAssignment};
use crate::models::feedback::FeedbackRecord;
use crate::models::notification::Notification;
use crate::models::stage::StageNumber;

/// Identifies one logical mutation; stays the same across its retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The remote recruitment store. Every read and write of the pipeline goes through here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecruitmentApi: Send + Sync {
    async fn get_application(&self, application_id: &str) -> Result<Application>;

    async fn assign_stage(
        &self,
        application_id: &str,
        request: &AssignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment>;

    async fn bulk_assign_stages(
        &self,
        application_id: &str,
        request: &BulkAssignRequest,
        key: &IdempotencyKey,
    ) -> Result<BulkAssignResponse>;

    async fn reassign_stage(
        &self,
        application_id: &str,
        request: &ReassignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment>;

    async fn list_assignments(&self, application_id: &str) -> Result<Vec<StageAssignment>>;

    async fn my_assignments(&self) -> Result<Vec<MyAssignment>>;

    async fn start_stage(&self, application_id: &str, stage: StageNumber) -> Result<Application>;

    /// `Ok(None)` when the stage has no feedback yet.
    async fn get_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
    ) -> Result<Option<FeedbackRecord>>;

    async fn submit_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
        submission: &FeedbackSubmission,
        key: &IdempotencyKey,
    ) -> Result<Application>;

    async fn forward_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application>;

    async fn approve_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application>;

    async fn reject_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<Application>;

    async fn submit_final_recommendation(
        &self,
        application_id: &str,
        request: &FinalRecommendationRequest,
        key: &IdempotencyKey,
    ) -> Result<Application>;

    async fn list_notifications(&self, unread_only: bool, limit: u32) -> Result<Vec<Notification>>;

    async fn unread_count(&self) -> Result<u64>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()>;

    async fn mark_all_notifications_read(&self) -> Result<u64>;
}
