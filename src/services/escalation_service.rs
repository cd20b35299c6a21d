use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use crate::dto::pipeline_dto::RejectStageRequest;
use crate::error::{Error, Result};
use crate::models::application::{Application, StageStatus};
use crate::models::stage::StageNumber;
use crate::models::user::{Caller, EVALUATOR_ROLES, HR_ROLES};
use crate::services::api_client::{IdempotencyKey, RecruitmentApi};
use crate::services::retry_service::{RetryConfig, RetryExecutor, RetryObserver, RetryState};
use crate::services::stage_pipeline::{StageAction, StagePipeline};
use crate::services::view_state::PipelineView;
use crate::utils::error_mapping::NOT_ASSIGNED;
use crate::utils::validation::validate;

/// What an approval opened up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    NextStageUnlocked(StageNumber),
    /// The last stage was approved; only the final recommendation remains.
    RecommendationDue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub application: Application,
    pub outcome: ApprovalOutcome,
}

/// Forward, approve and reject. Each runs through the retry executor and ends with a re-read.
#[derive(Clone)]
pub struct EscalationService {
    api: Arc<dyn RecruitmentApi>,
    actions: RetryExecutor<Application>,
}

impl EscalationService {
    pub fn new(api: Arc<dyn RecruitmentApi>, retry: RetryConfig) -> Self {
        Self {
            api,
            actions: RetryExecutor::new(retry),
        }
    }

    /// The assignee hands a completed stage to HR, or HR forwards a pending stage directly.
    pub async fn forward(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        caller.assert_role(EVALUATOR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let app = view.current(self.api.as_ref()).await?;

        match StagePipeline::stage_status(&app, stage) {
            StageStatus::Pending => {
                caller.assert_role(HR_ROLES)?;
                StagePipeline::check(&app, stage, StageAction::ForwardByHr)?;
            }
            _ => {
                StagePipeline::check(&app, stage, StageAction::ForwardByAssignee)?;
                if StagePipeline::stage_assignee(&app, stage) != Some(caller.id.as_str()) {
                    tracing::warn!(application_id = %app.id, stage = %stage, caller = %caller.id, "forward by non-assignee refused");
                    return Err(Error::Unauthorized(NOT_ASSIGNED.to_string()));
                }
            }
        }

        let application_id = app.id.clone();
        let application = self
            .run(view, observer, move |api, key| {
                let application_id = application_id.clone();
                async move { api.forward_stage(&application_id, stage, &key).await }.boxed()
            })
            .await?;
        tracing::info!(application_id = %application.id, stage = %stage, "stage forwarded");
        Ok(application)
    }

    pub async fn approve(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Approval> {
        caller.assert_role(HR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let app = view.current(self.api.as_ref()).await?;
        StagePipeline::check(&app, stage, StageAction::Approve)?;

        let application_id = app.id.clone();
        let application = self
            .run(view, observer, move |api, key| {
                let application_id = application_id.clone();
                async move { api.approve_stage(&application_id, stage, &key).await }.boxed()
            })
            .await?;

        let outcome = match stage.next() {
            Some(next) => ApprovalOutcome::NextStageUnlocked(next),
            None => ApprovalOutcome::RecommendationDue,
        };
        tracing::info!(application_id = %application.id, stage = %stage, outcome = ?outcome, "stage approved");
        Ok(Approval {
            application,
            outcome,
        })
    }

    /// Rejecting any stage closes the whole application.
    pub async fn reject(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        reason: &str,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        caller.assert_role(HR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let request = RejectStageRequest {
            reason: reason.trim().to_string(),
        };
        validate(&request)?;

        let app = view.current(self.api.as_ref()).await?;
        StagePipeline::check(&app, stage, StageAction::Reject)?;

        let application_id = app.id.clone();
        let application = self
            .run(view, observer, move |api, key| {
                let application_id = application_id.clone();
                let reason = request.reason.clone();
                async move { api.reject_stage(&application_id, stage, &reason, &key).await }.boxed()
            })
            .await?;
        tracing::info!(application_id = %application.id, stage = %stage, "stage rejected, application closed");
        Ok(application)
    }

    pub fn state(&self) -> RetryState {
        self.actions.state()
    }

    pub fn can_retry(&self) -> bool {
        self.actions.can_retry_manually()
    }

    pub async fn retry_last(
        &self,
        view: &PipelineView,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        let result = self.actions.retry_manually(observer).await;
        view.settle(self.api.as_ref(), result).await
    }

    async fn run<F>(
        &self,
        view: &PipelineView,
        observer: &dyn RetryObserver<Application>,
        call: F,
    ) -> Result<Application>
    where
        F: Fn(Arc<dyn RecruitmentApi>, IdempotencyKey) -> BoxFuture<'static, Result<Application>>
            + Send
            + Sync
            + 'static,
    {
        let api = Arc::clone(&self.api);
        let key = IdempotencyKey::generate();
        let operation = move || call(Arc::clone(&api), key.clone());
        let result = self.actions.execute(operation, observer).await;
        view.settle(self.api.as_ref(), result).await
    }
}
