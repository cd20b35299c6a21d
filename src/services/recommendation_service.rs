use futures::FutureExt;
use std::sync::Arc;

use crate::dto::pipeline_dto::FinalRecommendationRequest;
use crate::error::{Error, Result};
use crate::models::application::{Application, StageStatus};
use crate::models::recommendation::{FinalRecommendation, FinalStatus};
use crate::models::stage::StageNumber;
use crate::models::user::{Caller, HR_ROLES};
use crate::services::api_client::{IdempotencyKey, RecruitmentApi};
use crate::services::retry_service::{RetryConfig, RetryExecutor, RetryObserver, RetryState};
use crate::services::view_state::PipelineView;
use crate::utils::validation::validate;

/// Rounded mean of the `scale` values recorded on stages 1 to 6; `0` when none are present.
pub fn cumulative_scale(app: &Application) -> u8 {
    let scales: Vec<u32> = StageNumber::all()
        .filter(|s| !s.is_final())
        .filter_map(|s| app.stage(s).scale())
        .map(u32::from)
        .collect();
    if scales.is_empty() {
        return 0;
    }
    let mean = scales.iter().sum::<u32>() as f64 / scales.len() as f64;
    mean.round() as u8
}

/// Final stage has been reached, either by position or by approval of the stage before it.
pub fn is_final_stage_reached(app: &Application) -> bool {
    if app.current_stage_number().is_final() {
        return true;
    }
    StageNumber::FINAL
        .previous()
        .map(|prev| app.stage(prev).status == StageStatus::Approved)
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct RecommendationService {
    api: Arc<dyn RecruitmentApi>,
    submissions: RetryExecutor<Application>,
}

impl RecommendationService {
    pub fn new(api: Arc<dyn RecruitmentApi>, retry: RetryConfig) -> Self {
        Self {
            api,
            submissions: RetryExecutor::new(retry),
        }
    }

    pub fn cumulative_scale(&self, app: &Application) -> u8 {
        cumulative_scale(app)
    }

    pub fn existing(&self, app: &Application) -> Option<FinalRecommendation> {
        app.final_recommendation()
    }

    /// Records the hire decision. The application is closed afterwards.
    pub async fn submit(
        &self,
        caller: &Caller,
        view: &PipelineView,
        status: FinalStatus,
        cumulative_scale: u8,
        suggestions: &str,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        caller.assert_role(HR_ROLES)?;
        let request = FinalRecommendationRequest {
            status,
            cumulative_scale,
            suggestions: suggestions.trim().to_string(),
        };
        validate(&request)?;

        let app = view.current(self.api.as_ref()).await?;
        if app.is_closed() {
            return Err(Error::ApplicationClosed(format!(
                "application {} is {}",
                app.id, app.status
            )));
        }
        if !is_final_stage_reached(&app) {
            return Err(Error::Conflict(format!(
                "Final recommendation is only available at stage {}; application is at stage {}",
                StageNumber::FINAL,
                app.current_stage_number()
            )));
        }
        if app.final_recommendation().is_some() {
            return Err(Error::Conflict(
                "Final recommendation has already been submitted".to_string(),
            ));
        }

        let api = Arc::clone(&self.api);
        let application_id = app.id.clone();
        let key = IdempotencyKey::generate();
        let operation = move || {
            let api = Arc::clone(&api);
            let application_id = application_id.clone();
            let request = request.clone();
            let key = key.clone();
            async move {
                api.submit_final_recommendation(&application_id, &request, &key)
                    .await
            }
            .boxed()
        };

        let result = self.submissions.execute(operation, observer).await;
        let result = view.settle(self.api.as_ref(), result).await;
        if let Ok(updated) = &result {
            tracing::info!(
                application_id = %updated.id,
                decision = %status,
                cumulative_scale,
                "final recommendation recorded"
            );
        }
        result
    }

    pub fn state(&self) -> RetryState {
        self.submissions.state()
    }

    pub fn can_retry(&self) -> bool {
        self.submissions.can_retry_manually()
    }

    pub async fn retry_submission(
        &self,
        view: &PipelineView,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        let result = self.submissions.retry_manually(observer).await;
        view.settle(self.api.as_ref(), result).await
    }
}
