use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dto::pipeline_dto::FeedbackSubmission;
use crate::error::{Error, Result};
use crate::models::application::{Application, StageStatus};
use crate::models::feedback::{Feedback, FeedbackRecord};
use crate::models::stage::StageNumber;
use crate::models::user::{Caller, Role, EVALUATOR_ROLES};
use crate::services::api_client::{IdempotencyKey, RecruitmentApi};
use crate::services::draft_store::{
    draft_key, AutosaveCloser, AutosaveConfig, DraftAutosave, DraftStore, FeedbackDraft,
};
use crate::services::retry_service::{RetryConfig, RetryExecutor, RetryObserver, RetryState};
use crate::services::stage_pipeline::{StageAction, StagePipeline};
use crate::services::template_service::TemplateService;
use crate::services::view_state::PipelineView;
use crate::utils::error_mapping::{COMMENTS_REQUIRED, NOT_ASSIGNED};
use crate::utils::time::now;
use crate::utils::validation::validate;

/// Limits on revising submitted feedback. HR and admins are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditPolicy {
    pub window: chrono::Duration,
    pub max_edits: u32,
}

impl Default for EditPolicy {
    fn default() -> Self {
        Self {
            window: chrono::Duration::minutes(30),
            max_edits: 3,
        }
    }
}

impl EditPolicy {
    pub fn can_edit(&self, feedback: &Feedback, now: DateTime<Utc>, caller_id: &str, role: Role) -> bool {
        self.check(feedback, now, caller_id, role).is_ok()
    }

    /// Same rule as [`EditPolicy::can_edit`], naming the limit that was hit.
    pub fn check(&self, feedback: &Feedback, now: DateTime<Utc>, caller_id: &str, role: Role) -> Result<()> {
        if role.is_hr_or_admin() {
            return Ok(());
        }
        if feedback.submitted_by != caller_id {
            return Err(Error::Unauthorized(
                "Only the original submitter can edit this feedback".to_string(),
            ));
        }
        if feedback.edit_count >= self.max_edits {
            return Err(Error::MaxEditsReached);
        }
        if now - feedback.submitted_at >= self.window {
            return Err(Error::EditWindowExpired);
        }
        Ok(())
    }
}

/// What the feedback form opens with.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackForm {
    pub record: Option<FeedbackRecord>,
    /// Restored only when the server has no feedback for the stage.
    pub draft: Option<FeedbackDraft>,
    pub can_edit: bool,
    pub is_read_only: bool,
}

#[derive(Clone)]
pub struct FeedbackService {
    api: Arc<dyn RecruitmentApi>,
    drafts: Arc<dyn DraftStore>,
    templates: TemplateService,
    policy: EditPolicy,
    autosave: AutosaveConfig,
    /// Open autosaves by draft key, closed before a submitted draft is cleared.
    autosaves: Arc<Mutex<HashMap<String, AutosaveCloser>>>,
    submissions: RetryExecutor<Application>,
}

impl FeedbackService {
    pub fn new(
        api: Arc<dyn RecruitmentApi>,
        drafts: Arc<dyn DraftStore>,
        policy: EditPolicy,
        autosave: AutosaveConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            drafts,
            templates: TemplateService::new(),
            policy,
            autosave,
            autosaves: Arc::default(),
            submissions: RetryExecutor::new(retry),
        }
    }

    pub fn policy(&self) -> EditPolicy {
        self.policy
    }

    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    pub fn can_edit(&self, feedback: &Feedback, now: DateTime<Utc>, caller: &Caller) -> bool {
        self.policy.can_edit(feedback, now, &caller.id, caller.role)
    }

    pub async fn load(&self, caller: &Caller, application_id: &str, stage_number: u8) -> Result<FeedbackForm> {
        caller.assert_role(EVALUATOR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;

        match self.api.get_feedback(application_id, stage).await? {
            Some(record) => {
                let can_edit = self.can_edit(&record.feedback, now(), caller);
                let is_read_only = !can_edit || (record.is_read_only && !caller.role.is_hr_or_admin());
                Ok(FeedbackForm {
                    record: Some(record),
                    draft: None,
                    can_edit,
                    is_read_only,
                })
            }
            None => {
                let draft = match self.drafts.load(application_id, stage).await {
                    Ok(draft) => draft.filter(|d| !d.is_empty()),
                    Err(e) => {
                        tracing::warn!(application_id, stage = %stage, error = %e, "draft restore failed");
                        None
                    }
                };
                if let Some(d) = &draft {
                    tracing::debug!(application_id, stage = %stage, saved_at = ?d.saved_at, "draft restored");
                }
                Ok(FeedbackForm {
                    record: None,
                    draft,
                    can_edit: true,
                    is_read_only: false,
                })
            }
        }
    }

    /// Moves an assigned stage to `in_progress` when its assignee opens the form.
    pub async fn start(&self, caller: &Caller, view: &PipelineView, stage_number: u8) -> Result<Application> {
        caller.assert_role(EVALUATOR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let app = view.current(self.api.as_ref()).await?;
        StagePipeline::check(&app, stage, StageAction::Start)?;
        if StagePipeline::stage_assignee(&app, stage) != Some(caller.id.as_str()) {
            return Err(Error::Unauthorized(NOT_ASSIGNED.to_string()));
        }

        self.api.start_stage(&app.id, stage).await?;
        tracing::info!(application_id = %app.id, stage = %stage, "stage started");
        view.refresh(self.api.as_ref()).await
    }

    /// First submission or an edit, depending on whether the stage already carries feedback.
    pub async fn submit(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        submission: FeedbackSubmission,
        observer: &dyn RetryObserver<Application>,
    ) -> Result<Application> {
        caller.assert_role(EVALUATOR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let submission = FeedbackSubmission {
            comments: submission.comments.trim().to_string(),
            ..submission
        };
        if submission.comments.is_empty() {
            return Err(Error::Validation(COMMENTS_REQUIRED.to_string()));
        }
        validate(&submission)?;

        let app = view.current(self.api.as_ref()).await?;
        StagePipeline::check(&app, stage, StageAction::SubmitFeedback)?;

        match StagePipeline::stage_feedback(&app, stage) {
            Some(existing) if StagePipeline::stage_status(&app, stage) == StageStatus::Completed => {
                self.policy.check(existing, now(), &caller.id, caller.role)?;
            }
            _ => self.ensure_assignee(caller, &app, stage).await?,
        }

        let api = Arc::clone(&self.api);
        let drafts = Arc::clone(&self.drafts);
        let autosaves = Arc::clone(&self.autosaves);
        let application_id = app.id.clone();
        let key = IdempotencyKey::generate();
        let operation = move || {
            let api = Arc::clone(&api);
            let drafts = Arc::clone(&drafts);
            let autosaves = Arc::clone(&autosaves);
            let application_id = application_id.clone();
            let submission = submission.clone();
            let key = key.clone();
            async move {
                let updated = api
                    .submit_feedback(&application_id, stage, &submission, &key)
                    .await?;
                let open = autosaves
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&draft_key(&application_id, stage));
                if let Some(closer) = open {
                    closer.close().await;
                }
                if let Err(e) = drafts.clear(&application_id, stage).await {
                    tracing::warn!(application_id = %application_id, stage = %stage, error = %e, "draft clear failed");
                }
                Ok(updated)
            }
            .boxed()
        };

        let result = self.submissions.execute(operation, observer).await;
        view.settle(self.api.as_ref(), result).await
    }

    pub fn submission_state(&self) -> RetryState {
        self.submissions.state()
    }

    pub fn can_retry_submission(&self) -> bool {
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

    /// Replaces the comments with a template's text. The other fields are untouched.
    pub fn apply_template(&self, draft: &mut FeedbackDraft, template_id: &str) -> Result<()> {
        let template = self.templates.require(template_id)?;
        draft.comments = template.content.to_string();
        Ok(())
    }

    pub async fn save_draft(&self, application_id: &str, stage_number: u8, draft: &FeedbackDraft) -> Result<()> {
        let stage = StageNumber::new(stage_number)?;
        if draft.is_empty() {
            return Ok(());
        }
        let stamped = FeedbackDraft {
            saved_at: Some(now()),
            ..draft.clone()
        };
        self.drafts.save(application_id, stage, &stamped).await
    }

    pub async fn discard_draft(&self, application_id: &str, stage_number: u8) -> Result<()> {
        let stage = StageNumber::new(stage_number)?;
        self.drafts.clear(application_id, stage).await
    }

    /// Starts saving the form in the background. A successful submit for the same
    /// stage closes it, so the cleared draft is not written back.
    pub fn start_autosave(&self, application_id: &str, stage_number: u8) -> Result<DraftAutosave> {
        let stage = StageNumber::new(stage_number)?;
        let autosave = DraftAutosave::start(
            Arc::clone(&self.drafts),
            application_id,
            stage,
            self.autosave,
        );
        let mut open = self
            .autosaves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        open.retain(|_, closer| !closer.is_closed());
        open.insert(draft_key(application_id, stage), autosave.closer());
        Ok(autosave)
    }

    /// Assignment history is the primary source; the stage's own `assigned_to` is the fallback.
    async fn ensure_assignee(&self, caller: &Caller, app: &Application, stage: StageNumber) -> Result<()> {
        let assignee = match self.api.list_assignments(&app.id).await {
            Ok(history) => history
                .into_iter()
                .filter(|r| r.stage_number == stage)
                .max_by_key(|r| r.assigned_at)
                .map(|r| r.assigned_to),
            Err(e) => {
                tracing::debug!(application_id = %app.id, error = %e, "assignment history unavailable, using stage record");
                None
            }
        };
        let assignee = assignee.or_else(|| StagePipeline::stage_assignee(app, stage).map(str::to_string));

        if assignee.as_deref() == Some(caller.id.as_str()) {
            Ok(())
        } else {
            tracing::warn!(application_id = %app.id, stage = %stage, caller = %caller.id, "feedback from non-assignee refused");
            Err(Error::Unauthorized(NOT_ASSIGNED.to_string()))
        }
    }
}
