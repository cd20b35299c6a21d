pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    api_client::RecruitmentApi,
    assignment_service::AssignmentService,
    draft_store::{DraftStore, FileDraftStore, InMemoryDraftStore},
    escalation_service::EscalationService,
    feedback_service::FeedbackService,
    http_client::HttpRecruitmentApi,
    notification_service::{NotificationService, Notifier, TracingNotifier},
    recommendation_service::RecommendationService,
    template_service::TemplateService,
    view_state::PipelineView,
};

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn RecruitmentApi>,
    pub assignment_service: AssignmentService,
    pub feedback_service: FeedbackService,
    pub escalation_service: EscalationService,
    pub recommendation_service: RecommendationService,
    pub notification_service: NotificationService,
    pub template_service: TemplateService,
}

impl AppState {
    /// HTTP-backed state; drafts go to `DRAFT_DIR` when set, otherwise stay in memory.
    pub fn new(config: &Config) -> Result<Self> {
        let api: Arc<dyn RecruitmentApi> = Arc::new(HttpRecruitmentApi::new(config)?);
        let drafts: Arc<dyn DraftStore> = match &config.draft_dir {
            Some(dir) => Arc::new(FileDraftStore::new(dir.clone())),
            None => Arc::new(InMemoryDraftStore::new()),
        };
        Ok(Self::with_parts(api, drafts, Arc::new(TracingNotifier), config))
    }

    /// State built from the global configuration.
    pub fn from_config() -> Result<Self> {
        Self::new(config::get_config()?)
    }

    pub fn with_parts(
        api: Arc<dyn RecruitmentApi>,
        drafts: Arc<dyn DraftStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let retry = config.retry_config();

        let assignment_service = AssignmentService::new(Arc::clone(&api), notifier, retry);
        let feedback_service = FeedbackService::new(
            Arc::clone(&api),
            drafts,
            config.edit_policy(),
            config.autosave_config(),
            retry,
        );
        let escalation_service = EscalationService::new(Arc::clone(&api), retry);
        let recommendation_service = RecommendationService::new(Arc::clone(&api), retry);
        let notification_service = NotificationService::new(Arc::clone(&api));

        Self {
            api,
            assignment_service,
            feedback_service,
            escalation_service,
            recommendation_service,
            notification_service,
            template_service: TemplateService::new(),
        }
    }

    /// Opens a view on one application and loads its first snapshot.
    pub async fn open(&self, application_id: &str) -> Result<PipelineView> {
        let view = PipelineView::new(application_id);
        view.refresh(self.api.as_ref()).await?;
        Ok(view)
    }
}
