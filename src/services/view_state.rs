use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ErrorKind, Result};
use crate::models::application::Application;
use crate::services::api_client::RecruitmentApi;

struct ViewInner {
    application_id: String,
    mounted: AtomicBool,
    snapshot: watch::Sender<Option<Application>>,
}

/// Last authoritative snapshot of one application, as shown to a user.
///
/// Writes never patch the snapshot; they re-read the application and replace it.
/// After [`PipelineView::unmount`] nothing is applied any more, including results of
/// retry loops that were still running.
#[derive(Clone)]
pub struct PipelineView {
    inner: Arc<ViewInner>,
}

impl PipelineView {
    pub fn new(application_id: impl Into<String>) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            inner: Arc::new(ViewInner {
                application_id: application_id.into(),
                mounted: AtomicBool::new(true),
                snapshot,
            }),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.inner.application_id
    }

    pub fn snapshot(&self) -> Option<Application> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Application>> {
        self.inner.snapshot.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    pub fn unmount(&self) {
        self.inner.mounted.store(false, Ordering::SeqCst);
        tracing::debug!(application_id = %self.inner.application_id, "view unmounted");
    }

    /// Replaces the snapshot. Returns `false` when the view is gone or the snapshot
    /// belongs to another application.
    pub fn apply(&self, application: Application) -> bool {
        if !self.is_mounted() {
            tracing::debug!(application_id = %self.inner.application_id, "dropping update for unmounted view");
            return false;
        }
        if application.id != self.inner.application_id {
            tracing::warn!(
                expected = %self.inner.application_id,
                got = %application.id,
                "ignoring snapshot for a different application"
            );
            return false;
        }
        self.inner.snapshot.send_replace(Some(application));
        true
    }

    /// Full re-read from the store, applied if still mounted.
    pub async fn refresh(&self, api: &dyn RecruitmentApi) -> Result<Application> {
        let application = api.get_application(&self.inner.application_id).await?;
        self.apply(application.clone());
        Ok(application)
    }

    /// The cached snapshot, or a fresh read when nothing has been loaded yet.
    pub async fn current(&self, api: &dyn RecruitmentApi) -> Result<Application> {
        match self.snapshot() {
            Some(application) => Ok(application),
            None => self.refresh(api).await,
        }
    }

    /// Brings the view up to date after a write that returns the application.
    ///
    /// A successful write is followed by a re-read; if that read fails the write's own
    /// result is shown instead. A conflict also triggers a re-read so the user sees why.
    pub async fn settle(
        &self,
        api: &dyn RecruitmentApi,
        result: Result<Application>,
    ) -> Result<Application> {
        match result {
            Ok(updated) => match self.refresh(api).await {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    tracing::warn!(application_id = %updated.id, error = %e, "refresh after write failed");
                    self.apply(updated.clone());
                    Ok(updated)
                }
            },
            Err(e) if e.kind() == ErrorKind::Conflict => {
                if let Err(refresh_err) = self.refresh(api).await {
                    tracing::warn!(
                        application_id = %self.inner.application_id,
                        error = %refresh_err,
                        "refresh after conflict failed"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
