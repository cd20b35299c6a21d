//! Local scratch storage for feedback that has not been submitted yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dto::pipeline_dto::FeedbackSubmission;
use crate::error::{Error, Result};
use crate::models::feedback::ApprovalStatus;
use crate::models::stage::StageNumber;
use crate::utils::time::now;

/// Form fields as the evaluator left them. Every field may still be blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDraft {
    #[serde(default)]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub performance_rating: Option<u8>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl FeedbackDraft {
    pub fn is_empty(&self) -> bool {
        self.approval_status.is_none()
            && self.performance_rating.is_none()
            && self.comments.trim().is_empty()
    }

    /// Converts a finished draft into a submission. Range checks happen at submit time.
    pub fn to_submission(&self) -> Result<FeedbackSubmission> {
        let approval_status = self.approval_status.ok_or_else(|| {
            Error::Validation(crate::utils::error_mapping::INVALID_APPROVAL_STATUS.to_string())
        })?;
        let performance_rating = self.performance_rating.ok_or_else(|| {
            Error::Validation(crate::utils::error_mapping::INVALID_RATING.to_string())
        })?;
        Ok(FeedbackSubmission {
            approval_status,
            performance_rating,
            comments: self.comments.clone(),
        })
    }
}

pub fn draft_key(application_id: &str, stage: StageNumber) -> String {
    format!("feedback_draft_{}_{}", application_id, stage)
}

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, application_id: &str, stage: StageNumber) -> Result<Option<FeedbackDraft>>;
    async fn save(&self, application_id: &str, stage: StageNumber, draft: &FeedbackDraft) -> Result<()>;
    async fn clear(&self, application_id: &str, stage: StageNumber) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDraftStore {
    drafts: Arc<RwLock<HashMap<String, FeedbackDraft>>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn load(&self, application_id: &str, stage: StageNumber) -> Result<Option<FeedbackDraft>> {
        Ok(self.drafts.read().await.get(&draft_key(application_id, stage)).cloned())
    }

    async fn save(&self, application_id: &str, stage: StageNumber, draft: &FeedbackDraft) -> Result<()> {
        self.drafts
            .write()
            .await
            .insert(draft_key(application_id, stage), draft.clone());
        Ok(())
    }

    async fn clear(&self, application_id: &str, stage: StageNumber) -> Result<()> {
        self.drafts.write().await.remove(&draft_key(application_id, stage));
        Ok(())
    }
}

/// One JSON file per draft under `dir`.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hex of the key, so distinct application ids never share a file.
    fn path_for(&self, application_id: &str, stage: StageNumber) -> PathBuf {
        let name: String = draft_key(application_id, stage)
            .bytes()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    async fn load(&self, application_id: &str, stage: StageNumber) -> Result<Option<FeedbackDraft>> {
        let path = self.path_for(application_id, stage);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable draft");
                Ok(None)
            }
        }
    }

    async fn save(&self, application_id: &str, stage: StageNumber, draft: &FeedbackDraft) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(application_id, stage);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(draft)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, application_id: &str, stage: StageNumber) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(application_id, stage)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub interval: Duration,
    /// Idle time after the last edit before saving.
    pub debounce: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            debounce: Duration::from_secs(2),
        }
    }
}

/// Background saver for one open feedback form.
pub struct DraftAutosave {
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
    handle: Option<JoinHandle<()>>,
    fields: watch::Sender<FeedbackDraft>,
}

/// Stops an autosave from anywhere, waiting out a save that is already running.
#[derive(Debug, Clone)]
pub struct AutosaveCloser {
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl AutosaveCloser {
    /// Once this returns the autosave writes nothing more.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _quiet = self.gate.lock().await;
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl DraftAutosave {
    pub fn start(
        store: Arc<dyn DraftStore>,
        application_id: impl Into<String>,
        stage: StageNumber,
        config: AutosaveConfig,
    ) -> Self {
        let application_id = application_id.into();
        let cancel = CancellationToken::new();
        let gate = Arc::new(Mutex::new(()));
        let (fields, mut rx) = watch::channel(FeedbackDraft::default());
        let token = cancel.clone();
        let save_gate = Arc::clone(&gate);

        let handle = tokio::spawn(async move {
            let first_tick = Instant::now() + config.interval;
            let mut ticker = tokio::time::interval_at(first_tick, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut idle_deadline: Option<Instant> = None;
            let mut dirty = false;

            loop {
                let idle_at = idle_deadline;
                let idle = async move {
                    match idle_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        dirty = true;
                        idle_deadline = Some(Instant::now() + config.debounce);
                        continue;
                    }
                    _ = idle => {
                        idle_deadline = None;
                    }
                    _ = ticker.tick() => {
                        if !dirty {
                            continue;
                        }
                    }
                }

                let draft = rx.borrow_and_update().clone();
                if draft.is_empty() {
                    continue;
                }
                let stamped = FeedbackDraft {
                    saved_at: Some(now()),
                    ..draft
                };
                let _saving = save_gate.lock().await;
                if token.is_cancelled() {
                    break;
                }
                match store.save(&application_id, stage, &stamped).await {
                    Ok(()) => {
                        dirty = false;
                        tracing::debug!(application_id = %application_id, stage = %stage, "draft saved");
                    }
                    Err(e) => {
                        tracing::warn!(
                            application_id = %application_id,
                            stage = %stage,
                            error = %e,
                            "draft autosave failed"
                        );
                    }
                }
            }
        });

        Self {
            cancel,
            gate,
            handle: Some(handle),
            fields,
        }
    }

    pub fn closer(&self) -> AutosaveCloser {
        AutosaveCloser {
            cancel: self.cancel.clone(),
            gate: Arc::clone(&self.gate),
        }
    }

    /// Publishes the current form fields.
    pub fn update(&self, draft: FeedbackDraft) {
        self.fields.send_replace(draft);
    }

    pub fn current(&self) -> FeedbackDraft {
        self.fields.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "draft autosave task ended abnormally");
            }
        }
    }
}

impl Drop for DraftAutosave {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
