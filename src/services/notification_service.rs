use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::notification::{Notification, NotificationType};
use crate::models::stage::StageNumber;
use crate::services::api_client::RecruitmentApi;
use crate::utils::time::to_date_only;

const DEFAULT_LIST_LIMIT: u32 = 50;

/// Emitted after a successful assign, bulk assign or reassign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentNotice {
    pub kind: NotificationType,
    pub application_id: String,
    pub assignee: String,
    pub assigned_by: String,
    pub stages: Vec<StageNumber>,
    pub deadline: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl AssignmentNotice {
    pub fn title(&self) -> String {
        match (self.kind, self.stages.as_slice()) {
            (NotificationType::Reassignment, _) => "Stage Reassigned to You".to_string(),
            (_, [single]) => format!("New Stage Assignment: Stage {}", single),
            (_, many) => format!("{} Stages Assigned to You", many.len()),
        }
    }
}

/// Delivers assignment side effects to the assignee. Failures never undo the assignment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<()>;
}

/// Default notifier: the backend fans out in-app notifications itself, so locally we only log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<()> {
        tracing::info!(
            application_id = %notice.application_id,
            assignee = %notice.assignee,
            stages = ?notice.stages.iter().map(|s| s.get()).collect::<Vec<_>>(),
            title = %notice.title(),
            deadline = ?notice.deadline.map(to_date_only),
            "assignment notice"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationService {
    api: Arc<dyn RecruitmentApi>,
}

impl NotificationService {
    pub fn new(api: Arc<dyn RecruitmentApi>) -> Self {
        Self { api }
    }

    pub async fn list(&self, unread_only: bool) -> Result<Vec<Notification>> {
        self.api.list_notifications(unread_only, DEFAULT_LIST_LIMIT).await
    }

    pub async fn unread_count(&self) -> Result<u64> {
        self.api.unread_count().await
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<()> {
        self.api.mark_notification_read(notification_id).await
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        let count = self.api.mark_all_notifications_read().await?;
        tracing::info!(count, "notifications marked as read");
        Ok(count)
    }

    pub fn start_polling(&self, interval: Duration) -> NotificationPoller {
        NotificationPoller::start(Arc::clone(&self.api), interval)
    }
}

/// Periodic unread-count refresh. Stops on [`NotificationPoller::stop`] or drop.
pub struct NotificationPoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    unread: watch::Receiver<u64>,
}

impl NotificationPoller {
    pub fn start(api: Arc<dyn RecruitmentApi>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (tx, unread) = watch::channel(0);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = api.unread_count() => match result {
                        Ok(count) => {
                            tx.send_replace(count);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "unread count poll failed");
                        }
                    },
                }
            }
            tracing::debug!("notification poller stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
            unread,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.unread.clone()
    }

    pub fn latest(&self) -> u64 {
        *self.unread.borrow()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "notification poller task ended abnormally");
            }
        }
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_titles() {
        let mut notice = AssignmentNotice {
            kind: NotificationType::Assignment,
            application_id: "a1".into(),
            assignee: "tm1".into(),
            assigned_by: "hr1".into(),
            stages: vec![StageNumber::new(2).unwrap()],
            deadline: None,
            reason: None,
        };
        assert_eq!(notice.title(), "New Stage Assignment: Stage 2");
        notice.stages.push(StageNumber::new(3).unwrap());
        assert_eq!(notice.title(), "2 Stages Assigned to You");
        notice.kind = NotificationType::Reassignment;
        assert_eq!(notice.title(), "Stage Reassigned to You");
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let notice = AssignmentNotice {
            kind: NotificationType::Assignment,
            application_id: "a1".into(),
            assignee: "tm1".into(),
            assigned_by: "hr1".into(),
            stages: vec![StageNumber::FIRST],
            deadline: None,
            reason: None,
        };
        assert!(TracingNotifier.notify_assignment(&notice).await.is_ok());
    }
}
