//! Per-stage state machine and the read-only projections built on it.
//!
//! ```text
//! pending -> assigned -> in_progress -> completed -> forwarded -> approved
//!    |                                                       \-> rejected (terminal)
//!    \-------------------- forward (hr/admin) ------------/
//! ```
//!
//! Projections never fail: a missing or malformed stage reads as `pending`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationStatus, StageStatus};
use crate::models::feedback::Feedback;
use crate::models::stage::{StageNumber, TOTAL_STAGES};
use crate::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Overdue,
    Warning,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageAction {
    Assign,
    Reassign,
    Start,
    SubmitFeedback,
    ForwardByAssignee,
    ForwardByHr,
    Approve,
    Reject,
}

impl StageAction {
    pub fn verb(self) -> &'static str {
        match self {
            StageAction::Assign => "be assigned",
            StageAction::Reassign => "be reassigned",
            StageAction::Start => "be started",
            StageAction::SubmitFeedback => "receive feedback",
            StageAction::ForwardByAssignee | StageAction::ForwardByHr => "be forwarded",
            StageAction::Approve => "be approved",
            StageAction::Reject => "be rejected",
        }
    }
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

const WARNING_WINDOW_HOURS: i64 = 24;

pub struct StagePipeline;

impl StagePipeline {
    /// The single definition of legal moves. `None` means the action is not allowed from `from`.
    pub fn transition(from: StageStatus, action: StageAction) -> Option<StageStatus> {
        use StageAction as A;
        use StageStatus as S;
        match (action, from) {
            (A::Assign, S::Pending) => Some(S::Assigned),
            (A::Reassign, S::Assigned | S::InProgress) => Some(from),
            (A::Start, S::Assigned) => Some(S::InProgress),
            (A::SubmitFeedback, S::Assigned | S::InProgress | S::Completed) => Some(S::Completed),
            (A::ForwardByAssignee, S::Completed) => Some(S::Forwarded),
            (A::ForwardByHr, S::Pending) => Some(S::Forwarded),
            (A::Approve, S::Forwarded) => Some(S::Approved),
            (A::Reject, S::Forwarded) => Some(S::Rejected),
            _ => None,
        }
    }

    /// Checks `action` against the stage's current status and the application's lifecycle.
    pub fn check(app: &Application, stage: StageNumber, action: StageAction) -> Result<StageStatus> {
        if app.is_closed() {
            return Err(Error::ApplicationClosed(format!(
                "application {} is {}",
                app.id, app.status
            )));
        }
        let status = Self::stage_status(app, stage);
        match Self::transition(status, action) {
            Some(next) => Ok(next),
            None if action == StageAction::Assign => {
                if status.holds_assignee() && Self::stage_assignee(app, stage).is_some() {
                    Err(Error::StageAlreadyAssigned(stage))
                } else {
                    Err(Error::StageNotPending { stage, status })
                }
            }
            None => Err(Error::InvalidTransition {
                stage,
                status,
                action: action.verb(),
            }),
        }
    }

    pub fn stage_status(app: &Application, stage: StageNumber) -> StageStatus {
        app.stage(stage).status
    }

    pub fn stage_assignee(app: &Application, stage: StageNumber) -> Option<&str> {
        app.stage(stage)
            .assigned_to
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    pub fn stage_feedback(app: &Application, stage: StageNumber) -> Option<&Feedback> {
        app.stage(stage).feedback.as_ref()
    }

    pub fn stage_deadline(app: &Application, stage: StageNumber) -> Option<DateTime<Utc>> {
        app.stage(stage).deadline
    }

    pub fn completed_count(app: &Application) -> usize {
        app.stages
            .iter()
            .filter(|(_, s)| s.status == StageStatus::Completed)
            .count()
    }

    pub fn total_stages() -> usize {
        TOTAL_STAGES as usize
    }

    /// Stages still `pending`, ascending.
    pub fn available_for_bulk_assignment(app: &Application) -> Vec<StageNumber> {
        app.stages
            .iter()
            .filter(|(_, s)| s.status == StageStatus::Pending)
            .map(|(n, _)| n)
            .collect()
    }

    pub fn deadline_urgency(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Urgency> {
        let deadline = deadline?;
        if deadline < now {
            Some(Urgency::Overdue)
        } else if deadline <= now + Duration::hours(WARNING_WINDOW_HOURS) {
            Some(Urgency::Warning)
        } else {
            Some(Urgency::Normal)
        }
    }

    /// Whether work on `stage` may begin. Stage 1 always; later stages once the previous one
    /// is approved, or merely completed for team members working through their own queue.
    pub fn is_unlocked(app: &Application, stage: StageNumber, role: Role) -> bool {
        if app.status == ApplicationStatus::Rejected {
            return false;
        }
        match stage.previous() {
            None => true,
            Some(prev) => match Self::stage_status(app, prev) {
                StageStatus::Approved => true,
                StageStatus::Completed => role == Role::TeamMember,
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stage(n: u8) -> StageNumber {
        StageNumber::new(n).unwrap()
    }

    fn app_with(statuses: &[(u8, StageStatus)]) -> Application {
        let mut app = Application::new("a1", "c1", "j1");
        for (n, status) in statuses {
            let slot = app.stages.get_mut(stage(*n));
            slot.status = *status;
            if status.holds_assignee() {
                slot.assigned_to = Some("tm1".into());
            }
        }
        app
    }

    #[test]
    fn urgency_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let urgency = |d| StagePipeline::deadline_urgency(Some(d), now);
        assert_eq!(urgency(now + Duration::minutes(23 * 60 + 59)), Some(Urgency::Warning));
        assert_eq!(urgency(now + Duration::hours(24)), Some(Urgency::Warning));
        assert_eq!(urgency(now + Duration::hours(25)), Some(Urgency::Normal));
        assert_eq!(urgency(now - Duration::minutes(1)), Some(Urgency::Overdue));
        assert_eq!(urgency(now), Some(Urgency::Warning));
        assert_eq!(StagePipeline::deadline_urgency(None, now), None);
    }

    #[test]
    fn assign_only_from_pending() {
        for status in [
            StageStatus::Assigned,
            StageStatus::InProgress,
            StageStatus::Completed,
            StageStatus::Forwarded,
            StageStatus::Approved,
            StageStatus::Rejected,
        ] {
            assert_eq!(StagePipeline::transition(status, StageAction::Assign), None);
        }
        assert_eq!(
            StagePipeline::transition(StageStatus::Pending, StageAction::Assign),
            Some(StageStatus::Assigned)
        );
    }

    #[test]
    fn forward_has_two_entry_points() {
        assert_eq!(
            StagePipeline::transition(StageStatus::Completed, StageAction::ForwardByAssignee),
            Some(StageStatus::Forwarded)
        );
        assert_eq!(
            StagePipeline::transition(StageStatus::Pending, StageAction::ForwardByHr),
            Some(StageStatus::Forwarded)
        );
        assert_eq!(
            StagePipeline::transition(StageStatus::Pending, StageAction::ForwardByAssignee),
            None
        );
        assert_eq!(
            StagePipeline::transition(StageStatus::Completed, StageAction::Approve),
            None
        );
    }

    #[test]
    fn check_names_the_assignment_conflict() {
        let app = app_with(&[(2, StageStatus::Assigned), (3, StageStatus::Approved)]);
        let err = StagePipeline::check(&app, stage(2), StageAction::Assign).unwrap_err();
        assert!(matches!(err, Error::StageAlreadyAssigned(s) if s == stage(2)));
        let err = StagePipeline::check(&app, stage(3), StageAction::Assign).unwrap_err();
        assert!(matches!(err, Error::StageNotPending { status: StageStatus::Approved, .. }));
    }

    #[test]
    fn closed_application_refuses_every_action() {
        let mut app = app_with(&[]);
        app.status = ApplicationStatus::Rejected;
        let err = StagePipeline::check(&app, stage(1), StageAction::Assign).unwrap_err();
        assert!(matches!(err, Error::ApplicationClosed(_)));
    }

    #[test]
    fn projections_are_stable_and_default_to_pending() {
        let app = app_with(&[(1, StageStatus::Completed), (2, StageStatus::Assigned)]);
        assert_eq!(StagePipeline::stage_status(&app, stage(5)), StageStatus::Pending);
        assert_eq!(StagePipeline::stage_assignee(&app, stage(5)), None);
        assert!(StagePipeline::stage_feedback(&app, stage(1)).is_none());
        assert_eq!(StagePipeline::completed_count(&app), 1);
        assert_eq!(StagePipeline::total_stages(), 7);

        let first = StagePipeline::available_for_bulk_assignment(&app);
        let second = StagePipeline::available_for_bulk_assignment(&app);
        assert_eq!(first, second);
        assert_eq!(first, vec![stage(3), stage(4), stage(5), stage(6), stage(7)]);
    }

    #[test]
    fn unlocking_follows_previous_stage() {
        let app = app_with(&[(1, StageStatus::Approved), (2, StageStatus::Completed)]);
        assert!(StagePipeline::is_unlocked(&app, stage(1), Role::Hr));
        assert!(StagePipeline::is_unlocked(&app, stage(2), Role::Hr));
        assert!(!StagePipeline::is_unlocked(&app, stage(3), Role::Hr));
        assert!(StagePipeline::is_unlocked(&app, stage(3), Role::TeamMember));
        assert!(!StagePipeline::is_unlocked(&app, stage(4), Role::TeamMember));
    }
}
