#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use interview_pipeline::config::Config;
use interview_pipeline::dto::pipeline_dto::{
    AssignStageRequest, BulkAssignRequest, BulkAssignResponse, BulkStageOutcome,
    FeedbackSubmission, FinalRecommendationRequest, ReassignStageRequest,
};
use interview_pipeline::error::{Error, Result};
use interview_pipeline::models::application::{Application, ApplicationStatus, StageStatus};
use interview_pipeline::models::assignment::{MyAssignment, StageAssignment};
use interview_pipeline::models::feedback::{Feedback, FeedbackRecord};
use interview_pipeline::models::notification::{Notification, NotificationType};
use interview_pipeline::models::stage::StageNumber;
use interview_pipeline::services::api_client::{IdempotencyKey, RecruitmentApi};
use interview_pipeline::services::draft_store::InMemoryDraftStore;
use interview_pipeline::services::notification_service::{AssignmentNotice, Notifier};
use interview_pipeline::utils::error_mapping::classify_response;
use interview_pipeline::AppState;
use serde_json::json;

/// Which fake endpoint an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Assign,
    BulkAssign,
    Reassign,
    History,
    SubmitFeedback,
    Forward,
    Approve,
    Reject,
    FinalRecommendation,
    UnreadCount,
}

#[derive(Debug, Clone)]
pub enum Fault {
    Server,
    Timeout,
    Conflict(String),
    /// The write lands but the response is lost.
    AppliedThenTimeout,
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Fault::Server => Error::Server {
                status: 503,
                message: "Service temporarily unavailable".into(),
            },
            Fault::Timeout | Fault::AppliedThenTimeout => Error::Timeout("gateway timeout".into()),
            Fault::Conflict(detail) => Error::Conflict(detail),
        }
    }
}

#[derive(Default)]
struct State {
    applications: HashMap<String, Application>,
    history: Vec<StageAssignment>,
    notifications: Vec<Notification>,
    faults: VecDeque<(Op, usize, Fault)>,
    calls: HashMap<Op, usize>,
    keys: HashMap<Op, Vec<String>>,
    acting_as: String,
}

/// In-memory remote store with the backend's transition rules.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

pub fn stage(n: u8) -> StageNumber {
    StageNumber::new(n).unwrap()
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application(app: Application) -> Self {
        let store = Self::new();
        store.put(app);
        store
    }

    pub fn put(&self, app: Application) {
        self.state.lock().unwrap().applications.insert(app.id.clone(), app);
    }

    pub fn application(&self, id: &str) -> Application {
        self.state.lock().unwrap().applications[id].clone()
    }

    pub fn act_as(&self, user_id: &str) {
        self.state.lock().unwrap().acting_as = user_id.to_string();
    }

    pub fn fail_next(&self, op: Op, fault: Fault) {
        self.fail_after(op, 0, fault);
    }

    /// Lets `skip` calls to `op` through before the fault fires.
    pub fn fail_after(&self, op: Op, skip: usize, fault: Fault) {
        self.state.lock().unwrap().faults.push_back((op, skip, fault));
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state.lock().unwrap().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn keys(&self, op: Op) -> Vec<String> {
        self.state.lock().unwrap().keys.get(&op).cloned().unwrap_or_default()
    }

    pub fn history(&self) -> Vec<StageAssignment> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn push_notification(&self, user_id: &str, application_id: &str, n: u8) {
        let mut state = self.state.lock().unwrap();
        let id = format!("n{}", state.notifications.len() + 1);
        state.notifications.push(Notification {
            id,
            user_id: user_id.into(),
            kind: NotificationType::Assignment,
            title: format!("New Stage Assignment: Stage {}", n),
            message: "You have been assigned".into(),
            application_id: application_id.into(),
            stage_number: stage(n),
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
            candidate_name: None,
            job_title: None,
            stage_name: None,
        });
    }

    /// Records the call and pops a fault queued for `op`, if any.
    fn enter(&self, op: Op, key: Option<&IdempotencyKey>) -> Option<Fault> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        if let Some(key) = key {
            state.keys.entry(op).or_default().push(key.as_str().to_string());
        }
        let pos = state.faults.iter().position(|(o, _, _)| *o == op)?;
        if state.faults[pos].1 > 0 {
            state.faults[pos].1 -= 1;
            return None;
        }
        state.faults.remove(pos).map(|(_, _, f)| f)
    }

    fn guard(&self, op: Op, key: Option<&IdempotencyKey>) -> Result<bool> {
        match self.enter(op, key) {
            None => Ok(false),
            Some(Fault::AppliedThenTimeout) => Ok(true),
            Some(fault) => Err(fault.into_error()),
        }
    }

    fn with_app<T>(&self, id: &str, f: impl FnOnce(&mut State, &mut Application) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let mut app = state
            .applications
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Application not found".into()))?;
        let out = f(&mut *state, &mut app)?;
        state.applications.insert(id.to_string(), app);
        Ok(out)
    }
}

fn assign_one(
    state: &mut State,
    app: &mut Application,
    request: &AssignStageRequest,
) -> Result<StageAssignment> {
    let slot = app.stages.get_mut(request.stage_number);
    if slot.status != StageStatus::Pending {
        return Err(Error::Conflict(format!(
            "Stage {} is not in pending status. Current status: {}",
            request.stage_number, slot.status
        )));
    }
    slot.status = StageStatus::Assigned;
    slot.assigned_to = Some(request.assigned_to.clone());
    slot.assigned_by = Some(state.acting_as.clone());
    slot.deadline = request
        .deadline
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d));
    slot.notes = request.notes.clone();
    if app.status == ApplicationStatus::Pending {
        app.status = ApplicationStatus::InProgress;
    }
    let record = StageAssignment {
        id: Some(format!("as{}", state.history.len() + 1)),
        application_id: app.id.clone(),
        stage_number: request.stage_number,
        assigned_to: request.assigned_to.clone(),
        assigned_by: state.acting_as.clone(),
        assigned_at: Utc::now(),
        status: StageStatus::Assigned,
        deadline: slot.deadline,
        notes: request.notes.clone(),
        reassigned_from: None,
        reassignment_reason: None,
        completed_at: None,
        assigned_to_name: None,
        assigned_by_name: None,
    };
    state.history.push(record.clone());
    Ok(record)
}

fn lost_response<T>(applied: bool, value: T) -> Result<T> {
    if applied {
        Err(Error::Timeout("gateway timeout".into()))
    } else {
        Ok(value)
    }
}

#[async_trait]
impl RecruitmentApi for FakeStore {
    async fn get_application(&self, application_id: &str) -> Result<Application> {
        self.guard(Op::Get, None)?;
        self.with_app(application_id, |_, app| Ok(app.clone()))
    }

    async fn assign_stage(
        &self,
        application_id: &str,
        request: &AssignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment> {
        let applied = self.guard(Op::Assign, Some(key))?;
        let record = self.with_app(application_id, |state, app| assign_one(state, app, request))?;
        lost_response(applied, record)
    }

    async fn bulk_assign_stages(
        &self,
        application_id: &str,
        request: &BulkAssignRequest,
        key: &IdempotencyKey,
    ) -> Result<BulkAssignResponse> {
        let applied = self.guard(Op::BulkAssign, Some(key))?;
        let response = self.with_app(application_id, |state, app| {
            // The backend refuses the whole batch when any stage has moved on.
            let invalid: Vec<String> = request
                .stage_numbers
                .iter()
                .filter(|n| app.stage(**n).status != StageStatus::Pending)
                .map(|n| format!("Stage {} ({})", n, app.stage(*n).status))
                .collect();
            if !invalid.is_empty() {
                let body = json!({
                    "detail": format!(
                        "All selected stages must be in pending status. Invalid stages: {}",
                        invalid.join(", ")
                    ),
                });
                return Err(classify_response(400, &body.to_string()));
            }
            let mut ok = Vec::new();
            for n in &request.stage_numbers {
                let single = AssignStageRequest {
                    stage_number: *n,
                    assigned_to: request.assigned_to.clone(),
                    deadline: request.deadline,
                    notes: request.notes.clone(),
                };
                assign_one(state, app, &single)?;
                ok.push(BulkStageOutcome {
                    stage_number: *n,
                    stage_name: Some(n.info().name.to_string()),
                    error: None,
                });
            }
            Ok(BulkAssignResponse {
                success_count: ok.len(),
                total_requested: request.stage_numbers.len(),
                failed_count: 0,
                successful_assignments: ok,
                failed_assignments: Vec::new(),
            })
        })?;
        lost_response(applied, response)
    }

    async fn reassign_stage(
        &self,
        application_id: &str,
        request: &ReassignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment> {
        self.guard(Op::Reassign, Some(key))?;
        self.with_app(application_id, |state, app| {
            let slot = app.stages.get_mut(request.stage_number);
            if !matches!(slot.status, StageStatus::Assigned | StageStatus::InProgress) {
                return Err(Error::Conflict(format!(
                    "Cannot reassign stage {} in status {}",
                    request.stage_number, slot.status
                )));
            }
            let previous = slot.assigned_to.replace(request.assigned_to.clone());
            let record = StageAssignment {
                id: Some(format!("as{}", state.history.len() + 1)),
                application_id: app.id.clone(),
                stage_number: request.stage_number,
                assigned_to: request.assigned_to.clone(),
                assigned_by: state.acting_as.clone(),
                assigned_at: Utc::now(),
                status: slot.status,
                deadline: slot.deadline,
                notes: None,
                reassigned_from: previous,
                reassignment_reason: Some(request.reason.clone()),
                completed_at: None,
                assigned_to_name: None,
                assigned_by_name: None,
            };
            state.history.push(record.clone());
            Ok(record)
        })
    }

    async fn list_assignments(&self, application_id: &str) -> Result<Vec<StageAssignment>> {
        self.guard(Op::History, None)?;
        let state = self.state.lock().unwrap();
        let mut records: Vec<_> = state
            .history
            .iter()
            .filter(|r| r.application_id == application_id)
            .cloned()
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn my_assignments(&self) -> Result<Vec<MyAssignment>> {
        let state = self.state.lock().unwrap();
        let me = state.acting_as.clone();
        let mut out = Vec::new();
        for app in state.applications.values() {
            for (n, slot) in app.stages.iter() {
                if slot.assigned_to.as_deref() == Some(me.as_str()) {
                    out.push(MyAssignment {
                        application_id: app.id.clone(),
                        stage_number: n,
                        status: slot.status,
                        candidate_name: app.name.clone(),
                        candidate_email: app.email.clone(),
                        job_id: Some(app.job_id.clone()),
                        job_title: None,
                        assigned_at: None,
                        deadline: slot.deadline,
                        notes: slot.notes.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn start_stage(&self, application_id: &str, stage: StageNumber) -> Result<Application> {
        self.with_app(application_id, |_, app| {
            let slot = app.stages.get_mut(stage);
            if slot.status != StageStatus::Assigned {
                return Err(Error::Conflict(format!("Stage {} is not assigned", stage)));
            }
            slot.status = StageStatus::InProgress;
            Ok(app.clone())
        })
    }

    async fn get_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
    ) -> Result<Option<FeedbackRecord>> {
        self.with_app(application_id, |_, app| {
            Ok(app.stage(stage).feedback.clone().map(|feedback| FeedbackRecord {
                feedback,
                can_edit: false,
                is_read_only: false,
                submitter_name: None,
            }))
        })
    }

    async fn submit_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
        submission: &FeedbackSubmission,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let applied = self.guard(Op::SubmitFeedback, Some(key))?;
        let app = self.with_app(application_id, |state, app| {
            let slot = app.stages.get_mut(stage);
            let now = Utc::now();
            slot.feedback = Some(match slot.feedback.take() {
                Some(existing) => Feedback {
                    approval_status: submission.approval_status,
                    performance_rating: submission.performance_rating,
                    comments: submission.comments.clone(),
                    edited_at: Some(now),
                    edit_count: existing.edit_count + 1,
                    ..existing
                },
                None => Feedback {
                    approval_status: submission.approval_status,
                    performance_rating: submission.performance_rating,
                    comments: submission.comments.clone(),
                    submitted_by: state.acting_as.clone(),
                    submitted_at: now,
                    edited_at: None,
                    edit_count: 0,
                },
            });
            slot.status = StageStatus::Completed;
            Ok(app.clone())
        })?;
        lost_response(applied, app)
    }

    async fn forward_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        self.guard(Op::Forward, Some(key))?;
        self.with_app(application_id, |_, app| {
            let slot = app.stages.get_mut(stage);
            if !matches!(slot.status, StageStatus::Completed | StageStatus::Pending) {
                return Err(Error::Conflict(format!(
                    "Stage {} must be completed before forwarding",
                    stage
                )));
            }
            slot.status = StageStatus::Forwarded;
            Ok(app.clone())
        })
    }

    async fn approve_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        self.guard(Op::Approve, Some(key))?;
        self.with_app(application_id, |_, app| {
            let slot = app.stages.get_mut(stage);
            if slot.status != StageStatus::Forwarded {
                return Err(Error::Conflict(format!("Stage {} must be forwarded first", stage)));
            }
            slot.status = StageStatus::Approved;
            if let Some(next) = stage.next() {
                app.current_stage = next.get();
            }
            Ok(app.clone())
        })
    }

    async fn reject_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        self.guard(Op::Reject, Some(key))?;
        self.with_app(application_id, |_, app| {
            let slot = app.stages.get_mut(stage);
            if slot.status != StageStatus::Forwarded {
                return Err(Error::Conflict(format!("Stage {} must be forwarded first", stage)));
            }
            slot.status = StageStatus::Rejected;
            slot.rejection_reason = Some(reason.to_string());
            app.status = ApplicationStatus::Rejected;
            Ok(app.clone())
        })
    }

    async fn submit_final_recommendation(
        &self,
        application_id: &str,
        request: &FinalRecommendationRequest,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let applied = self.guard(Op::FinalRecommendation, Some(key))?;
        let app = self.with_app(application_id, |_, app| {
            app.stages.get_mut(StageNumber::FINAL).evaluation =
                Some(serde_json::to_value(request).map_err(Error::from)?);
            app.status = ApplicationStatus::Completed;
            Ok(app.clone())
        })?;
        lost_response(applied, app)
    }

    async fn list_notifications(&self, unread_only: bool, limit: u32) -> Result<Vec<Notification>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == state.acting_as && (!unread_only || !n.is_read))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn unread_count(&self) -> Result<u64> {
        self.guard(Op::UnreadCount, None)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == state.acting_as && !n.is_read)
            .count() as u64)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let n = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| Error::NotFound("Notification not found".into()))?;
        n.is_read = true;
        n.read_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let me = state.acting_as.clone();
        let mut count = 0;
        for n in state.notifications.iter_mut().filter(|n| n.user_id == me && !n.is_read) {
            n.is_read = true;
            count += 1;
        }
        Ok(count)
    }
}

/// Keeps every notice it receives.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<AssignmentNotice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<AssignmentNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: FakeStore,
    pub notifier: RecordingNotifier,
    pub drafts: InMemoryDraftStore,
    pub state: AppState,
}

/// App state over the fake store with millisecond backoff.
pub fn harness(app: Application) -> Harness {
    let store = FakeStore::with_application(app);
    let notifier = RecordingNotifier::default();
    let drafts = InMemoryDraftStore::new();
    let mut config = Config::new("http://fake.invalid/api");
    config.retry_base_delay_ms = 1;
    let state = AppState::with_parts(
        Arc::new(store.clone()),
        Arc::new(drafts.clone()),
        Arc::new(notifier.clone()),
        &config,
    );
    Harness {
        store,
        notifier,
        drafts,
        state,
    }
}

pub fn fresh_application() -> Application {
    Application::new("app1", "cand1", "job1")
}

pub fn application_with(stages: &[(u8, StageStatus, Option<&str>)]) -> Application {
    let mut app = fresh_application();
    for (n, status, assignee) in stages {
        let slot = app.stages.get_mut(stage(*n));
        slot.status = *status;
        slot.assigned_to = assignee.map(str::to_string);
    }
    app
}
