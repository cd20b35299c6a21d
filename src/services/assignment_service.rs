use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dto::pipeline_dto::{
    AssignStageRequest, BulkAssignRequest, BulkAssignResponse, BulkAssignResult,
    BulkStageOutcome, ReassignStageRequest, StageFailure,
};
use crate::error::{Error, ErrorKind, Result};
use crate::models::application::{Application, StageStatus};
use crate::models::assignment::{MyAssignment, StageAssignment};
use crate::models::notification::NotificationType;
use crate::models::stage::StageNumber;
use crate::models::user::{Caller, ADMIN_ONLY, EVALUATOR_ROLES, HR_ROLES};
use crate::services::api_client::{IdempotencyKey, RecruitmentApi};
use crate::services::notification_service::{AssignmentNotice, Notifier};
use crate::services::retry_service::{RetryConfig, RetryExecutor, RetryObserver, RetryState};
use crate::services::stage_pipeline::{StageAction, StagePipeline};
use crate::services::view_state::PipelineView;
use crate::utils::error_mapping::{STAGE_SELECTION_REQUIRED, TEAM_MEMBER_REQUIRED};
use crate::utils::time::now;
use crate::utils::validation::validate;

type AssignOperation = Box<dyn Fn() -> BoxFuture<'static, Result<StageAssignment>> + Send + Sync>;

/// Creates stage assignments. Single and bulk writes go through the retry executor; bulk
/// writes report per-stage outcomes instead of failing as a whole.
#[derive(Clone)]
pub struct AssignmentService {
    api: Arc<dyn RecruitmentApi>,
    notifier: Arc<dyn Notifier>,
    single: RetryExecutor<StageAssignment>,
    bulk: RetryExecutor<BulkAssignResult>,
}

impl AssignmentService {
    pub fn new(
        api: Arc<dyn RecruitmentApi>,
        notifier: Arc<dyn Notifier>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            notifier,
            single: RetryExecutor::new(retry),
            bulk: RetryExecutor::new(retry),
        }
    }

    pub async fn assign_single(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        assignee: &str,
        deadline: Option<NaiveDate>,
        notes: Option<String>,
        observer: &dyn RetryObserver<StageAssignment>,
    ) -> Result<StageAssignment> {
        caller.assert_role(HR_ROLES)?;
        let stage = StageNumber::new(stage_number)?;
        let assignee = required_assignee(assignee)?;
        let request = AssignStageRequest {
            stage_number: stage,
            assigned_to: assignee,
            deadline,
            notes: non_blank(notes),
        };
        validate(&request)?;

        let app = view.current(self.api.as_ref()).await?;
        if let Err(e) = StagePipeline::check(&app, stage, StageAction::Assign) {
            tracing::warn!(application_id = %app.id, stage = %stage, error = %e, "assignment refused");
            return Err(e);
        }

        let operation = self.assign_operation(app.id.clone(), request, caller.id.clone());
        let result = self.single.execute(operation, observer).await;
        self.settle(view, &result).await;
        if let Ok(assignment) = &result {
            tracing::info!(
                application_id = %assignment.application_id,
                stage = %assignment.stage_number,
                assignee = %assignment.assigned_to,
                "stage assigned"
            );
        }
        result
    }

    fn assign_operation(
        &self,
        application_id: String,
        request: AssignStageRequest,
        assigned_by: String,
    ) -> AssignOperation {
        let api = Arc::clone(&self.api);
        let notifier = Arc::clone(&self.notifier);
        let key = IdempotencyKey::generate();
        let transient_seen = Arc::new(AtomicBool::new(false));

        Box::new(move || {
            let api = Arc::clone(&api);
            let notifier = Arc::clone(&notifier);
            let transient_seen = Arc::clone(&transient_seen);
            let application_id = application_id.clone();
            let request = request.clone();
            let assigned_by = assigned_by.clone();
            let key = key.clone();
            async move {
                let result = match api.assign_stage(&application_id, &request, &key).await {
                    Err(e)
                        if e.kind() == ErrorKind::Conflict
                            && transient_seen.load(Ordering::SeqCst) =>
                    {
                        // An earlier attempt may have landed before its response was lost.
                        match recover_applied(api.as_ref(), &application_id, &request, &assigned_by)
                            .await
                        {
                            Some(assignment) => {
                                tracing::info!(
                                    application_id = %application_id,
                                    stage = %request.stage_number,
                                    "conflict after transient failure resolved as already applied"
                                );
                                Ok(assignment)
                            }
                            None => Err(e),
                        }
                    }
                    Err(e) => {
                        if e.is_retryable() {
                            transient_seen.store(true, Ordering::SeqCst);
                        }
                        Err(e)
                    }
                    ok => ok,
                };
                if let Ok(assignment) = &result {
                    deliver(notifier.as_ref(), notice_for(assignment)).await;
                }
                result
            }
            .boxed()
        })
    }

    pub async fn assign_bulk(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_numbers: &[u8],
        assignee: &str,
        deadline: Option<NaiveDate>,
        notes: Option<String>,
        observer: &dyn RetryObserver<BulkAssignResult>,
    ) -> Result<BulkAssignResult> {
        caller.assert_role(HR_ROLES)?;
        let assignee = required_assignee(assignee)?;
        if stage_numbers.is_empty() {
            return Err(Error::Validation(STAGE_SELECTION_REQUIRED.to_string()));
        }
        let mut stages: Vec<StageNumber> = Vec::with_capacity(stage_numbers.len());
        for n in stage_numbers {
            let stage = StageNumber::new(*n)?;
            if !stages.contains(&stage) {
                stages.push(stage);
            }
        }
        let notes = non_blank(notes);

        let app = view.current(self.api.as_ref()).await?;
        if app.is_closed() {
            return Err(Error::ApplicationClosed(format!(
                "application {} is {}",
                app.id, app.status
            )));
        }

        let (pending, local_failures) = partition_assignable(&app, &stages);
        let total_requested = stages.len();

        if pending.is_empty() {
            let result = BulkAssignResult {
                success_count: 0,
                total_requested,
                failures: local_failures,
            };
            tracing::warn!(application_id = %app.id, "no requested stage is assignable");
            observer.on_success(&result);
            return Ok(result);
        }

        let request = BulkAssignRequest {
            stage_numbers: pending,
            assigned_to: assignee,
            deadline,
            notes,
        };
        validate(&request)?;

        let api = Arc::clone(&self.api);
        let notifier = Arc::clone(&self.notifier);
        let application_id = app.id.clone();
        let assigned_by = caller.id.clone();
        let key = IdempotencyKey::generate();
        let transient_seen = Arc::new(AtomicBool::new(false));

        let operation = move || {
            let api = Arc::clone(&api);
            let notifier = Arc::clone(&notifier);
            let transient_seen = Arc::clone(&transient_seen);
            let application_id = application_id.clone();
            let request = request.clone();
            let assigned_by = assigned_by.clone();
            let key = key.clone();
            let local_failures = local_failures.clone();
            async move {
                // After a transient failure part of the batch may already be applied.
                let resume = transient_seen.load(Ordering::SeqCst);
                let response =
                    match bulk_attempt(api.as_ref(), &application_id, &request, &key, resume).await {
                        Ok(response) => response,
                        Err(e) => {
                            if e.is_retryable() {
                                transient_seen.store(true, Ordering::SeqCst);
                            }
                            return Err(e);
                        }
                    };

                let assigned = assigned_stages(&request.stage_numbers, &response);
                if !assigned.is_empty() {
                    deliver(
                        notifier.as_ref(),
                        AssignmentNotice {
                            kind: NotificationType::Assignment,
                            application_id: application_id.clone(),
                            assignee: request.assigned_to.clone(),
                            assigned_by,
                            stages: assigned,
                            deadline: request.deadline,
                            reason: None,
                        },
                    )
                    .await;
                }
                Ok(merge_bulk(total_requested, local_failures, response))
            }
            .boxed()
        };

        let result = self.bulk.execute(operation, observer).await;
        self.settle(view, &result).await;
        if let Ok(summary) = &result {
            if summary.is_partial() {
                tracing::warn!(
                    application_id = %view.application_id(),
                    failed = ?summary.failed_stages().iter().map(|s| s.get()).collect::<Vec<_>>(),
                    "{}",
                    summary.summary()
                );
            } else {
                tracing::info!(application_id = %view.application_id(), "{}", summary.summary());
            }
        }
        result
    }

    /// Admin-only move of an assigned or in-progress stage to someone else.
    pub async fn reassign(
        &self,
        caller: &Caller,
        view: &PipelineView,
        stage_number: u8,
        new_assignee: &str,
        reason: &str,
        observer: &dyn RetryObserver<StageAssignment>,
    ) -> Result<StageAssignment> {
        caller.assert_role(ADMIN_ONLY)?;
        let stage = StageNumber::new(stage_number)?;
        let assignee = required_assignee(new_assignee)?;
        let request = ReassignStageRequest {
            stage_number: stage,
            assigned_to: assignee,
            reason: reason.trim().to_string(),
        };
        validate(&request)?;

        let app = view.current(self.api.as_ref()).await?;
        StagePipeline::check(&app, stage, StageAction::Reassign)?;
        if StagePipeline::stage_assignee(&app, stage) == Some(request.assigned_to.as_str()) {
            return Err(Error::Validation(format!(
                "Stage {} is already assigned to this team member",
                stage
            )));
        }

        let api = Arc::clone(&self.api);
        let notifier = Arc::clone(&self.notifier);
        let application_id = app.id.clone();
        let key = IdempotencyKey::generate();
        let operation = move || {
            let api = Arc::clone(&api);
            let notifier = Arc::clone(&notifier);
            let application_id = application_id.clone();
            let request = request.clone();
            let key = key.clone();
            async move {
                let assignment = api.reassign_stage(&application_id, &request, &key).await?;
                deliver(notifier.as_ref(), notice_for(&assignment)).await;
                Ok(assignment)
            }
            .boxed()
        };

        let result = self.single.execute(operation, observer).await;
        self.settle(view, &result).await;
        if let Ok(assignment) = &result {
            tracing::info!(
                application_id = %assignment.application_id,
                stage = %assignment.stage_number,
                from = ?assignment.reassigned_from,
                to = %assignment.assigned_to,
                "stage reassigned"
            );
        }
        result
    }

    /// Assignment audit trail, oldest first.
    pub async fn history(&self, caller: &Caller, application_id: &str) -> Result<Vec<StageAssignment>> {
        caller.assert_role(EVALUATOR_ROLES)?;
        let mut records = self.api.list_assignments(application_id).await?;
        records.sort_by_key(|r| r.assigned_at);
        Ok(records)
    }

    pub async fn my_assignments(&self, caller: &Caller) -> Result<Vec<MyAssignment>> {
        caller.assert_role(EVALUATOR_ROLES)?;
        self.api.my_assignments().await
    }

    pub fn assignment_state(&self) -> RetryState {
        self.single.state()
    }

    pub fn bulk_state(&self) -> RetryState {
        self.bulk.state()
    }

    pub fn can_retry_assignment(&self) -> bool {
        self.single.can_retry_manually()
    }

    pub fn can_retry_bulk(&self) -> bool {
        self.bulk.can_retry_manually()
    }

    /// Replays the last failed single assign or reassign as-is.
    pub async fn retry_assignment(
        &self,
        view: &PipelineView,
        observer: &dyn RetryObserver<StageAssignment>,
    ) -> Result<StageAssignment> {
        let result = self.single.retry_manually(observer).await;
        self.settle(view, &result).await;
        result
    }

    pub async fn retry_bulk(
        &self,
        view: &PipelineView,
        observer: &dyn RetryObserver<BulkAssignResult>,
    ) -> Result<BulkAssignResult> {
        let result = self.bulk.retry_manually(observer).await;
        self.settle(view, &result).await;
        result
    }

    /// Re-reads the application after a write, or after a conflict showed the view is stale.
    async fn settle<T>(&self, view: &PipelineView, result: &Result<T>) {
        let stale = match result {
            Ok(_) => true,
            Err(e) => e.kind() == ErrorKind::Conflict,
        };
        if stale {
            if let Err(e) = view.refresh(self.api.as_ref()).await {
                tracing::warn!(application_id = %view.application_id(), error = %e, "refresh after write failed");
            }
        }
    }
}

fn required_assignee(assignee: &str) -> Result<String> {
    let assignee = assignee.trim();
    if assignee.is_empty() {
        return Err(Error::Validation(TEAM_MEMBER_REQUIRED.to_string()));
    }
    Ok(assignee.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Splits requested stages into those still pending and local per-stage failures.
fn partition_assignable(app: &Application, stages: &[StageNumber]) -> (Vec<StageNumber>, Vec<StageFailure>) {
    let mut pending = Vec::new();
    let mut failures = Vec::new();
    for stage in stages {
        match StagePipeline::check(app, *stage, StageAction::Assign) {
            Ok(_) => pending.push(*stage),
            Err(e) => failures.push(StageFailure {
                stage_number: *stage,
                message: e.user_facing().message,
            }),
        }
    }
    (pending, failures)
}

fn outcome(stage: StageNumber, error: Option<String>) -> BulkStageOutcome {
    BulkStageOutcome {
        stage_number: stage,
        stage_name: Some(stage.info().name.to_string()),
        error,
    }
}

/// One pass over a bulk request. With `resume` set the application is re-read first: stages
/// already held by the requested assignee count as assigned and only pending ones are sent.
async fn bulk_attempt(
    api: &dyn RecruitmentApi,
    application_id: &str,
    request: &BulkAssignRequest,
    key: &IdempotencyKey,
    resume: bool,
) -> Result<BulkAssignResponse> {
    let mut applied = Vec::new();
    let mut refused = Vec::new();
    let mut outstanding = request.clone();
    let mut key = key.clone();

    if resume {
        let app = api.get_application(application_id).await?;
        outstanding.stage_numbers.clear();
        for stage in &request.stage_numbers {
            let slot = app.stage(*stage);
            if slot.status.holds_assignee()
                && slot.assigned_to.as_deref() == Some(request.assigned_to.as_str())
            {
                applied.push(outcome(*stage, None));
                continue;
            }
            match StagePipeline::check(&app, *stage, StageAction::Assign) {
                Ok(_) => outstanding.stage_numbers.push(*stage),
                Err(e) => refused.push(outcome(*stage, Some(e.detail()))),
            }
        }
        if outstanding.stage_numbers != request.stage_numbers {
            // A different body must not replay the original key.
            key = IdempotencyKey::generate();
        }
        tracing::info!(
            application_id = %application_id,
            applied = applied.len(),
            outstanding = outstanding.stage_numbers.len(),
            "resuming bulk assignment after transient failure"
        );
    }

    let mut response = if outstanding.stage_numbers.is_empty() {
        BulkAssignResponse {
            success_count: 0,
            total_requested: 0,
            failed_count: 0,
            successful_assignments: Vec::new(),
            failed_assignments: Vec::new(),
        }
    } else {
        match api.bulk_assign_stages(application_id, &outstanding, &key).await {
            Err(e) if e.kind() == ErrorKind::Conflict => {
                tracing::warn!(
                    application_id = %application_id,
                    error = %e,
                    "bulk endpoint refused the batch, assigning stage by stage"
                );
                assign_each(api, application_id, &outstanding).await?
            }
            other => other?,
        }
    };

    if applied.is_empty() && refused.is_empty() {
        return Ok(response);
    }
    let sent: Vec<StageNumber> = assigned_stages(&outstanding.stage_numbers, &response);
    applied.extend(sent.into_iter().map(|s| outcome(s, None)));
    refused.append(&mut response.failed_assignments);
    Ok(BulkAssignResponse {
        success_count: applied.len(),
        total_requested: request.stage_numbers.len(),
        failed_count: refused.len(),
        successful_assignments: applied,
        failed_assignments: refused,
    })
}

async fn assign_each(
    api: &dyn RecruitmentApi,
    application_id: &str,
    request: &BulkAssignRequest,
) -> Result<BulkAssignResponse> {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for stage in &request.stage_numbers {
        let single = AssignStageRequest {
            stage_number: *stage,
            assigned_to: request.assigned_to.clone(),
            deadline: request.deadline,
            notes: request.notes.clone(),
        };
        match api
            .assign_stage(application_id, &single, &IdempotencyKey::generate())
            .await
        {
            Ok(_) => succeeded.push(outcome(*stage, None)),
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => failed.push(outcome(*stage, Some(e.detail()))),
        }
    }
    Ok(BulkAssignResponse {
        success_count: succeeded.len(),
        total_requested: request.stage_numbers.len(),
        failed_count: failed.len(),
        successful_assignments: succeeded,
        failed_assignments: failed,
    })
}

fn assigned_stages(requested: &[StageNumber], response: &BulkAssignResponse) -> Vec<StageNumber> {
    if !response.successful_assignments.is_empty() {
        return response
            .successful_assignments
            .iter()
            .map(|o| o.stage_number)
            .collect();
    }
    if response.success_count == 0 {
        return Vec::new();
    }
    requested
        .iter()
        .copied()
        .filter(|s| !response.failed_assignments.iter().any(|f| f.stage_number == *s))
        .collect()
}

fn merge_bulk(
    total_requested: usize,
    mut failures: Vec<StageFailure>,
    response: BulkAssignResponse,
) -> BulkAssignResult {
    failures.extend(response.failed_assignments.into_iter().map(|f| StageFailure {
        stage_number: f.stage_number,
        message: crate::utils::error_mapping::map_detail(f.error.as_deref().unwrap_or_default()),
    }));
    failures.sort_by_key(|f| f.stage_number);
    BulkAssignResult {
        success_count: response.success_count,
        total_requested,
        failures,
    }
}

/// Looks for evidence that `request` was already applied by an earlier attempt.
async fn recover_applied(
    api: &dyn RecruitmentApi,
    application_id: &str,
    request: &AssignStageRequest,
    assigned_by: &str,
) -> Option<StageAssignment> {
    let app = api.get_application(application_id).await.ok()?;
    let slot = app.stage(request.stage_number);
    if !slot.status.holds_assignee() || slot.assigned_to.as_deref() != Some(request.assigned_to.as_str()) {
        return None;
    }

    if let Ok(history) = api.list_assignments(application_id).await {
        if let Some(record) = history
            .into_iter()
            .filter(|r| r.stage_number == request.stage_number && r.assigned_to == request.assigned_to)
            .max_by_key(|r| r.assigned_at)
        {
            return Some(record);
        }
    }

    Some(StageAssignment {
        id: None,
        application_id: application_id.to_string(),
        stage_number: request.stage_number,
        assigned_to: request.assigned_to.clone(),
        assigned_by: slot.assigned_by.clone().unwrap_or_else(|| assigned_by.to_string()),
        assigned_at: now(),
        status: StageStatus::Assigned,
        deadline: slot.deadline,
        notes: request.notes.clone(),
        reassigned_from: None,
        reassignment_reason: None,
        completed_at: None,
        assigned_to_name: None,
        assigned_by_name: None,
    })
}

fn notice_for(assignment: &StageAssignment) -> AssignmentNotice {
    AssignmentNotice {
        kind: if assignment.is_reassignment() {
            NotificationType::Reassignment
        } else {
            NotificationType::Assignment
        },
        application_id: assignment.application_id.clone(),
        assignee: assignment.assigned_to.clone(),
        assigned_by: assignment.assigned_by.clone(),
        stages: vec![assignment.stage_number],
        deadline: assignment.deadline.map(|d| d.date_naive()),
        reason: assignment.reassignment_reason.clone(),
    }
}

async fn deliver(notifier: &dyn Notifier, notice: AssignmentNotice) {
    if let Err(e) = notifier.notify_assignment(&notice).await {
        tracing::warn!(
            application_id = %notice.application_id,
            assignee = %notice.assignee,
            error = %e,
            "assignment notification failed"
        );
    }
}
