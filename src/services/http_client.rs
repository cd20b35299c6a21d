use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::config::Config;
use crate::dto::pipeline_dto::{
    ApplicationPayload, AssignStageRequest, AssignmentEnvelope, AssignmentHistoryEnvelope,
    BulkAssignEnvelope, BulkAssignRequest, BulkAssignResponse, CountResponse, FeedbackEnvelope,
    FeedbackSubmission, FinalRecommendationRequest, MyAssignmentsEnvelope, ReassignStageRequest,
};
use crate::error::{Error, Result};
use crate::models::application::Application;
use crate::models::assignment::{MyAssignment, StageAssignment};
use crate::models::feedback::FeedbackRecord;
use crate::models::notification::Notification;
use crate::models::stage::StageNumber;
use crate::services::api_client::{IdempotencyKey, RecruitmentApi};
use crate::utils::error_mapping::classify_response;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// `RecruitmentApi` over the backend's JSON HTTP interface.
#[derive(Clone)]
pub struct HttpRecruitmentApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRecruitmentApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout()).build()?;
        Self::with_client(client, &config.api_base_url, config.api_token.clone())
    }

    pub fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API base URL cannot carry paths: {}",
                base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn stage_endpoint(&self, application_id: &str, stage: StageNumber, action: &str) -> Result<Url> {
        let n = stage.to_string();
        self.endpoint(&["applications", application_id, "stage", &n, action])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn mutation<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
        key: &IdempotencyKey,
    ) -> RequestBuilder {
        self.request(method, url)
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(body)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let request = builder.build()?;
        let method = request.method().clone();
        let path = request.url().path().to_string();
        tracing::debug!(%method, %path, "remote call");

        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify_response(status.as_u16(), &body);
            tracing::warn!(%method, %path, status = status.as_u16(), kind = %err.kind(), "remote call failed");
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(%method, %path, error = %e, "malformed response body");
            Error::Server {
                status: status.as_u16(),
                message: format!("Malformed response: {}", e),
            }
        })
    }
}

#[async_trait]
impl RecruitmentApi for HttpRecruitmentApi {
    async fn get_application(&self, application_id: &str) -> Result<Application> {
        let url = self.endpoint(&["applications", application_id])?;
        let payload: ApplicationPayload = self.send(self.request(Method::GET, url)).await?;
        Ok(payload.into_application())
    }

    async fn assign_stage(
        &self,
        application_id: &str,
        request: &AssignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment> {
        let url = self.endpoint(&["applications", application_id, "assign-stage"])?;
        let envelope: AssignmentEnvelope =
            self.send(self.mutation(Method::POST, url, request, key)).await?;
        Ok(envelope.assignment)
    }

    async fn bulk_assign_stages(
        &self,
        application_id: &str,
        request: &BulkAssignRequest,
        key: &IdempotencyKey,
    ) -> Result<BulkAssignResponse> {
        let url = self.endpoint(&["applications", application_id, "bulk-assign-stages"])?;
        let envelope: BulkAssignEnvelope =
            self.send(self.mutation(Method::POST, url, request, key)).await?;
        Ok(envelope.result)
    }

    async fn reassign_stage(
        &self,
        application_id: &str,
        request: &ReassignStageRequest,
        key: &IdempotencyKey,
    ) -> Result<StageAssignment> {
        let url = self.endpoint(&["applications", application_id, "reassign-stage"])?;
        let envelope: AssignmentEnvelope =
            self.send(self.mutation(Method::PUT, url, request, key)).await?;
        Ok(envelope.assignment)
    }

    async fn list_assignments(&self, application_id: &str) -> Result<Vec<StageAssignment>> {
        let url = self.endpoint(&["applications", application_id, "assignments"])?;
        let envelope: AssignmentHistoryEnvelope =
            self.send(self.request(Method::GET, url)).await?;
        Ok(envelope.assignments)
    }

    async fn my_assignments(&self) -> Result<Vec<MyAssignment>> {
        let url = self.endpoint(&["applications", "my-assignments"])?;
        let envelope: MyAssignmentsEnvelope = self.send(self.request(Method::GET, url)).await?;
        Ok(envelope.assignments)
    }

    async fn start_stage(&self, application_id: &str, stage: StageNumber) -> Result<Application> {
        let url = self.stage_endpoint(application_id, stage, "start")?;
        let payload: ApplicationPayload = self.send(self.request(Method::POST, url)).await?;
        Ok(payload.into_application())
    }

    async fn get_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
    ) -> Result<Option<FeedbackRecord>> {
        let url = self.stage_endpoint(application_id, stage, "feedback")?;
        match self
            .send::<FeedbackEnvelope>(self.request(Method::GET, url))
            .await
        {
            Ok(envelope) => Ok(envelope.feedback),
            Err(Error::NotFound(detail)) if detail.to_lowercase().contains("feedback") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn submit_feedback(
        &self,
        application_id: &str,
        stage: StageNumber,
        submission: &FeedbackSubmission,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let url = self.stage_endpoint(application_id, stage, "feedback")?;
        let payload: ApplicationPayload = self
            .send(self.mutation(Method::POST, url, submission, key))
            .await?;
        Ok(payload.into_application())
    }

    async fn forward_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let url = self.stage_endpoint(application_id, stage, "forward")?;
        let payload: ApplicationPayload = self
            .send(self.mutation(Method::PUT, url, &json!({}), key))
            .await?;
        Ok(payload.into_application())
    }

    async fn approve_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let url = self.stage_endpoint(application_id, stage, "approve")?;
        let payload: ApplicationPayload = self
            .send(self.mutation(Method::PUT, url, &json!({}), key))
            .await?;
        Ok(payload.into_application())
    }

    async fn reject_stage(
        &self,
        application_id: &str,
        stage: StageNumber,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let url = self.stage_endpoint(application_id, stage, "reject")?;
        let payload: ApplicationPayload = self
            .send(self.mutation(Method::PUT, url, &json!({ "reason": reason }), key))
            .await?;
        Ok(payload.into_application())
    }

    async fn submit_final_recommendation(
        &self,
        application_id: &str,
        request: &FinalRecommendationRequest,
        key: &IdempotencyKey,
    ) -> Result<Application> {
        let url = self.endpoint(&["applications", application_id, "final-recommendation"])?;
        let payload: ApplicationPayload = self
            .send(self.mutation(Method::PUT, url, request, key))
            .await?;
        Ok(payload.into_application())
    }

    async fn list_notifications(&self, unread_only: bool, limit: u32) -> Result<Vec<Notification>> {
        let mut url = self.endpoint(&["notifications", ""])?;
        url.query_pairs_mut()
            .append_pair("unread_only", if unread_only { "true" } else { "false" })
            .append_pair("limit", &limit.to_string());
        self.send(self.request(Method::GET, url)).await
    }

    async fn unread_count(&self) -> Result<u64> {
        let url = self.endpoint(&["notifications", "unread-count"])?;
        let count: CountResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(count.count)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let url = self.endpoint(&["notifications", notification_id, "read"])?;
        let _: serde_json::Value = self.send(self.request(Method::PUT, url)).await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<u64> {
        let url = self.endpoint(&["notifications", "mark-all-read"])?;
        let count: CountResponse = self.send(self.request(Method::PUT, url)).await?;
        Ok(count.count)
    }
}
