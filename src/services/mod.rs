pub mod api_client;
pub mod assignment_service;
pub mod draft_store;
pub mod escalation_service;
pub mod feedback_service;
pub mod http_client;
pub mod notification_service;
pub mod recommendation_service;
pub mod retry_service;
pub mod stage_pipeline;
pub mod template_service;
pub mod view_state;
