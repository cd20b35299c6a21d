//! Maps raw remote failures into [`Error`] values and user-facing text.

use serde_json::Value as JsonValue;

use crate::error::Error;

pub const STAGE_ALREADY_ASSIGNED: &str =
    "This stage has already been assigned to another team member.";
pub const STAGE_NOT_PENDING: &str =
    "This stage cannot be assigned because it is not in pending status.";
pub const TEAM_MEMBER_NOT_FOUND: &str = "The selected team member could not be found.";
pub const APPLICATION_NOT_FOUND: &str = "The application could not be found.";
pub const INVALID_STAGE_NUMBER: &str = "Invalid stage number. Stage must be between 1 and 7.";
pub const NOT_ASSIGNED: &str =
    "You are not assigned to this stage. Only assigned team members can submit feedback.";
pub const INVALID_APPROVAL_STATUS: &str =
    "Please select a valid approval status (Approved or Rejected).";
pub const INVALID_RATING: &str = "Performance rating must be a number between 1 and 10.";
pub const RATING_OUT_OF_RANGE: &str = "Performance rating must be between 1 and 10.";
pub const COMMENTS_REQUIRED: &str = "Comments are required. Please provide detailed feedback.";
pub const COMMENTS_TOO_LONG: &str = "Comments must not exceed 1000 characters.";
pub const EDIT_WINDOW_EXPIRED: &str =
    "The edit window has expired. You can no longer modify this feedback.";
pub const MAX_EDITS_REACHED: &str =
    "You have reached the maximum number of edits (3) for this feedback.";
pub const FEEDBACK_NOT_FOUND: &str = "Feedback not found for this stage.";
pub const UNAUTHORIZED: &str = "You are not authorized to perform this action.";
pub const ADMIN_ONLY: &str = "This action requires administrator privileges.";
pub const FORBIDDEN: &str = "Access denied. You do not have permission to access this resource.";
pub const INVALID_TOKEN: &str = "Your session has expired. Please log in again.";
pub const NETWORK_ERROR: &str =
    "Network error. Please check your internet connection and try again.";
pub const SERVER_ERROR: &str = "Server error. Please try again later.";
pub const TIMEOUT_ERROR: &str = "Request timed out. Please try again.";
pub const TEAM_MEMBER_REQUIRED: &str = "Please select a team member.";
pub const STAGE_SELECTION_REQUIRED: &str = "Please select at least one stage.";
pub const UNKNOWN_ERROR: &str = "An unexpected error occurred. Please try again.";

const CONFLICT_MARKERS: [&str; 11] = [
    "already assigned",
    "not in pending status",
    "must be in pending status",
    "not pending",
    "edit window",
    "maximum",
    "must be completed",
    "must be forwarded",
    "cannot reassign",
    "not currently assigned",
    "invalid status transition",
];

/// Pulls the human readable detail out of an error body.
pub fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<JsonValue>(body) {
        Ok(json) => ["detail", "message", "error"]
            .iter()
            .find_map(|key| match json.get(*key) {
                Some(JsonValue::String(s)) => Some(s.clone()),
                Some(JsonValue::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

fn names_conflict(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    CONFLICT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Turns an HTTP status plus response body into a classified [`Error`].
pub fn classify_response(status: u16, body: &str) -> Error {
    let detail = extract_detail(body);
    match status {
        401 | 403 => Error::Unauthorized(detail),
        404 => Error::NotFound(detail),
        408 => Error::Timeout(detail),
        409 => Error::Conflict(detail),
        400..=499 if names_conflict(&detail) => Error::Conflict(detail),
        400..=499 => Error::Validation(detail),
        _ if status >= 500 => Error::Server {
            status,
            message: detail,
        },
        _ => Error::Server {
            status,
            message: format!("Unexpected status {}: {}", status, detail),
        },
    }
}

/// Maps a backend detail string to the message shown to users.
pub fn map_detail(detail: &str) -> String {
    if detail.trim().is_empty() {
        return UNKNOWN_ERROR.to_string();
    }
    let d = detail.to_lowercase();

    let mapped = if d.contains("already assigned") {
        Some(STAGE_ALREADY_ASSIGNED)
    } else if d.contains("not in pending status")
        || d.contains("must be in pending status")
        || d.contains("not pending")
    {
        Some(STAGE_NOT_PENDING)
    } else if d.contains("team member not found") {
        Some(TEAM_MEMBER_NOT_FOUND)
    } else if d.contains("application not found") {
        Some(APPLICATION_NOT_FOUND)
    } else if d.contains("invalid stage number") || d.contains("between 1 and 7") {
        Some(INVALID_STAGE_NUMBER)
    } else if d.contains("not assigned") {
        Some(NOT_ASSIGNED)
    } else if d.contains("approval status") {
        Some(INVALID_APPROVAL_STATUS)
    } else if d.contains("rating") && (d.contains("between") || d.contains("range")) {
        Some(RATING_OUT_OF_RANGE)
    } else if d.contains("rating") && d.contains("number") {
        Some(INVALID_RATING)
    } else if d.contains("comments") && d.contains("required") {
        Some(COMMENTS_REQUIRED)
    } else if d.contains("comments") && (d.contains("exceed") || d.contains("1000")) {
        Some(COMMENTS_TOO_LONG)
    } else if d.contains("edit window") && d.contains("expired") {
        Some(EDIT_WINDOW_EXPIRED)
    } else if d.contains("maximum") && d.contains("edit") {
        Some(MAX_EDITS_REACHED)
    } else if d.contains("feedback not found") {
        Some(FEEDBACK_NOT_FOUND)
    } else if d.contains("not authorized") || d.contains("unauthorized") {
        Some(UNAUTHORIZED)
    } else if d.contains("admin") && (d.contains("only") || d.contains("required")) {
        Some(ADMIN_ONLY)
    } else if d.contains("forbidden") || d.contains("access denied") {
        Some(FORBIDDEN)
    } else if d.contains("token") || d.contains("session") {
        Some(INVALID_TOKEN)
    } else {
        None
    };

    mapped
        .map(str::to_string)
        .unwrap_or_else(|| detail.to_string())
}

/// First field-level message of a failed `validate()` call.
pub fn map_field_errors(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{} is invalid", field),
            })
        })
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn extract_detail_prefers_detail_then_message() {
        assert_eq!(extract_detail(r#"{"detail":"Stage 2 is already assigned"}"#), "Stage 2 is already assigned");
        assert_eq!(extract_detail(r#"{"message":"nope"}"#), "nope");
        assert_eq!(extract_detail(r#"{"error":"forbidden"}"#), "forbidden");
        assert_eq!(extract_detail("plain text"), "plain text");
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(classify_response(403, "{}").kind(), ErrorKind::Authorization);
        assert_eq!(classify_response(401, "{}").kind(), ErrorKind::Authorization);
        assert_eq!(classify_response(404, "{}").kind(), ErrorKind::NotFound);
        assert_eq!(classify_response(408, "{}").kind(), ErrorKind::Timeout);
        assert_eq!(classify_response(409, "{}").kind(), ErrorKind::Conflict);
        assert_eq!(classify_response(422, r#"{"detail":"rating"}"#).kind(), ErrorKind::Validation);
        assert_eq!(classify_response(500, "boom").kind(), ErrorKind::ServerError);
        assert_eq!(classify_response(503, "").kind(), ErrorKind::ServerError);
    }

    #[test]
    fn bad_request_naming_a_conflict_is_a_conflict() {
        let err = classify_response(
            400,
            r#"{"detail":"Stage 3 is not in pending status. Current status: assigned"}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = classify_response(400, r#"{"detail":"Edit window expired or maximum edits reached"}"#);
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = classify_response(400, r#"{"detail":"Stage number must be between 1 and 7"}"#);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn refused_bulk_batch_is_a_conflict() {
        let err = classify_response(
            400,
            r#"{"detail":"All selected stages must be in pending status. Invalid stages: Stage 2 (assigned)"}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(map_detail(&err.detail()), STAGE_NOT_PENDING);
    }

    #[test]
    fn details_map_to_friendly_messages() {
        assert_eq!(map_detail("Stage 2 is already assigned to another team member"), STAGE_ALREADY_ASSIGNED);
        assert_eq!(map_detail("performance rating must be between 1 and 10"), RATING_OUT_OF_RANGE);
        assert_eq!(map_detail("The edit window has expired"), EDIT_WINDOW_EXPIRED);
        assert_eq!(map_detail(""), UNKNOWN_ERROR);
        assert_eq!(map_detail("something odd"), "something odd");
    }
}
