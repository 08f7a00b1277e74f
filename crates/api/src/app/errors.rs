use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use shipcheck_auth::AuthzError;
use shipcheck_core::DomainError;
use shipcheck_infra::{OrderStoreError, ScanError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

pub fn store_error_to_response(err: OrderStoreError) -> axum::response::Response {
    match err {
        OrderStoreError::Unavailable(msg) => {
            tracing::warn!(error = %msg, "order store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        OrderStoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        OrderStoreError::Corrupt(msg) => {
            tracing::error!(error = %msg, "corrupt order record");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_record", msg)
        }
    }
}

pub fn scan_error_to_response(err: ScanError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ScanError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        ScanError::EmptyTrackingId => {
            json_error(StatusCode::BAD_REQUEST, "empty_tracking_id", message)
        }
        ScanError::TrackingIdNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "tracking_id_not_found", message)
        }
        ScanError::AlreadyDispatched(_) => {
            json_error(StatusCode::CONFLICT, "already_dispatched", message)
        }
        ScanError::NothingToVerify(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "nothing_to_verify", message)
        }
        ScanError::UnknownSession(_) => {
            json_error(StatusCode::NOT_FOUND, "unknown_session", message)
        }
        ScanError::EmptyPartNumber => {
            json_error(StatusCode::BAD_REQUEST, "empty_part_number", message)
        }
        ScanError::Rejected { reason, progress } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": reason.as_str(),
                "message": message,
                "accepted": false,
                "progress": progress,
            })),
        )
            .into_response(),
        ScanError::NotReadyForDispatch { progress } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "not_ready_for_dispatch",
                "message": message,
                "progress": progress,
            })),
        )
            .into_response(),
        ScanError::DispatchFailed {
            progress, retryable, ..
        } => {
            let status = if retryable {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                axum::Json(json!({
                    "error": "dispatch_failed",
                    "message": message,
                    "progress": progress,
                    "retryable": retryable,
                })),
            )
                .into_response()
        }
        ScanError::OrderVanished(_) => json_error(StatusCode::NOT_FOUND, "order_vanished", message),
        ScanError::Store(e) => store_error_to_response(e),
        ScanError::Session(_) => json_error(StatusCode::CONFLICT, "invalid_session_state", message),
    }
}

#[cfg(test)]
mod tests {
    use shipcheck_scan::Progress;

    use super::*;

    async fn body_of(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn dispatch_failed(retryable: bool, source: OrderStoreError) -> ScanError {
        ScanError::DispatchFailed {
            progress: Progress { scanned: 2, required: 2 },
            retryable,
            source,
        }
    }

    #[tokio::test]
    async fn transient_dispatch_failure_is_flagged_retryable() {
        let resp = scan_error_to_response(dispatch_failed(
            true,
            OrderStoreError::Unavailable("connection reset".to_string()),
        ));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_of(resp).await;
        assert_eq!(body["retryable"], true);
        assert_eq!(body["progress"]["scanned"], 2);
    }

    #[tokio::test]
    async fn permanent_dispatch_failure_is_not_retryable() {
        let resp = scan_error_to_response(dispatch_failed(
            false,
            OrderStoreError::Corrupt("bad status".to_string()),
        ));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(resp).await["retryable"], false);
    }
}
