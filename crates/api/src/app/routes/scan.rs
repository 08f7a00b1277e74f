//! Scanning-station endpoints.
//!
//! A station opens a session with a tracking id, then posts one part number
//! per physical scan. The final matching scan commits the dispatch.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use shipcheck_auth::{Capability, Permission};
use shipcheck_core::SessionToken;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::authz::capability_for;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/sessions", post(begin_scan))
        .route("/sessions/:token", get(get_session).delete(abandon_session))
        .route("/sessions/:token/parts", post(scan_part))
        .route("/sessions/:token/dispatch", post(retry_dispatch))
}

fn scan_capability(principal: &PrincipalContext) -> Result<Capability, axum::response::Response> {
    capability_for(principal, &Permission::DISPATCH_SCAN).map_err(errors::authz_error_to_response)
}

fn parse_token(raw: &str) -> Result<SessionToken, axum::response::Response> {
    raw.parse::<SessionToken>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_token", "invalid session token")
    })
}

pub async fn begin_scan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::BeginScanRequest>,
) -> axum::response::Response {
    let cap = match scan_capability(&principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.scans.begin_scan(&cap, &body.tracking_id).await {
        Ok(started) => (StatusCode::CREATED, Json(started)).into_response(),
        Err(e) => errors::scan_error_to_response(e),
    }
}

pub async fn scan_part(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(token): Path<String>,
    Json(body): Json<dto::ScanPartRequest>,
) -> axum::response::Response {
    let cap = match scan_capability(&principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let token = match parse_token(&token) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.scans.scan_part(&cap, token, &body.part_number).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::scan_error_to_response(e),
    }
}

pub async fn retry_dispatch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(token): Path<String>,
) -> axum::response::Response {
    let cap = match scan_capability(&principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let token = match parse_token(&token) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.scans.retry_dispatch(&cap, token).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::scan_error_to_response(e),
    }
}

pub async fn get_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(token): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = scan_capability(&principal) {
        return resp;
    }
    let token = match parse_token(&token) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.scans.session(token).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::scan_error_to_response(e),
    }
}

pub async fn abandon_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(token): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = scan_capability(&principal) {
        return resp;
    }
    let token = match parse_token(&token) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.scans.abandon(token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::scan_error_to_response(e),
    }
}
