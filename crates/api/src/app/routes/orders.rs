use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use shipcheck_auth::Permission;
use shipcheck_core::AggregateId;
use shipcheck_orders::{Order, OrderId, TrackingId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::authz::capability_for;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/tracking/:tracking_id", get(get_order_by_tracking_id))
        .route("/:id", get(get_order).delete(delete_order))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse::<AggregateId>()
        .map(OrderId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    if let Err(e) = capability_for(&principal, &Permission::ORDERS_CREATE) {
        return errors::authz_error_to_response(e);
    }

    let order = match body.into_command(Utc::now()).and_then(Order::create) {
        Ok(o) => o,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.insert(order).await {
        Ok(stored) => {
            tracing::info!(
                order_id = %stored.id_typed(),
                tracking_id = %stored.tracking_id(),
                "order created"
            );
            (StatusCode::CREATED, Json(stored.to_record())).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    if let Err(e) = capability_for(&principal, &Permission::ORDERS_READ) {
        return errors::authz_error_to_response(e);
    }

    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.list(&filter).await {
        Ok(orders) => {
            let items = orders.iter().map(Order::to_record).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = capability_for(&principal, &Permission::ORDERS_READ) {
        return errors::authz_error_to_response(e);
    }

    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.find_by_id(id).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order.to_record())).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_order_by_tracking_id(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(tracking_id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = capability_for(&principal, &Permission::ORDERS_READ) {
        return errors::authz_error_to_response(e);
    }

    let tracking_id = match TrackingId::parse(&tracking_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.find_by_tracking_id(&tracking_id).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order.to_record())).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "tracking_id_not_found",
            format!("no order with tracking id '{tracking_id}'"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = capability_for(&principal, &Permission::ORDERS_DELETE) {
        return errors::authz_error_to_response(e);
    }

    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.delete(id).await {
        Ok(true) => {
            tracing::info!(order_id = %id, "order deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
