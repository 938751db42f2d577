//! Order intake, lookup and replay endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::OrderId;
use domain::Order;
use saga::{CreateOrderRequest, ReplaySummary, SagaError};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct OrderAcceptedResponse {
    pub status: &'static str,
    pub order_id: OrderId,
}

#[derive(Serialize)]
pub struct ReplayResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub summary: ReplaySummary,
}

/// POST /api/v1/orders/create-order: publishes `order.requested`.
///
/// The order only exists once the saga has processed the event; the
/// returned id is what later lookups use.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected order payload");
        ApiError::BadRequest("Invalid request".to_string())
    })?;

    let event = state.intake.create_order(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderAcceptedResponse {
            status: "Order created successfully",
            order_id: event.id,
        }),
    ))
}

/// POST /api/v1/orders/{id}/cancel: publishes `order.cancelled`.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError> {
    let order_id = OrderId::new(id);
    if state.orders.get_order(&order_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }

    let event = state.intake.cancel_order(order_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderAcceptedResponse {
            status: "Order cancellation requested",
            order_id: event.order_id,
        }),
    ))
}

/// GET /api/v1/orders/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = OrderId::new(id);
    state
        .orders
        .get_order(&order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))
}

/// POST /api/v1/orders/replay-failed-events: republishes one batch of
/// stored events.
#[tracing::instrument(skip_all)]
pub async fn replay_failed_events(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    match state.replay.replay_failed_events().await {
        Ok(summary) => Ok((
            StatusCode::OK,
            Json(ReplayResponse {
                status: Some("Replay complete"),
                error: None,
                summary,
            }),
        )
            .into_response()),
        Err(err @ SagaError::ReplayIncomplete { replayed, failed, total }) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReplayResponse {
                status: None,
                error: Some(err.to_string()),
                summary: ReplaySummary {
                    replayed,
                    failed,
                    total,
                },
            }),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}
