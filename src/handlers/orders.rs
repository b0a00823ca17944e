//! Order tracking lookup.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::{entities::order_item, errors::ServiceError, AppState};

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackOrderResponse {
    pub tracking_number: String,
    pub status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TrackOrderItem>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackOrderItem {
    pub name: String,
    pub color: String,
    pub size: i16,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
}

impl From<order_item::Model> for TrackOrderItem {
    fn from(m: order_item::Model) -> Self {
        Self {
            name: m.name,
            color: m.color,
            size: m.size,
            quantity: m.quantity,
            price_at_purchase: m.price_at_purchase,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/track/{tracking_number}",
    params(("tracking_number" = String, Path, description = "Human-facing tracking number")),
    responses(
        (status = 200, description = "Order found", body = TrackOrderResponse),
        (status = 404, description = "No order with that tracking number")
    ),
    tag = "orders"
)]
#[instrument(skip(state))]
pub async fn track_order(
    State(state): State<AppState>,
    Path(tracking_number): Path<String>,
) -> Result<Json<TrackOrderResponse>, ServiceError> {
    let (order, items) = state
        .order_service
        .get_by_tracking_number(&tracking_number)
        .await?;

    Ok(Json(TrackOrderResponse {
        tracking_number: order.tracking_number,
        status: order.status.to_string(),
        total_amount: order.total_amount,
        currency: order.currency,
        created_at: order.created_at,
        items: items.into_iter().map(TrackOrderItem::from).collect(),
    }))
}
