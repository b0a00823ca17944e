//! The payment RPC endpoint.
//!
//! One POST route dispatches on the `action` field. This is the only
//! surface the storefront client talks to for money movement; everything
//! price-shaped is recomputed server-side from the catalog.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::Event,
    events::outbox,
    gateway::{razorpay::to_minor_units, signature},
    notifications::templates,
    services::pricing::CartLineInput,
    AppState,
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PaymentRpc {
    /// Price the cart, create a gateway order, persist a Pending order.
    CreateOrder {
        cart: Vec<CartLineInput>,
        /// Shipping address blob; stored opaquely on the order
        address: Value,
        email: String,
    },
    /// Verify a hosted-checkout callback and mark the order paid.
    VerifyPayment {
        razorpay_order_id: String,
        razorpay_payment_id: String,
        razorpay_signature: String,
    },
    /// Pre-launch mailing list signup.
    VipSignup { email: String },
}

#[derive(Debug, Deserialize, Validate)]
struct EmailField {
    #[validate(email(message = "email must be valid"))]
    email: String,
}

/// Shape the hosted gateway widget expects, so the client can hand it
/// over without remapping.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    /// Human-facing tracking number
    pub order_id: String,
    pub razorpay_order_id: String,
    /// Amount in minor units (paise)
    pub amount: i64,
    pub currency: String,
    /// Public key id for widget initialization
    pub key: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VipSignupResponse {
    pub status: &'static str,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/rpc",
    request_body = PaymentRpc,
    responses(
        (status = 200, description = "Action completed"),
        (status = 400, description = "Validation or signature failure"),
        (status = 502, description = "Payment gateway unreachable")
    ),
    tag = "payments"
)]
#[instrument(skip(state, rpc))]
pub async fn payments_rpc(
    State(state): State<AppState>,
    Json(rpc): Json<PaymentRpc>,
) -> Result<axum::response::Response, ServiceError> {
    match rpc {
        PaymentRpc::CreateOrder {
            cart,
            address,
            email,
        } => create_order(&state, cart, address, email).await,
        PaymentRpc::VerifyPayment {
            razorpay_order_id,
            razorpay_payment_id,
            razorpay_signature,
        } => {
            verify_payment(
                &state,
                razorpay_order_id,
                razorpay_payment_id,
                razorpay_signature,
            )
            .await
        }
        PaymentRpc::VipSignup { email } => vip_signup(&state, email).await,
    }
}

async fn create_order(
    state: &AppState,
    cart: Vec<CartLineInput>,
    address: Value,
    email: String,
) -> Result<axum::response::Response, ServiceError> {
    EmailField {
        email: email.clone(),
    }
    .validate()?;

    let priced = state.pricing_service.price_cart(&cart).await?;
    let amount_minor = to_minor_units(priced.total)?;

    let gateway_order = state
        .gateway
        .create_order(amount_minor, &priced.currency)
        .await?;

    let order = state
        .order_service
        .create_pending_order(&priced, address, &email, &gateway_order.id)
        .await?;

    info!(
        tracking_number = %order.tracking_number,
        gateway_order_id = %gateway_order.id,
        amount_minor,
        "order created, awaiting payment"
    );

    let body = CreateOrderResponse {
        order_id: order.tracking_number,
        razorpay_order_id: gateway_order.id,
        amount: amount_minor,
        currency: priced.currency,
        key: state.gateway.checkout_key().to_string(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn verify_payment(
    state: &AppState,
    razorpay_order_id: String,
    razorpay_payment_id: String,
    razorpay_signature: String,
) -> Result<axum::response::Response, ServiceError> {
    let genuine = signature::verify(
        &razorpay_order_id,
        &razorpay_payment_id,
        &razorpay_signature,
        &state.config.gateway.key_secret,
    );

    if !genuine {
        warn!(
            gateway_order_id = %razorpay_order_id,
            "payment signature did not verify; order left untouched"
        );
        state
            .event_sender
            .send_or_log(Event::PaymentVerificationFailed {
                gateway_order_id: razorpay_order_id,
            })
            .await;
        let body = VerifyResponse {
            status: "failure",
            order_id: None,
            message: Some("Payment verification failed".to_string()),
        };
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let outcome = state
        .order_service
        .mark_paid(&razorpay_order_id, &razorpay_payment_id, &razorpay_signature)
        .await?;

    let body = VerifyResponse {
        status: "success",
        order_id: Some(outcome.order.tracking_number),
        message: None,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn vip_signup(
    state: &AppState,
    email: String,
) -> Result<axum::response::Response, ServiceError> {
    EmailField {
        email: email.clone(),
    }
    .validate()?;

    let mail = templates::vip_welcome(&email);
    outbox::enqueue(&*state.db, &mail.to, &mail.subject, &mail.html).await?;

    state
        .event_sender
        .send_or_log(Event::VipSignup {
            email: email.clone(),
        })
        .await;

    info!(email, "vip signup queued");
    Ok((StatusCode::OK, Json(VipSignupResponse { status: "email_sent" })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn rpc_action_tag_dispatches_create_order() {
        let body = serde_json::json!({
            "action": "create_order",
            "cart": [{
                "product_id": Uuid::new_v4(),
                "color": "Midnight Black",
                "size": 9,
                "quantity": 1
            }],
            "address": {"line1": "14 MG Road"},
            "email": "asha@example.com"
        });
        let rpc: PaymentRpc = serde_json::from_value(body).unwrap();
        assert!(matches!(rpc, PaymentRpc::CreateOrder { ref cart, .. } if cart.len() == 1));
    }

    #[test]
    fn rpc_action_tag_dispatches_verify_payment() {
        let body = serde_json::json!({
            "action": "verify_payment",
            "razorpay_order_id": "order_abc",
            "razorpay_payment_id": "pay_def",
            "razorpay_signature": "cafe"
        });
        let rpc: PaymentRpc = serde_json::from_value(body).unwrap();
        assert!(matches!(rpc, PaymentRpc::VerifyPayment { .. }));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let body = serde_json::json!({"action": "refund", "id": "x"});
        assert!(serde_json::from_value::<PaymentRpc>(body).is_err());
    }

    #[test]
    fn client_supplied_totals_are_not_part_of_the_wire_format() {
        // Extra price fields deserialize but never reach pricing.
        let body = serde_json::json!({
            "action": "create_order",
            "cart": [{
                "product_id": Uuid::new_v4(),
                "color": "Sterling Gold",
                "size": 7,
                "quantity": 2,
                "price": dec!(1)
            }],
            "address": {},
            "email": "x@example.com"
        });
        let rpc: PaymentRpc = serde_json::from_value(body).unwrap();
        let PaymentRpc::CreateOrder { cart, .. } = rpc else {
            panic!("wrong variant");
        };
        assert_eq!(cart[0].quantity, 2);
    }

    #[test]
    fn create_order_response_uses_widget_field_names() {
        let body = CreateOrderResponse {
            order_id: "RING-AB12".into(),
            razorpay_order_id: "order_x".into(),
            amount: 1_299_900,
            currency: "INR".into(),
            key: "rzp_test_k".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["orderId"], "RING-AB12");
        assert_eq!(json["razorpayOrderId"], "order_x");
        assert_eq!(json["amount"], 1_299_900);
    }
}
