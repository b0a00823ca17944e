use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ringshop API",
        description = r#"
# Ringshop Storefront API

Backend for the smart-ring storefront checkout.

- **Payments RPC**: a single POST endpoint dispatching on the `action`
  field: `create_order`, `verify_payment`, `vip_signup`
- **Order Tracking**: look an order up by its human-facing tracking number

Prices are computed server-side from the catalog; amounts sent to the
payment gateway are in minor currency units.
        "#
    ),
    paths(
        crate::handlers::payments::payments_rpc,
        crate::handlers::orders::track_order,
    ),
    components(schemas(
        crate::handlers::payments::PaymentRpc,
        crate::handlers::payments::CreateOrderResponse,
        crate::handlers::payments::VerifyResponse,
        crate::handlers::payments::VipSignupResponse,
        crate::handlers::orders::TrackOrderResponse,
        crate::handlers::orders::TrackOrderItem,
        crate::services::pricing::CartLineInput,
    )),
    tags(
        (name = "payments", description = "Checkout and payment verification"),
        (name = "orders", description = "Order tracking")
    )
)]
pub struct ApiDoc;

/// Serialized OpenAPI document, served at `/api-docs/openapi.json`.
pub fn openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}
