pub mod razorpay;
pub mod signature;

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use razorpay::RazorpayClient;

/// Order created at the payment gateway for the hosted checkout widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Gateway-assigned order id (e.g. `order_Nx...`)
    pub id: String,
    /// Amount in minor currency units (paise)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

/// Server-side seam to the hosted payment gateway. One implementation talks
/// to the real REST API; tests substitute a stub.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for the given amount in minor units.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Public key id the hosted widget is initialized with.
    fn checkout_key(&self) -> &str;
}
