//! REST client for the hosted payment gateway.
//!
//! All calls run server-side with HTTP Basic auth built from the key
//! id/secret pair; the secret never reaches the browser. The adapter is
//! stateless per call and carries no retry logic.

use crate::config::GatewayConfig;
use crate::errors::ServiceError;
use crate::gateway::{GatewayOrder, PaymentGateway};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init: {}", e)))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let receipt = format!("rcpt_{}", Utc::now().timestamp_millis());
        let body = json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("gateway order request failed: {}", e);
                ServiceError::ExternalApiError(format!("gateway unreachable: {}", e))
            })?;

        let status = response.status();
        let raw: Value = response.json().await.map_err(|e| {
            error!("gateway returned unparseable body: {}", e);
            ServiceError::ExternalApiError(format!("gateway response unparseable: {}", e))
        })?;

        // A missing id means order creation failed regardless of status code.
        // Keep the raw gateway body in the logs for diagnostics; callers only
        // ever see a generic message.
        let Some(id) = raw.get("id").and_then(|v| v.as_str()) else {
            error!(status = %status, body = %raw, "gateway order creation failed");
            return Err(ServiceError::ExternalApiError(format!(
                "gateway order creation failed: {}",
                raw
            )));
        };

        info!(gateway_order_id = id, amount_minor, "gateway order created");
        Ok(GatewayOrder {
            id: id.to_string(),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt,
        })
    }

    fn checkout_key(&self) -> &str {
        &self.key_id
    }
}

/// Converts a major-unit decimal amount (rupees) to minor units (paise).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let minor = amount * Decimal::from(100);
    if minor.fract() != Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "amount {} has sub-paise precision",
            amount
        )));
    }
    minor
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput(format!("amount {} out of range", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rupees_convert_to_paise() {
        assert_eq!(to_minor_units(dec!(12999)).unwrap(), 1_299_900);
        assert_eq!(to_minor_units(dec!(0.50)).unwrap(), 50);
        assert_eq!(to_minor_units(dec!(1)).unwrap(), 100);
    }

    #[test]
    fn zero_is_zero() {
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn sub_paise_precision_is_rejected() {
        assert!(to_minor_units(dec!(1.005)).is_err());
    }
}
