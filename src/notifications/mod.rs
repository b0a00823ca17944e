//! Outbound email: sender port, HTTP implementation, and the storefront's
//! mail templates.

use crate::config::EmailConfig;
use crate::entities::{OrderItemModel, OrderModel};
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Seam to the email-sending collaborator. The outbox worker is the only
/// caller; request handlers never await delivery.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), ServiceError>;
}

/// Sends mail by POSTing `{to, from, subject, html}` to the email function.
#[derive(Clone)]
pub struct HttpEmailSender {
    http: reqwest::Client,
    endpoint: String,
    from: String,
    disabled: bool,
}

impl HttpEmailSender {
    pub fn new(cfg: &EmailConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init: {}", e)))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            from: cfg.from.clone(),
            disabled: cfg.disabled,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), ServiceError> {
        if self.disabled {
            info!("email delivery disabled; dropping message");
            return Ok(());
        }

        let body = json!({
            "to": message.to,
            "from": self.from,
            "subject": message.subject,
            "html": message.html,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("email function: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalApiError(format!(
                "email function returned {}: {}",
                status, text
            )));
        }

        info!("email dispatched");
        Ok(())
    }
}

/// Mail templates. Plain string rendering, matching what the storefront's
/// confirmation mails actually contain.
pub mod templates {
    use super::*;

    pub fn order_confirmation(order: &OrderModel, items: &[OrderItemModel]) -> EmailMessage {
        let rows: String = items
            .iter()
            .map(|item| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>size {}</td><td>x{}</td><td>₹{}</td></tr>",
                    item.name, item.color, item.size, item.quantity, item.price_at_purchase
                )
            })
            .collect();

        let html = format!(
            "<h1>Thanks for your order!</h1>\
             <p>Order <strong>{tracking}</strong> is confirmed and being processed.</p>\
             <table>{rows}</table>\
             <p>Total paid: <strong>₹{total}</strong></p>\
             <p>Keep your tracking number handy: {tracking}</p>",
            tracking = order.tracking_number,
            rows = rows,
            total = order.total_amount,
        );

        EmailMessage {
            to: order.guest_email.clone(),
            subject: format!("Order confirmed — {}", order.tracking_number),
            html,
        }
    }

    pub fn vip_welcome(email: &str) -> EmailMessage {
        EmailMessage {
            to: email.to_string(),
            subject: "Welcome to the ringshop VIP list".to_string(),
            html: "<h1>You're in.</h1>\
                   <p>You'll be the first to hear about new colors, sizes and early-bird pricing.</p>"
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_order() -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            tracking_number: "RING-TEST-0001".into(),
            status: OrderStatus::Processing,
            total_amount: dec!(12999),
            currency: "INR".into(),
            guest_email: "buyer@example.com".into(),
            shipping_address: serde_json::json!({"city": "Pune"}),
            gateway_order_id: "order_x".into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn confirmation_contains_tracking_total_and_items() {
        let order = sample_order();
        let items = vec![OrderItemModel {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Uuid::new_v4(),
            name: "HUX Smart Ring".into(),
            color: "Sterling Gold".into(),
            size: 8,
            quantity: 1,
            price_at_purchase: dec!(12999),
            created_at: Utc::now(),
        }];

        let mail = templates::order_confirmation(&order, &items);
        assert_eq!(mail.to, "buyer@example.com");
        assert!(mail.subject.contains("RING-TEST-0001"));
        assert!(mail.html.contains("RING-TEST-0001"));
        assert!(mail.html.contains("12999"));
        assert!(mail.html.contains("HUX Smart Ring"));
        assert!(mail.html.contains("Sterling Gold"));
    }

    #[test]
    fn vip_welcome_addresses_the_subscriber() {
        let mail = templates::vip_welcome("vip@example.com");
        assert_eq!(mail.to, "vip@example.com");
        assert!(mail.subject.to_lowercase().contains("vip"));
    }
}
