//! Order persistence gateway.
//!
//! Owns the durable side of the payment lifecycle: the transactional
//! pending-order insert, the idempotent Pending → Processing transition,
//! the payment audit row, and tracking-number issuance.

use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item, payment, Order, OrderItem, OrderModel};
use crate::errors::ServiceError;
use crate::events::{outbox, Event, EventSender};
use crate::notifications::templates;
use crate::services::pricing::PricedOrder;
use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of `mark_paid`, distinguishing a first verification from a
/// redelivered callback.
#[derive(Debug)]
pub struct MarkPaidOutcome {
    pub order: OrderModel,
    /// False when the order was already Processing (duplicate callback)
    pub newly_paid: bool,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Generates a human-readable tracking number. Entropy comes from a v4
    /// UUID fragment plus a random suffix, enough to stay collision-free
    /// across concurrently created orders.
    pub fn generate_tracking_number() -> String {
        let uuid_part = Uuid::new_v4().simple().to_string();
        let suffix: u16 = rand::thread_rng().gen();
        format!("RING-{}{:04X}", uuid_part[..10].to_uppercase(), suffix)
    }

    /// Creates the Pending order and its line items in one transaction.
    /// A line-item failure rolls the order row back; there is no state in
    /// which an order exists without its items.
    #[instrument(skip(self, priced, address))]
    pub async fn create_pending_order(
        &self,
        priced: &PricedOrder,
        address: serde_json::Value,
        email: &str,
        gateway_order_id: &str,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let tracking_number = Self::generate_tracking_number();

        let row = order::ActiveModel {
            id: Set(order_id),
            tracking_number: Set(tracking_number.clone()),
            status: Set(OrderStatus::Pending),
            total_amount: Set(priced.total),
            currency: Set(priced.currency.clone()),
            guest_email: Set(email.to_string()),
            shipping_address: Set(address),
            gateway_order_id: Set(gateway_order_id.to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        let created = row.insert(&txn).await?;

        for line in &priced.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                color: Set(line.color.clone()),
                size: Set(line.size),
                quantity: Set(line.quantity),
                price_at_purchase: Set(line.unit_price),
                created_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                tracking_number: tracking_number.clone(),
            })
            .await;

        info!(%order_id, tracking_number, total = %priced.total, "pending order created");
        Ok(created)
    }

    /// Marks a verified order as paid, keyed by the gateway order id.
    ///
    /// Transition, payment audit row and confirmation-email enqueue happen
    /// in one transaction. A redelivered callback finds the order already
    /// Processing and returns the same success outcome without writing a
    /// second payment row.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<MarkPaidOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = Order::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no order for gateway order {}",
                    gateway_order_id
                ))
            })?;

        if existing.status == OrderStatus::Processing {
            txn.commit().await?;
            warn!(gateway_order_id, "duplicate verification callback; no-op");
            return Ok(MarkPaidOutcome {
                order: existing,
                newly_paid: false,
            });
        }

        let order_id = existing.id;
        let amount = existing.total_amount;

        let mut update: order::ActiveModel = existing.into();
        update.status = Set(OrderStatus::Processing);
        update.updated_at = Set(Some(Utc::now()));
        let updated = update.update(&txn).await?;

        let audit = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            gateway_order_id: Set(gateway_order_id.to_string()),
            gateway_payment_id: Set(gateway_payment_id.to_string()),
            signature: Set(signature.to_string()),
            amount: Set(amount),
            status: Set("captured".to_string()),
            created_at: Set(Utc::now()),
        };
        if let Err(err) = audit.insert(&txn).await {
            // Two deliveries of the same callback can both read Pending; the
            // loser trips the unique index on payments.gateway_order_id. That
            // is the same duplicate, so report the same no-op success.
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                txn.rollback().await?;
                warn!(gateway_order_id, "duplicate verification callback; no-op");
                let order = Order::find()
                    .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "no order for gateway order {}",
                            gateway_order_id
                        ))
                    })?;
                return Ok(MarkPaidOutcome {
                    order,
                    newly_paid: false,
                });
            }
            return Err(err.into());
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let mail = templates::order_confirmation(&updated, &items);
        outbox::enqueue(&txn, &mail.to, &mail.subject, &mail.html).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentVerified {
                order_id,
                gateway_payment_id: gateway_payment_id.to_string(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::ConfirmationEmailQueued { order_id })
            .await;

        info!(%order_id, gateway_order_id, "order marked paid");
        Ok(MarkPaidOutcome {
            order: updated,
            newly_paid: true,
        })
    }

    /// Looks an order up by its human-facing tracking number, with items.
    pub async fn get_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<(OrderModel, Vec<order_item::Model>), ServiceError> {
        let found = Order::find()
            .filter(order::Column::TrackingNumber.eq(tracking_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("order {} not found", tracking_number))
            })?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(found.id))
            .all(&*self.db)
            .await?;

        Ok((found, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tracking_numbers_have_the_expected_shape() {
        let tn = OrderService::generate_tracking_number();
        assert!(tn.starts_with("RING-"));
        assert_eq!(tn.len(), "RING-".len() + 14);
        assert!(tn["RING-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn tracking_numbers_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(OrderService::generate_tracking_number()));
        }
    }
}
