//! Order pricing and line-item building.
//!
//! Converts a client-supplied cart into authoritative line items and a
//! total. Unit prices come exclusively from the catalog; nothing the client
//! sends can influence what gets charged. Pre-order SKUs are ordinary
//! catalog rows flagged `preorder` whose price is the deposit amount, so
//! they go through the same lookup as everything else.

use crate::entities::{product, Product};
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

pub const MIN_RING_SIZE: i16 = 6;
pub const MAX_RING_SIZE: i16 = 13;

/// A cart line as received from the client. Deliberately carries no price
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineInput {
    pub product_id: Uuid,
    pub color: String,
    pub size: i16,
    pub quantity: i32,
}

/// A line item with its catalog price resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub color: String,
    pub size: i16,
    pub quantity: i32,
    /// Catalog unit price at pricing time; becomes `price_at_purchase`
    pub unit_price: Decimal,
    pub preorder: bool,
}

/// A fully priced cart, ready to become an order.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
    pub currency: String,
}

impl PricedOrder {
    /// True when the cart is a pre-launch deposit booking.
    pub fn is_preorder(&self) -> bool {
        self.lines.iter().any(|l| l.preorder)
    }
}

#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves catalog prices for every cart line and computes the total.
    ///
    /// Any product id missing from the catalog aborts the whole request;
    /// partial orders are never created.
    #[instrument(skip(self, lines))]
    pub async fn price_cart(&self, lines: &[CartLineInput]) -> Result<PricedOrder, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::InvalidInput("cart is empty".to_string()));
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        let mut currency: Option<String> = None;

        for line in lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity must be positive, got {}",
                    line.quantity
                )));
            }
            if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&line.size) {
                return Err(ServiceError::ValidationError(format!(
                    "ring size must be between {} and {}, got {}",
                    MIN_RING_SIZE, MAX_RING_SIZE, line.size
                )));
            }

            let item: product::Model = Product::find_by_id(line.product_id)
                .one(&*self.db)
                .await?
                .filter(|p| p.active)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("product {} not found", line.product_id))
                })?;

            match &currency {
                None => currency = Some(item.currency.clone()),
                Some(c) if *c != item.currency => {
                    return Err(ServiceError::InvalidOperation(
                        "cart mixes currencies".to_string(),
                    ))
                }
                Some(_) => {}
            }

            total += item.price * Decimal::from(line.quantity);
            priced.push(PricedLine {
                product_id: item.id,
                name: item.name,
                color: line.color.clone(),
                size: line.size,
                quantity: line.quantity,
                unit_price: item.price,
                preorder: item.preorder,
            });
        }

        Ok(PricedOrder {
            lines: priced,
            total,
            // currency is Some: lines is non-empty
            currency: currency.unwrap_or_else(|| "INR".to_string()),
        })
    }
}
