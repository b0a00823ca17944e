//! The client-held shopping cart.
//!
//! Lines are keyed by (product id, color, size); adding an existing
//! combination sums quantities instead of duplicating. The cart survives
//! reloads through an injected [`CartStore`] rather than a hidden global.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),

    #[error("invalid ring size {0}, supported sizes are 6 through 13")]
    InvalidRingSize(i16),

    #[error("cart storage error: {0}")]
    Storage(String),
}

/// Available ring finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RingColor {
    MidnightBlack,
    SterlingGold,
    BrushedSilver,
    RoseGold,
}

impl fmt::Display for RingColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RingColor::MidnightBlack => "Midnight Black",
            RingColor::SterlingGold => "Sterling Gold",
            RingColor::BrushedSilver => "Brushed Silver",
            RingColor::RoseGold => "Rose Gold",
        };
        f.write_str(name)
    }
}

/// Ring size, constrained to the manufactured range 6–13.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct RingSize(i16);

impl RingSize {
    pub const MIN: i16 = 6;
    pub const MAX: i16 = 13;

    pub fn new(size: i16) -> Result<Self, CartError> {
        if (Self::MIN..=Self::MAX).contains(&size) {
            Ok(Self(size))
        } else {
            Err(CartError::InvalidRingSize(size))
        }
    }

    pub fn value(self) -> i16 {
        self.0
    }
}

impl TryFrom<i16> for RingSize {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        RingSize::new(value).map_err(|e| e.to_string())
    }
}

impl From<RingSize> for i16 {
    fn from(size: RingSize) -> Self {
        size.0
    }
}

/// One cart entry. Identity is the (product, color, size) combination;
/// there is no id beyond that composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub color: RingColor,
    pub size: RingSize,
    pub quantity: i32,
}

impl CartLine {
    fn matches(&self, product_id: Uuid, color: RingColor, size: RingSize) -> bool {
        self.product_id == product_id && self.color == color && self.size == size
    }
}

/// The cart itself. Created empty, mutated by add/remove/update, cleared on
/// verified payment or explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds `quantity` of a variant. An existing (product, color, size)
    /// line absorbs the quantity instead of duplicating.
    pub fn add(
        &mut self,
        product_id: Uuid,
        color: RingColor,
        size: RingSize,
        quantity: i32,
    ) -> Result<(), CartError> {
        if quantity < 1 {
            return Err(CartError::NonPositiveQuantity(quantity));
        }
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.matches(product_id, color, size))
        {
            line.quantity += quantity;
        } else {
            self.lines.push(CartLine {
                product_id,
                color,
                size,
                quantity,
            });
        }
        Ok(())
    }

    /// Sets the quantity of an existing line; zero removes it.
    pub fn update_quantity(
        &mut self,
        product_id: Uuid,
        color: RingColor,
        size: RingSize,
        quantity: i32,
    ) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(CartError::NonPositiveQuantity(quantity));
        }
        if quantity == 0 {
            self.remove(product_id, color, size);
            return Ok(());
        }
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.matches(product_id, color, size))
        {
            line.quantity = quantity;
        }
        Ok(())
    }

    /// Moves an existing line to a different size, merging with any line
    /// already at the target size.
    pub fn update_size(
        &mut self,
        product_id: Uuid,
        color: RingColor,
        from: RingSize,
        to: RingSize,
    ) -> Result<(), CartError> {
        if from == to {
            return Ok(());
        }
        let Some(pos) = self
            .lines
            .iter()
            .position(|l| l.matches(product_id, color, from))
        else {
            return Ok(());
        };
        let moved = self.lines.remove(pos);
        self.add(product_id, color, to, moved.quantity)
    }

    pub fn remove(&mut self, product_id: Uuid, color: RingColor, size: RingSize) {
        self.lines.retain(|l| !l.matches(product_id, color, size));
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total_quantity(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Persistence port for the cart (local-storage analog). Implementations
/// return an empty cart when nothing was stored yet.
pub trait CartStore: Send + Sync {
    fn load(&self) -> Result<Cart, CartError>;
    fn save(&self, cart: &Cart) -> Result<(), CartError>;
    fn clear(&self) -> Result<(), CartError>;
}

/// In-memory store, used by tests and headless embedding.
#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    inner: std::sync::Mutex<Cart>,
}

impl CartStore for InMemoryCartStore {
    fn load(&self) -> Result<Cart, CartError> {
        Ok(self
            .inner
            .lock()
            .map_err(|e| CartError::Storage(e.to_string()))?
            .clone())
    }

    fn save(&self, cart: &Cart) -> Result<(), CartError> {
        *self
            .inner
            .lock()
            .map_err(|e| CartError::Storage(e.to_string()))? = cart.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), CartError> {
        self.save(&Cart::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: i16) -> RingSize {
        RingSize::new(n).unwrap()
    }

    #[test]
    fn adding_same_combination_merges_quantities() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        cart.add(product, RingColor::SterlingGold, size(8), 1).unwrap();
        cart.add(product, RingColor::SterlingGold, size(8), 2).unwrap();

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 3);
    }

    #[test]
    fn different_size_is_a_separate_line() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        cart.add(product, RingColor::SterlingGold, size(8), 1).unwrap();
        cart.add(product, RingColor::SterlingGold, size(9), 1).unwrap();

        assert_eq!(cart.lines.len(), 2);
    }

    #[test]
    fn different_color_is_a_separate_line() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        cart.add(product, RingColor::SterlingGold, size(8), 1).unwrap();
        cart.add(product, RingColor::MidnightBlack, size(8), 1).unwrap();

        assert_eq!(cart.lines.len(), 2);
    }

    #[test]
    fn update_quantity_to_zero_removes_the_line() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        cart.add(product, RingColor::RoseGold, size(7), 2).unwrap();
        cart.update_quantity(product, RingColor::RoseGold, size(7), 0)
            .unwrap();

        assert!(cart.is_empty());
    }

    #[test]
    fn update_size_merges_with_existing_target_line() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        cart.add(product, RingColor::BrushedSilver, size(8), 1).unwrap();
        cart.add(product, RingColor::BrushedSilver, size(9), 2).unwrap();
        cart.update_size(product, RingColor::BrushedSilver, size(8), size(9))
            .unwrap();

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].size, size(9));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let mut cart = Cart::new();
        let product = Uuid::new_v4();
        assert!(cart.add(product, RingColor::RoseGold, size(7), 0).is_err());
        assert!(cart.add(product, RingColor::RoseGold, size(7), -3).is_err());
    }

    #[test]
    fn ring_size_bounds() {
        assert!(RingSize::new(5).is_err());
        assert!(RingSize::new(6).is_ok());
        assert!(RingSize::new(13).is_ok());
        assert!(RingSize::new(14).is_err());
    }

    #[test]
    fn store_round_trip() {
        let store = InMemoryCartStore::default();
        let mut cart = Cart::new();
        cart.add(Uuid::new_v4(), RingColor::SterlingGold, size(8), 1)
            .unwrap();
        store.save(&cart).unwrap();
        assert_eq!(store.load().unwrap(), cart);
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
