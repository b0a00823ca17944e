pub mod orders;
pub mod pricing;

pub use orders::OrderService;
pub use pricing::PricingService;
