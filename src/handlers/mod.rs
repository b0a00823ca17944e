pub mod orders;
pub mod payments;

pub use orders::track_order;
pub use payments::payments_rpc;
