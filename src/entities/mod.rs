pub mod order;
pub mod order_item;
pub mod outbox_email;
pub mod payment;
pub mod product;

// Re-export entities
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use outbox_email::{Entity as OutboxEmail, Model as OutboxEmailModel, OutboxStatus};
pub use payment::{Entity as Payment, Model as PaymentModel};
pub use product::{Entity as Product, Model as ProductModel};
