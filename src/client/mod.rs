//! Embeddable client checkout library: the persisted cart and the
//! address → payment → hosted-gateway state machine that drives the
//! payment endpoint. Everything external (storage, RPC, gateway widget)
//! sits behind traits so the flow is testable in isolation.

pub mod cart;
pub mod checkout;

pub use cart::{Cart, CartError, CartLine, CartStore, InMemoryCartStore, RingColor, RingSize};
pub use checkout::{
    BookingStore, CheckoutError, CheckoutFlow, CheckoutOptions, CheckoutState, CheckoutStateKind,
    GatewaySession, PaymentApi, PaymentMethod, PrelaunchBooking, ShippingAddress, Theme,
    VerifyOutcome,
};
