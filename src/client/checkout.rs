//! The checkout state machine.
//!
//! One flow serves both the regular storefront and the pre-launch booking
//! variant; the differences (payment methods, theme, prefilled address,
//! deposit breakdown) are configuration, not parallel implementations.
//!
//! States: `AddressEntry → PaymentSelection → GatewayCheckoutOpen →
//! {Success, Failure, Dismissed}`. Exactly one gateway session may be in
//! flight; `submit_payment` refuses while `loading` is set.

use crate::client::cart::{Cart, CartError, CartStore, RingSize};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").unwrap());
static POSTAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("a gateway session is already in flight")]
    SessionInFlight,

    #[error("cart is empty")]
    EmptyCart,

    #[error("operation not valid in state {0:?}")]
    WrongState(CheckoutStateKind),

    #[error("payment method {0:?} is not offered here")]
    UnsupportedMethod(PaymentMethod),

    #[error("payment API error: {0}")]
    Api(String),

    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Shipping and contact details. Validated here before the flow may leave
/// `AddressEntry`; the server stores the blob opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,

    #[validate(email(message = "email must be valid"))]
    pub email: String,

    #[validate(regex(path = "PHONE_RE", message = "phone must be exactly 10 digits"))]
    pub phone: String,

    #[validate(length(min = 1, message = "address line is required"))]
    pub line1: String,

    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,

    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,

    #[validate(regex(path = "POSTAL_RE", message = "postal code must be exactly 6 digits"))]
    pub postal_code: String,
}

/// Locally stored pre-launch booking, used to prefill checkout for the
/// promotional deposit SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrelaunchBooking {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub size: RingSize,
}

impl PrelaunchBooking {
    fn to_address(&self) -> ShippingAddress {
        ShippingAddress {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            line1: self.line1.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

/// Storage port for the pre-launch booking record.
pub trait BookingStore: Send + Sync {
    fn load(&self) -> Option<PrelaunchBooking>;
    fn clear(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Upi,
    Card,
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Storefront,
    Prelaunch,
}

/// Per-surface configuration. The two historical checkout pages collapse
/// into one flow parameterized by this.
#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub payment_methods: Vec<PaymentMethod>,
    pub theme: Theme,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            payment_methods: vec![PaymentMethod::Upi, PaymentMethod::Card],
            theme: Theme::Storefront,
        }
    }
}

/// Parameters handed to the hosted gateway widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySession {
    pub gateway_order_id: String,
    /// Amount in minor units, as priced by the server
    pub amount_minor: i64,
    pub currency: String,
    /// Public gateway key the widget is initialized with
    pub key: String,
}

/// Result of the server-side verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { tracking_number: String },
    Rejected { message: String },
}

/// RPC port to the payment endpoint. The production implementation speaks
/// JSON over HTTP; tests substitute a scripted double.
#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn create_order(
        &self,
        cart: &Cart,
        address: &ShippingAddress,
    ) -> Result<GatewaySession, CheckoutError>;

    async fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<VerifyOutcome, CheckoutError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    AddressEntry,
    PaymentSelection,
    GatewayCheckoutOpen,
    Success { tracking_number: String },
    Failure { message: String },
    Dismissed,
}

impl CheckoutState {
    pub fn kind(&self) -> CheckoutStateKind {
        match self {
            CheckoutState::AddressEntry => CheckoutStateKind::AddressEntry,
            CheckoutState::PaymentSelection => CheckoutStateKind::PaymentSelection,
            CheckoutState::GatewayCheckoutOpen => CheckoutStateKind::GatewayCheckoutOpen,
            CheckoutState::Success { .. } => CheckoutStateKind::Success,
            CheckoutState::Failure { .. } => CheckoutStateKind::Failure,
            CheckoutState::Dismissed => CheckoutStateKind::Dismissed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStateKind {
    AddressEntry,
    PaymentSelection,
    GatewayCheckoutOpen,
    Success,
    Failure,
    Dismissed,
}

pub struct CheckoutFlow {
    options: CheckoutOptions,
    api: Arc<dyn PaymentApi>,
    cart_store: Arc<dyn CartStore>,
    booking_store: Option<Arc<dyn BookingStore>>,
    state: CheckoutState,
    address: Option<ShippingAddress>,
    session: Option<GatewaySession>,
    loading: bool,
    last_error: Option<String>,
}

impl CheckoutFlow {
    pub fn new(
        options: CheckoutOptions,
        api: Arc<dyn PaymentApi>,
        cart_store: Arc<dyn CartStore>,
    ) -> Self {
        Self {
            options,
            api,
            cart_store,
            booking_store: None,
            state: CheckoutState::AddressEntry,
            address: None,
            session: None,
            loading: false,
            last_error: None,
        }
    }

    /// Attaches the pre-launch booking store; an existing booking
    /// pre-populates the address form.
    pub fn with_booking_store(mut self, store: Arc<dyn BookingStore>) -> Self {
        if let Some(booking) = store.load() {
            self.address = Some(booking.to_address());
        }
        self.booking_store = Some(store);
        self
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Address draft, possibly prefilled from a stored booking.
    pub fn address_draft(&self) -> Option<&ShippingAddress> {
        self.address.as_ref()
    }

    pub fn payment_methods(&self) -> &[PaymentMethod] {
        &self.options.payment_methods
    }

    pub fn theme(&self) -> Theme {
        self.options.theme
    }

    /// Validates the address and advances to payment selection.
    pub fn submit_address(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        if self.state.kind() != CheckoutStateKind::AddressEntry {
            return Err(CheckoutError::WrongState(self.state.kind()));
        }
        address
            .validate()
            .map_err(|e| CheckoutError::InvalidAddress(e.to_string()))?;
        self.address = Some(address);
        self.state = CheckoutState::PaymentSelection;
        Ok(())
    }

    /// Creates the server-priced order and opens the hosted gateway
    /// session. Refuses while another session is in flight.
    pub async fn submit_payment(
        &mut self,
        method: PaymentMethod,
    ) -> Result<GatewaySession, CheckoutError> {
        if self.loading {
            return Err(CheckoutError::SessionInFlight);
        }
        if self.state.kind() != CheckoutStateKind::PaymentSelection {
            return Err(CheckoutError::WrongState(self.state.kind()));
        }
        if !self.options.payment_methods.contains(&method) {
            return Err(CheckoutError::UnsupportedMethod(method));
        }

        let cart = self.cart_store.load()?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let address = self
            .address
            .clone()
            .ok_or_else(|| CheckoutError::InvalidAddress("no address on file".to_string()))?;

        self.loading = true;
        match self.api.create_order(&cart, &address).await {
            Ok(session) => {
                info!(
                    gateway_order_id = %session.gateway_order_id,
                    amount_minor = session.amount_minor,
                    "gateway checkout opened"
                );
                self.session = Some(session.clone());
                self.state = CheckoutState::GatewayCheckoutOpen;
                Ok(session)
            }
            Err(e) => {
                // Stay on the payment step so the user can retry.
                self.loading = false;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Gateway `handler` callback: the widget reported success, now prove
    /// it server-side.
    pub async fn on_gateway_success(
        &mut self,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<&CheckoutState, CheckoutError> {
        if self.state.kind() != CheckoutStateKind::GatewayCheckoutOpen {
            return Err(CheckoutError::WrongState(self.state.kind()));
        }
        let session = self
            .session
            .clone()
            .ok_or(CheckoutError::WrongState(self.state.kind()))?;

        let outcome = self
            .api
            .verify_payment(&session.gateway_order_id, gateway_payment_id, signature)
            .await;

        self.loading = false;
        match outcome {
            Ok(VerifyOutcome::Verified { tracking_number }) => {
                self.cart_store.clear()?;
                if let Some(store) = &self.booking_store {
                    store.clear();
                }
                self.session = None;
                self.last_error = None;
                self.state = CheckoutState::Success { tracking_number };
            }
            Ok(VerifyOutcome::Rejected { message }) => {
                // Order stays unpaid; a retry needs a fresh gateway order.
                warn!("payment verification rejected: {}", message);
                self.session = None;
                self.last_error = Some(message.clone());
                self.state = CheckoutState::PaymentSelection;
            }
            Err(e) => {
                self.session = None;
                self.last_error = Some(e.to_string());
                self.state = CheckoutState::PaymentSelection;
            }
        }
        Ok(&self.state)
    }

    /// Gateway-reported payment failure. Recoverable; the form re-enables
    /// with the gateway's description.
    pub fn on_gateway_failure(&mut self, description: &str) {
        warn!("gateway reported payment failure: {}", description);
        self.loading = false;
        self.session = None;
        self.last_error = Some(description.to_string());
        self.state = CheckoutState::Failure {
            message: description.to_string(),
        };
    }

    /// User closed the hosted widget. No order mutation; loading resets so
    /// the UI does not hang.
    pub fn on_gateway_dismissed(&mut self) {
        self.loading = false;
        self.session = None;
        self.state = CheckoutState::Dismissed;
    }

    /// Returns to payment selection after a failure or dismissal.
    pub fn retry_payment(&mut self) -> Result<(), CheckoutError> {
        match self.state.kind() {
            CheckoutStateKind::Failure | CheckoutStateKind::Dismissed => {
                self.state = CheckoutState::PaymentSelection;
                Ok(())
            }
            kind => Err(CheckoutError::WrongState(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::cart::{InMemoryCartStore, RingColor};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn valid_address() -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            line1: "14 MG Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
        }
    }

    /// Scripted double for the payment endpoint.
    struct ScriptedApi {
        verify_outcomes: Mutex<Vec<VerifyOutcome>>,
        create_calls: Mutex<u32>,
    }

    impl ScriptedApi {
        fn new(outcomes: Vec<VerifyOutcome>) -> Arc<Self> {
            Arc::new(Self {
                verify_outcomes: Mutex::new(outcomes),
                create_calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl PaymentApi for ScriptedApi {
        async fn create_order(
            &self,
            _cart: &Cart,
            _address: &ShippingAddress,
        ) -> Result<GatewaySession, CheckoutError> {
            let mut calls = self.create_calls.lock().unwrap();
            *calls += 1;
            Ok(GatewaySession {
                gateway_order_id: format!("order_test_{}", calls),
                amount_minor: 1_299_900,
                currency: "INR".into(),
                key: "rzp_test_key".into(),
            })
        }

        async fn verify_payment(
            &self,
            _gateway_order_id: &str,
            _gateway_payment_id: &str,
            _signature: &str,
        ) -> Result<VerifyOutcome, CheckoutError> {
            Ok(self.verify_outcomes.lock().unwrap().remove(0))
        }
    }

    fn stocked_cart_store() -> Arc<InMemoryCartStore> {
        let store = Arc::new(InMemoryCartStore::default());
        let mut cart = Cart::new();
        cart.add(
            Uuid::new_v4(),
            RingColor::SterlingGold,
            RingSize::new(8).unwrap(),
            1,
        )
        .unwrap();
        store.save(&cart).unwrap();
        store
    }

    #[tokio::test]
    async fn happy_path_ends_in_success_and_clears_cart() {
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![VerifyOutcome::Verified {
            tracking_number: "RING-ABCDEF012345".into(),
        }]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store.clone());

        flow.submit_address(valid_address()).unwrap();
        assert_eq!(flow.state().kind(), CheckoutStateKind::PaymentSelection);

        let session = flow.submit_payment(PaymentMethod::Card).await.unwrap();
        assert_eq!(session.amount_minor, 1_299_900);
        assert!(flow.is_loading());

        let state = flow
            .on_gateway_success("pay_123", "sig_abc")
            .await
            .unwrap()
            .clone();
        assert_eq!(
            state,
            CheckoutState::Success {
                tracking_number: "RING-ABCDEF012345".into()
            }
        );
        assert!(store.load().unwrap().is_empty());
        assert!(!flow.is_loading());
    }

    #[tokio::test]
    async fn rejected_verification_returns_to_payment_selection() {
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![VerifyOutcome::Rejected {
            message: "signature mismatch".into(),
        }]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store.clone());

        flow.submit_address(valid_address()).unwrap();
        flow.submit_payment(PaymentMethod::Upi).await.unwrap();
        flow.on_gateway_success("pay_123", "forged").await.unwrap();

        assert_eq!(flow.state().kind(), CheckoutStateKind::PaymentSelection);
        assert_eq!(flow.last_error(), Some("signature mismatch"));
        // cart survives a failed verification
        assert!(!store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_submit_while_loading_is_rejected() {
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store);

        flow.submit_address(valid_address()).unwrap();
        flow.submit_payment(PaymentMethod::Card).await.unwrap();

        let err = flow.submit_payment(PaymentMethod::Card).await.unwrap_err();
        assert!(matches!(err, CheckoutError::SessionInFlight));
    }

    #[tokio::test]
    async fn dismiss_resets_loading_and_allows_retry() {
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store);

        flow.submit_address(valid_address()).unwrap();
        flow.submit_payment(PaymentMethod::Card).await.unwrap();
        flow.on_gateway_dismissed();

        assert_eq!(flow.state().kind(), CheckoutStateKind::Dismissed);
        assert!(!flow.is_loading());

        flow.retry_payment().unwrap();
        let session = flow.submit_payment(PaymentMethod::Card).await.unwrap();
        assert_eq!(session.gateway_order_id, "order_test_2");
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_description() {
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store);

        flow.submit_address(valid_address()).unwrap();
        flow.submit_payment(PaymentMethod::Card).await.unwrap();
        flow.on_gateway_failure("card declined by issuer");

        assert_eq!(
            flow.state(),
            &CheckoutState::Failure {
                message: "card declined by issuer".into()
            }
        );
        assert_eq!(flow.last_error(), Some("card declined by issuer"));
    }

    #[test]
    fn address_validation_enforces_phone_and_postal_formats() {
        let mut addr = valid_address();
        addr.phone = "12345".into();
        assert!(addr.validate().is_err());

        let mut addr = valid_address();
        addr.phone = "98765432101".into();
        assert!(addr.validate().is_err());

        let mut addr = valid_address();
        addr.postal_code = "5600".into();
        assert!(addr.validate().is_err());

        assert!(valid_address().validate().is_ok());
    }

    #[tokio::test]
    async fn unsupported_method_is_refused() {
        let options = CheckoutOptions {
            payment_methods: vec![PaymentMethod::Upi],
            theme: Theme::Prelaunch,
        };
        let store = stocked_cart_store();
        let api = ScriptedApi::new(vec![]);
        let mut flow = CheckoutFlow::new(options, api, store);

        flow.submit_address(valid_address()).unwrap();
        let err = flow
            .submit_payment(PaymentMethod::CashOnDelivery)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::UnsupportedMethod(PaymentMethod::CashOnDelivery)
        ));
    }

    struct StoredBooking {
        cleared: Mutex<bool>,
    }

    impl BookingStore for StoredBooking {
        fn load(&self) -> Option<PrelaunchBooking> {
            Some(PrelaunchBooking {
                name: "Asha Rao".into(),
                email: "asha@example.com".into(),
                phone: "9876543210".into(),
                line1: "14 MG Road".into(),
                city: "Bengaluru".into(),
                state: "Karnataka".into(),
                postal_code: "560001".into(),
                size: RingSize::new(8).unwrap(),
            })
        }

        fn clear(&self) {
            *self.cleared.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn booking_prefills_address_and_clears_on_success() {
        let store = stocked_cart_store();
        let booking = Arc::new(StoredBooking {
            cleared: Mutex::new(false),
        });
        let api = ScriptedApi::new(vec![VerifyOutcome::Verified {
            tracking_number: "RING-DEADBEEF0042".into(),
        }]);
        let mut flow = CheckoutFlow::new(CheckoutOptions::default(), api, store)
            .with_booking_store(booking.clone());

        let draft = flow.address_draft().cloned().expect("prefilled address");
        assert_eq!(draft.phone, "9876543210");

        flow.submit_address(draft).unwrap();
        flow.submit_payment(PaymentMethod::Card).await.unwrap();
        flow.on_gateway_success("pay_9", "sig").await.unwrap();

        assert!(*booking.cleared.lock().unwrap());
    }
}
