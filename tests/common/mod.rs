use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use ringshop_api::{
    config::{AppConfig, EmailConfig, GatewayConfig},
    db,
    entities::product,
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{GatewayOrder, PaymentGateway},
    AppState,
};

#[allow(dead_code)]
pub const TEST_GATEWAY_SECRET: &str = "rzp_test_secret";
#[allow(dead_code)]
pub const TEST_GATEWAY_KEY: &str = "rzp_test_key";

/// Deterministic in-process gateway; hands out sequential order ids
/// without any network traffic.
pub struct StubGateway {
    counter: AtomicU32,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_stub_{}", n),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: format!("rcpt_stub_{}", n),
        })
    }

    fn checkout_key(&self) -> &str {
        TEST_GATEWAY_KEY
    }
}

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    db_file: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = format!("ringshop_test_{}.db", Uuid::new_v4().simple());

        let mut cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            GatewayConfig {
                key_id: TEST_GATEWAY_KEY.to_string(),
                key_secret: TEST_GATEWAY_SECRET.to_string(),
                base_url: "http://gateway.invalid".to_string(),
                currency: "INR".to_string(),
            },
            EmailConfig {
                endpoint: "http://mailer.invalid/send".to_string(),
                from: "orders@ringshop.test".to_string(),
                disabled: true,
            },
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway: Arc<dyn PaymentGateway> = StubGateway::new();
        let state = AppState::new(db_arc, Arc::new(cfg), event_sender, gateway);

        let router = Router::new()
            .nest("/api/v1", ringshop_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            db_file,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a catalog row and return it.
    #[allow(dead_code)]
    pub async fn seed_product(
        &self,
        sku: &str,
        price: Decimal,
        preorder: bool,
    ) -> product::Model {
        let row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Test Ring {}", sku)),
            price: Set(price),
            full_price: Set(None),
            currency: Set("INR".to_string()),
            preorder: Set(preorder),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        row.insert(&*self.state.db)
            .await
            .expect("seed product for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Read a JSON body out of a response.
#[allow(dead_code)]
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
