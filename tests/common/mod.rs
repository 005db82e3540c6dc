#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{TimeZone, Utc};
use petcare_api::{
    checkout::{CancelOutcome, CheckoutError, CheckoutLink, CheckoutLinkRequest, CheckoutProvider},
    config::AppConfig,
    db,
    entities::payment::{PaymentMethod, SettlementTarget},
    events::{self, EventSender},
    services::{
        appointments::CreateAppointmentInput,
        catalog::CreateServiceInput,
        payments::{CheckoutUrls, CreatePaymentInput},
        pricing::{PricingStrategy, RequestedItem, Standard},
    },
    AppServices, AppState,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const CHECKSUM_KEY: &str = "test-checksum-key";

/// How the fake provider should fail its next calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    Timeout,
    Rejected,
}

impl FakeFailure {
    fn into_error(self) -> CheckoutError {
        match self {
            FakeFailure::Timeout => CheckoutError::Timeout,
            FakeFailure::Rejected => CheckoutError::Rejected {
                code: "20".into(),
                desc: "rejected by test".into(),
            },
        }
    }
}

#[derive(Debug)]
struct FakeState {
    create_failure: Option<FakeFailure>,
    create_delay: Option<Duration>,
    cancel_failure: Option<FakeFailure>,
    cancel_outcome: CancelOutcome,
    created: Vec<CheckoutLinkRequest>,
    cancelled: Vec<(i64, String)>,
}

/// Scriptable in-memory checkout provider.
#[derive(Debug)]
pub struct FakeCheckoutProvider {
    state: Mutex<FakeState>,
}

impl Default for FakeCheckoutProvider {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                create_failure: None,
                create_delay: None,
                cancel_failure: None,
                cancel_outcome: CancelOutcome::Cancelled,
                created: Vec::new(),
                cancelled: Vec::new(),
            }),
        }
    }
}

impl FakeCheckoutProvider {
    pub fn fail_create(&self, failure: Option<FakeFailure>) {
        self.state.lock().unwrap().create_failure = failure;
    }

    pub fn delay_create(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().create_delay = delay;
    }

    pub fn fail_cancel(&self, failure: Option<FakeFailure>) {
        self.state.lock().unwrap().cancel_failure = failure;
    }

    pub fn cancel_with(&self, outcome: CancelOutcome) {
        self.state.lock().unwrap().cancel_outcome = outcome;
    }

    pub fn created(&self) -> Vec<CheckoutLinkRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn cancelled(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckoutProvider {
    async fn create_link(&self, request: &CheckoutLinkRequest) -> Result<CheckoutLink, CheckoutError> {
        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.create_failure {
            return Err(failure.into_error());
        }
        state.created.push(request.clone());
        Ok(CheckoutLink {
            link_id: format!("link-{}", request.order_code),
            checkout_url: format!("https://checkout.test/{}", request.order_code),
        })
    }

    async fn cancel_link(&self, order_code: i64, reason: &str) -> Result<CancelOutcome, CheckoutError> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.cancel_failure {
            return Err(failure.into_error());
        }
        state.cancelled.push((order_code, reason.to_string()));
        Ok(state.cancel_outcome)
    }
}

/// Connections in the pool of a file-backed harness, matching the shipped
/// default so racing requests really run on separate connections.
pub const ON_DISK_CONNECTIONS: u32 = 10;

/// Helper harness backed by a private SQLite database.
///
/// `new` and `with_pricing` use an in-memory database behind a single
/// connection, so every transaction runs strictly after the previous one.
/// `on_disk` uses a database file in a scratch directory and a pool of
/// several connections, so concurrent calls contend for SQLite's locks.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub services: AppServices,
    pub provider: Arc<FakeCheckoutProvider>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pricing(Arc::new(Standard)).await
    }

    pub async fn with_pricing(pricing: Arc<dyn PricingStrategy>) -> Self {
        Self::build("sqlite::memory:".to_string(), 1, pricing, None).await
    }

    pub async fn on_disk() -> Self {
        Self::on_disk_with_pricing(Arc::new(Standard)).await
    }

    pub async fn on_disk_with_pricing(pricing: Arc<dyn PricingStrategy>) -> Self {
        let dir = tempfile::tempdir().expect("scratch directory");
        let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("petcare.db").display());
        Self::build(dsn, ON_DISK_CONNECTIONS, pricing, Some(dir)).await
    }

    async fn build(
        dsn: String,
        connections: u32,
        pricing: Arc<dyn PricingStrategy>,
        db_dir: Option<TempDir>,
    ) -> Self {
        let mut cfg = AppConfig::new(dsn, "127.0.0.1:50051".to_string(), "test".to_string());
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.checkout_checksum_key = CHECKSUM_KEY.to_string();
        cfg.checkout_return_url = "https://petcare.test/return".to_string();
        cfg.checkout_cancel_url = "https://petcare.test/cancel".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (tx, rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(rx));
        let event_sender = Arc::new(EventSender::new(tx));

        let provider = Arc::new(FakeCheckoutProvider::default());
        let services = AppServices::new(
            db.clone(),
            event_sender,
            pricing,
            provider.clone(),
            CheckoutUrls {
                return_url: cfg.checkout_return_url.clone(),
                cancel_url: cfg.checkout_cancel_url.clone(),
            },
        );

        Self {
            db,
            config: cfg,
            services,
            provider,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn router(&self) -> Router {
        petcare_api::http_router(AppState {
            db: self.db.clone(),
            config: Arc::new(self.config.clone()),
            payments: self.services.payments.clone(),
        })
    }

    pub async fn seed_service(&self, name: &str, price: Decimal) -> i32 {
        self.services
            .catalog
            .create_service(CreateServiceInput {
                name: name.to_string(),
                description: format!("{} for pets", name),
                price,
            })
            .await
            .expect("seed service")
            .id
    }

    pub async fn book(&self, customer_id: i32, items: &[(i32, i32)]) -> i32 {
        self.services
            .appointments
            .create_appointment(booking(customer_id, items))
            .await
            .expect("booking")
            .0
    }

    pub async fn create_payment(
        &self,
        target: SettlementTarget,
        amount: Decimal,
        method: PaymentMethod,
    ) -> i32 {
        self.services
            .payments
            .create_payment(CreatePaymentInput {
                target,
                amount,
                description: "Booking 17".to_string(),
                method,
            })
            .await
            .expect("create payment")
    }
}

pub fn booking(customer_id: i32, items: &[(i32, i32)]) -> CreateAppointmentInput {
    CreateAppointmentInput {
        customer_id,
        branch_id: 2,
        customer_address: "x".to_string(),
        scheduled_time: Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap(),
        items: items
            .iter()
            .map(|&(service_id, quantity)| RequestedItem {
                service_id,
                quantity,
            })
            .collect(),
        note: String::new(),
    }
}
