//! Pet-care back-end core.
//!
//! Books appointments against a service catalog (snapshotting prices at
//! booking time) and coordinates payments that settle them through hosted
//! checkout links. The gRPC services live in [`grpc`]; the HTTP side only
//! carries health probes and the checkout provider's webhook.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod checkout;
pub mod config;
pub mod db;
pub mod deadline;
pub mod entities;
pub mod errors;
pub mod events;
pub mod grpc;
pub mod handlers;
pub mod migrator;
pub mod proto;
pub mod server;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    checkout::CheckoutProvider,
    events::EventSender,
    services::{
        payments::CheckoutUrls, pricing::PricingStrategy, AppointmentService, CatalogService,
        PaymentService,
    },
};

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub payments: PaymentService,
}

/// The three core services, wired to one pool and one event channel.
#[derive(Clone)]
pub struct AppServices {
    pub appointments: AppointmentService,
    pub payments: PaymentService,
    pub catalog: CatalogService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: Arc<dyn PricingStrategy>,
        provider: Arc<dyn CheckoutProvider>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            appointments: AppointmentService::new(db.clone(), event_sender.clone(), pricing),
            payments: PaymentService::new(db.clone(), event_sender.clone(), provider, urls),
            catalog: CatalogService::new(db, event_sender),
        }
    }
}

/// Health probes and the checkout webhook.
pub fn http_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/status", get(handlers::health::status))
        .route(
            "/webhooks/checkout",
            post(handlers::checkout_webhooks::checkout_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT))
        .with_state(state)
}
