use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{
    signal,
    sync::{mpsc, watch},
};
use tracing::{error, info};

use petcare_api as api;

use api::{
    checkout::{CheckoutProvider, PayOsClient, PayOsConfig},
    events::EventSender,
    services::{payments::CheckoutUrls, pricing::strategy_from_config},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    info!(
        environment = %cfg.environment,
        git_hash = env!("GIT_HASH"),
        "Starting petcare-api {}",
        env!("CARGO_PKG_VERSION")
    );

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Build services
    let pricing = strategy_from_config(&cfg)?;
    info!(strategy = pricing.name(), "Pricing strategy selected");
    let provider: Arc<dyn CheckoutProvider> = Arc::new(PayOsClient::new(PayOsConfig::from(&cfg))?);
    let urls = CheckoutUrls {
        return_url: cfg.checkout_return_url.clone(),
        cancel_url: cfg.checkout_cancel_url.clone(),
    };
    let services = api::AppServices::new(db.clone(), event_sender, pricing, provider, urls);

    let rpc_addr: SocketAddr = cfg
        .rpc_listen_address
        .parse()
        .with_context(|| format!("invalid rpc_listen_address '{}'", cfg.rpc_listen_address))?;
    let http_addr: SocketAddr = cfg
        .http_listen_address
        .parse()
        .with_context(|| format!("invalid http_listen_address '{}'", cfg.http_listen_address))?;

    let app = api::http_router(api::AppState {
        db: db.clone(),
        config: Arc::new(cfg.clone()),
        payments: services.payments.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let grpc = tokio::spawn(api::grpc::serve(
        rpc_addr,
        services.appointments.clone(),
        services.payments.clone(),
        services.catalog.clone(),
        api::server::stopped(shutdown_rx.clone()),
    ));

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;
    info!("HTTP server listening on http://{}", http_addr);
    let http = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(api::server::stopped(shutdown_rx))
            .await
    });

    api::server::supervise(grpc, http, shutdown_signal(), shutdown_tx).await?;

    drop(services);
    if let Ok(pool) = Arc::try_unwrap(db) {
        api::db::close_pool(pool).await?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
