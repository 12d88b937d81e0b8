//! Storefront API server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_sessions::MemoryStore as MemorySessionStore;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::config::{Config, LogFormat};
use storefront::events::EventBus;
use storefront::integrations::{
    CloudinaryClient, CurrencyConverter, HttpRateSource, ImageHost, LogMailer, Mailer, PaymentGateway,
    RazorpayClient, ShippingProvider, ShiprocketClient, SmtpMailer,
};
use storefront::services::orders::spawn_shipment_refresher;
use storefront::store::{DocumentStore, MemoryStore, PgStore};
use storefront::{AppState, Services, router};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    tracing::info!(addr = %config.socket_addr(), "Starting storefront");

    let pg = match &config.database_url {
        Some(url) => Some(PgStore::connect(url).await.context("Failed to connect to PostgreSQL")?),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            None
        }
    };
    let store: Arc<dyn DocumentStore> = match &pg {
        Some(pg) => Arc::new(pg.clone()),
        None => Arc::new(MemoryStore::new()),
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events stay in process");
                None
            }
        },
        None => None,
    };

    let services = Services {
        store,
        payments: config
            .razorpay
            .as_ref()
            .map(RazorpayClient::new)
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn PaymentGateway>),
        shipping: config
            .shiprocket
            .as_ref()
            .map(ShiprocketClient::new)
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn ShippingProvider>),
        images: config
            .cloudinary
            .as_ref()
            .map(CloudinaryClient::new)
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn ImageHost>),
        mailer: match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?) as Arc<dyn Mailer>,
            None => Arc::new(LogMailer),
        },
        currency: CurrencyConverter::new(Arc::new(HttpRateSource::new(&config.currency_api_url)?)),
        events: EventBus::new(nats),
    };
    for (name, configured) in [
        ("payments", config.razorpay.is_some()),
        ("shipping", config.shiprocket.is_some()),
        ("image uploads", config.cloudinary.is_some()),
        ("smtp", config.smtp.is_some()),
    ] {
        if !configured {
            tracing::warn!(integration = name, "Not configured");
        }
    }

    let addr = config.socket_addr();
    let refresh_every = config.commerce.shipment_refresh;
    let state = AppState::new(config, services);

    let refresher = refresh_every.map(|every| spawn_shipment_refresher(state.clone(), every));
    let shutdown = state.shutdown().clone();

    let app = match pg {
        Some(pg) => {
            let sessions = PostgresStore::new(pg.pool().clone());
            sessions.migrate().await.context("Failed to migrate session store")?;
            router(state, sessions)
        }
        None => router(state, MemorySessionStore::default()),
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Storefront listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends open event streams so in-flight connections can drain.
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    if let Some(refresher) = refresher {
        refresher.abort();
    }
    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront=info,tower_http=info".into());
    let json_layer = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (format == LogFormat::Pretty).then(tracing_subscriber::fmt::layer);
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
