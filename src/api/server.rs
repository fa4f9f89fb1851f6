//! API Server
//!
//! Server setup: middleware stack, background idempotency sweep, graceful
//! shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::WalletConfig;
use crate::ledger::applier::TransactionApplier;
use crate::ledger::idempotency::IdempotencyGuard;
use crate::ledger::store::LedgerStore;
use crate::providers::ProviderRegistry;
use crate::storage::Storage;
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: WalletConfig,
    storage: Storage,
}

impl ApiServer {
    pub fn new(config: WalletConfig, storage: Storage) -> Self {
        Self { config, storage }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "walletiq=info,tower_http=info".into()),
            )
            .init();

        info!("Starting walletiq seamless wallet API");

        let store = Arc::new(LedgerStore::new(self.storage.clone()));
        let guard = IdempotencyGuard::new(
            self.storage.clone(),
            self.config.idempotency_retention_ms(),
        );
        let applier = Arc::new(TransactionApplier::new(
            Arc::clone(&store),
            guard,
            self.config.ledger.max_apply_retries,
        ));

        // Separate guard handle for the background sweep; reservations are
        // shared through storage, not process memory
        let sweep_guard = Arc::new(IdempotencyGuard::new(
            self.storage.clone(),
            self.config.idempotency_retention_ms(),
        ));
        let sweep_interval = self.config.sweep_interval();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Utc::now().timestamp_millis();
                let guard = Arc::clone(&sweep_guard);
                match tokio::task::spawn_blocking(move || guard.sweep_expired(now)).await {
                    Ok(Ok(removed)) if removed > 0 => {
                        info!(removed, "expired idempotency records swept")
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "idempotency sweep failed"),
                    Err(e) => warn!(error = %e, "idempotency sweep task failed"),
                }
            }
        });

        let state = Arc::new(AppState {
            store,
            applier,
            providers: ProviderRegistry::from_table(&self.config.providers),
            admin_api_key: self.config.server.admin_api_key.clone(),
            callback_timeout: self.config.callback_timeout(),
            default_currency: self.config.ledger.default_currency.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let app = create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.server.allowed_origins.clone()))
            // Outer request timeout
            .layer(TimeoutLayer::new(self.config.request_timeout()))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from((
            self.config.server.host.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        ));

        info!("Listen: http://{}", addr);
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        sweeper.abort();
        info!("API server stopped gracefully");
        Ok(())
    }

    fn log_server_info(&self) {
        info!("Server configuration:");
        info!("   CORS: {:?}", self.config.server.allowed_origins);
        info!(
            "   Request timeout: {}s, callback bound: {}ms",
            self.config.server.request_timeout_secs, self.config.server.callback_timeout_ms
        );
        info!(
            "   Idempotency retention: {}h",
            self.config.idempotency.retention_hours
        );
        info!("Available endpoints:");
        info!("   GET  /health                              - Health check");
        info!("   POST /api/seamless/:provider              - Provider callbacks");
        info!("   POST /api/admin/wallets                   - Provision wallet");
        info!("   GET  /api/admin/wallets/:user_id          - Wallet snapshot");
        info!("   POST /api/admin/wallets/:user_id/adjust   - Balance adjustment");
        info!("   POST /api/admin/wallets/:user_id/freeze   - Freeze wallet");
        info!("   POST /api/admin/wallets/:user_id/unfreeze - Unfreeze wallet");
        info!("   POST /api/admin/rollback                  - Rollback entry");
        info!("   GET  /api/admin/audit                     - Audit trail");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
