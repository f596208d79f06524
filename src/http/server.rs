//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the registry handlers
//! - Wire up middleware (request ID, tracing, timeout, optional rate limit)
//! - Bind server to listener
//! - Run the expiry sweeper and limiter purger beside the server
//! - Drain gracefully on shutdown

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::DiscoveryConfig;
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::registry::RegistryService;
use crate::security::rate_limit::{rate_limit_middleware, FixedWindowLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryService>,
}

/// Build the Axum router with all middleware layers.
///
/// `limiter`, when present, guards the `/registry` routes only.
#[allow(deprecated)]
pub fn build_router(
    config: &DiscoveryConfig,
    registry: Arc<RegistryService>,
    limiter: Option<Arc<FixedWindowLimiter>>,
) -> Router {
    let mut registry_routes = Router::new()
        .route("/registry", get(handlers::get_applications))
        .route(
            "/registry/{app_id}",
            post(handlers::register).get(handlers::get_application),
        )
        .route(
            "/registry/{app_id}/{instance_id}",
            put(handlers::heartbeat).delete(handlers::deregister),
        )
        .route("/registry/{app_id}/{instance_id}/status", put(handlers::set_status));

    if let Some(limiter) = limiter {
        registry_routes =
            registry_routes.route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    Router::new()
        .route("/health", get(handlers::health))
        .merge(registry_routes)
        .with_state(AppState { registry })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// HTTP server for the service registry.
pub struct RegistryServer {
    router: Router,
    config: DiscoveryConfig,
    registry: Arc<RegistryService>,
    limiter: Option<Arc<FixedWindowLimiter>>,
}

impl RegistryServer {
    /// Create a new server with the given configuration.
    pub fn new(config: DiscoveryConfig) -> Self {
        let registry = Arc::new(RegistryService::new(config.registry.clone()));
        Self::with_registry(config, registry)
    }

    /// Serve an existing registry, e.g. one a test wants to inspect directly.
    pub fn with_registry(config: DiscoveryConfig, registry: Arc<RegistryService>) -> Self {
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(FixedWindowLimiter::from_config(&config.rate_limit)));
        let router = build_router(&config, registry.clone(), limiter.clone());
        Self {
            router,
            config,
            registry,
            limiter,
        }
    }

    pub fn registry(&self) -> Arc<RegistryService> {
        self.registry.clone()
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener, until
    /// `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            sweep_interval_secs = self.config.registry.sweep_interval_secs,
            instance_ttl_secs = self.config.registry.instance_ttl_secs,
            rate_limited = self.limiter.is_some(),
            "Registry server starting"
        );

        let sweeper = tokio::spawn(self.registry.clone().run_sweeper(shutdown.subscribe()));
        let purger = self.limiter.clone().map(|limiter| {
            let interval = limiter.window();
            tokio::spawn(limiter.run_purger(interval, shutdown.subscribe()))
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(Shutdown::wait(shutdown.subscribe()))
            .await?;

        // Stop the background tasks too if serve ended on its own.
        shutdown.trigger();
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "Expiry sweeper task failed");
        }
        if let Some(purger) = purger {
            if let Err(e) = purger.await {
                tracing::error!(error = %e, "Rate-limit purger task failed");
            }
        }

        tracing::info!("Registry server stopped");
        Ok(())
    }
}
