//! Shared utilities for integration testing.

use axum::{http::StatusCode, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use discovery_mesh::config::{DiscoveryConfig, ResilienceConfig};
use discovery_mesh::discovery::RegistryClient;
use discovery_mesh::lifecycle::Shutdown;
use discovery_mesh::registry::RegistryService;
use discovery_mesh::resilience::ResilientClient;
use discovery_mesh::RegistryServer;

/// A registry server bound to an ephemeral port.
#[allow(dead_code)]
pub struct TestRegistry {
    pub addr: SocketAddr,
    pub registry: Arc<RegistryService>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

#[allow(dead_code)]
impl TestRegistry {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Registry client with fast retries, suited to tests.
    pub fn client(&self) -> RegistryClient {
        self.client_with(ResilienceConfig {
            backoff_base_ms: 10,
            backoff_max_ms: 50,
            ..ResilienceConfig::default()
        })
    }

    pub fn client_with(&self, config: ResilienceConfig) -> RegistryClient {
        let resilience = ResilientClient::from_config("registry", &config);
        RegistryClient::with_http(&self.base_url(), resilience, http_client()).unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Start a registry server on 127.0.0.1 with the given config.
#[allow(dead_code)]
pub async fn start_registry(mut config: DiscoveryConfig) -> TestRegistry {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = RegistryServer::new(config);
    let registry = server.registry();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestRegistry {
        addr,
        registry,
        shutdown,
        handle,
    }
}

/// Non-pooled client that ignores proxy environment variables.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a programmable mock backend; each GET / answers with `f()`.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let f = Arc::new(f);
    let app = Router::new().route(
        "/",
        get(move || {
            let f = f.clone();
            async move {
                let (status, body) = f().await;
                (StatusCode::from_u16(status).unwrap_or(StatusCode::OK), body)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Poll `check` every 50ms until it holds or `deadline` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if check().await {
            return true;
        }
        if started.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
