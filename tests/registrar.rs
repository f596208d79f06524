//! Self-registration against a live registry.

use std::time::Duration;

use discovery_mesh::config::{DiscoveryConfig, ResilienceConfig};
use discovery_mesh::discovery::{Registrar, RoundRobin};
use discovery_mesh::lifecycle::Shutdown;
use discovery_mesh::registry::{InstanceStatus, RegisterRequest};
use discovery_mesh::resilience::{CircuitState, ResilienceError};

mod common;

fn request(instance_id: Option<&str>, port: u16) -> RegisterRequest {
    RegisterRequest {
        instance_id: instance_id.map(str::to_string),
        host_name: "order".into(),
        ip_addr: "127.0.0.1".into(),
        port,
        status: None,
    }
}

#[tokio::test]
async fn test_registrar_lifecycle() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let registrar = Registrar::new(
        server.client(),
        "ORDER-SERVICE",
        request(None, 3001),
        Duration::from_millis(100),
    );
    let instance_id = registrar.instance_id().to_string();

    let agent_shutdown = Shutdown::new();
    let agent = registrar.spawn(agent_shutdown.subscribe());

    let registry = server.registry.clone();
    let registered = common::eventually(Duration::from_secs(3), || {
        let registry = registry.clone();
        let instance_id = instance_id.clone();
        async move {
            registry
                .list_instances("ORDER-SERVICE")
                .map_or(false, |instances| instances.iter().any(|i| i.instance_id == instance_id))
        }
    })
    .await;
    assert!(registered, "registrar never registered");

    // Simulate eviction; the next heartbeat reports renewed=false.
    server.registry.deregister("ORDER-SERVICE", &instance_id);
    let reregistered = common::eventually(Duration::from_secs(3), || {
        let registry = registry.clone();
        async move { registry.list_instances("ORDER-SERVICE").is_ok() }
    })
    .await;
    assert!(reregistered, "registrar did not re-register after eviction");
    assert_eq!(
        server.registry.list_instances("ORDER-SERVICE").unwrap()[0].instance_id,
        instance_id
    );

    agent_shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), agent).await.unwrap().unwrap();
    assert!(outcome.is_ok(), "deregistration failed: {:?}", outcome);
    assert!(server.registry.list_instances("ORDER-SERVICE").is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_client_discovers_up_instances() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = server.client();

    assert_eq!(client.health().await.unwrap(), "UP");

    for (id, port) in [("order-1", 3001), ("order-2", 3002), ("order-3", 3003)] {
        let stored = client.register("ORDER-SERVICE", &request(Some(id), port)).await.unwrap();
        assert_eq!(stored, id);
    }
    client
        .set_status("ORDER-SERVICE", "order-2", InstanceStatus::Down)
        .await
        .unwrap();

    let balancer = RoundRobin::new();
    let mut picks = Vec::new();
    for _ in 0..4 {
        let instance = client.resolve("ORDER-SERVICE", &balancer).await.unwrap().unwrap();
        picks.push(instance.instance_id);
    }
    assert!(picks.iter().all(|id| id != "order-2"));
    assert!(picks.contains(&"order-1".to_string()));
    assert!(picks.contains(&"order-3".to_string()));

    assert!(client.heartbeat("ORDER-SERVICE", "order-1").await.unwrap());
    assert!(!client.heartbeat("ORDER-SERVICE", "order-9").await.unwrap());

    let err = client.instances("BILLING-SERVICE").await.unwrap_err();
    assert_eq!(err.attempts(), 1, "404 must not be retried");
    assert!(err.to_string().contains("BILLING-SERVICE"));

    let apps = client.applications().await.unwrap();
    assert_eq!(apps.applications.len(), 1);
    assert_eq!(apps.applications[0].instances.len(), 3);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_application_lookups_keep_breaker_closed() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = server.client();

    client.register("ORDER-SERVICE", &request(Some("order-1"), 3001)).await.unwrap();

    // A peer that has not registered yet answers 404 on every lookup.
    for _ in 0..6 {
        let err = client.instances("PAYMENT-SERVICE").await.unwrap_err();
        assert!(err.upstream().is_some(), "unexpected error: {}", err);
    }
    let err = client
        .set_status("ORDER-SERVICE", "order-9", InstanceStatus::Down)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("order-9"));

    assert_eq!(client.resilience().breaker().state(), CircuitState::Closed);
    assert!(client.heartbeat("ORDER-SERVICE", "order-1").await.unwrap());

    server.stop().await;
}

#[tokio::test]
async fn test_lookups_cannot_starve_heartbeats() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = server.client_with(ResilienceConfig {
        backoff_base_ms: 10,
        backoff_max_ms: 50,
        rate_limit_max: 3,
        ..ResilienceConfig::default()
    });

    client.register("ORDER-SERVICE", &request(Some("order-1"), 3001)).await.unwrap();

    for _ in 0..3 {
        client.instances("ORDER-SERVICE").await.unwrap();
    }
    let err = client.instances("ORDER-SERVICE").await.unwrap_err();
    assert!(matches!(err, ResilienceError::RateLimited { ref key } if key == "registry:query"));

    assert!(client.heartbeat("ORDER-SERVICE", "order-1").await.unwrap());
    assert!(client.heartbeat("ORDER-SERVICE", "order-1").await.unwrap());

    server.stop().await;
}
