//! End-to-end tests of the registry HTTP API.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use discovery_mesh::config::DiscoveryConfig;

mod common;

#[tokio::test]
async fn test_register_query_deregister() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = common::http_client();

    let res = client
        .post(server.url("/registry/ORDER-SERVICE"))
        .json(&json!({ "instanceId": "order-1", "hostName": "order", "ipAddr": "10.0.0.5", "port": 3001 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["location"], "/registry/ORDER-SERVICE/order-1");

    let body: Value = client
        .get(server.url("/registry/ORDER-SERVICE"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["name"], "ORDER-SERVICE");
    let instance = &body["instances"][0];
    assert_eq!(instance["instanceId"], "order-1");
    assert_eq!(instance["appId"], "ORDER-SERVICE");
    assert_eq!(instance["status"], "UP");
    assert!(instance["lastHeartbeat"].as_u64().is_some());

    let res = client
        .delete(server.url("/registry/ORDER-SERVICE/order-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/registry/ORDER-SERVICE")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Application ORDER-SERVICE not found" }));

    let all: Value = client.get(server.url("/registry")).send().await.unwrap().json().await.unwrap();
    assert_eq!(all, json!({ "applications": [] }));

    server.stop().await;
}

#[tokio::test]
async fn test_reregistration_keeps_single_entry() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = common::http_client();

    for (host, port) in [("order-a", 3001), ("order-b", 4001)] {
        let res = client
            .post(server.url("/registry/ORDER-SERVICE"))
            .json(&json!({ "instanceId": "order-1", "hostName": host, "ipAddr": "10.0.0.5", "port": port }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    let instances = server.registry.list_instances("ORDER-SERVICE").unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].host_name, "order-b");
    assert_eq!(instances[0].port, 4001);

    server.stop().await;
}

#[tokio::test]
async fn test_heartbeat_for_unknown_instance_is_noop() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = common::http_client();

    let res = client
        .put(server.url("/registry/GHOST-SERVICE/ghost-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack, json!({ "renewed": false }));

    let res = client.get(server.url("/registry/GHOST-SERVICE")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_silent_instance_is_evicted() {
    let mut config = DiscoveryConfig::default();
    config.registry.instance_ttl_secs = 1;
    config.registry.sweep_interval_secs = 1;
    config.registry.heartbeat_interval_secs = 1;
    let server = common::start_registry(config).await;
    let client = common::http_client();

    for id in ["silent", "chatty"] {
        client
            .post(server.url("/registry/PAYMENT-SERVICE"))
            .json(&json!({ "instanceId": id, "hostName": id, "ipAddr": "10.0.0.7", "port": 3003 }))
            .send()
            .await
            .unwrap();
    }

    // "chatty" heartbeats well inside the TTL; "silent" never does.
    let registry = server.registry.clone();
    let evicted = common::eventually(Duration::from_secs(6), || {
        let client = client.clone();
        let url = server.url("/registry/PAYMENT-SERVICE/chatty");
        let registry = registry.clone();
        async move {
            client.put(url).send().await.unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
            registry.list_instances("PAYMENT-SERVICE").map_or(false, |instances| {
                instances.iter().all(|i| i.instance_id != "silent")
            })
        }
    })
    .await;
    assert!(evicted, "silent instance was never evicted");

    let instances = server.registry.list_instances("PAYMENT-SERVICE").unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].instance_id, "chatty");

    server.stop().await;
}

#[tokio::test]
async fn test_status_update() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = common::http_client();

    client
        .post(server.url("/registry/USER-SERVICE"))
        .json(&json!({ "instanceId": "user-1", "hostName": "user", "ipAddr": "10.0.0.6", "port": 3002 }))
        .send()
        .await
        .unwrap();

    let res = client
        .put(server.url("/registry/USER-SERVICE/user-1/status"))
        .json(&json!({ "status": "DOWN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .put(server.url("/registry/USER-SERVICE/user-9/status"))
        .json(&json!({ "status": "DOWN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let instances = server.registry.list_instances("USER-SERVICE").unwrap();
    assert!(!instances[0].is_up());

    server.stop().await;
}

#[tokio::test]
async fn test_inbound_rate_limit() {
    let mut config = DiscoveryConfig::default();
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 2;
    config.rate_limit.window_ms = 60_000;
    let server = common::start_registry(config).await;
    let client = common::http_client();

    for _ in 0..2 {
        let res = client.get(server.url("/registry")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client.get(server.url("/registry")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["ratelimit-limit"], "2");
    assert_eq!(res.headers()["ratelimit-remaining"], "0");
    assert!(res.headers().contains_key("retry-after"));

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_registrations() {
    let server = common::start_registry(DiscoveryConfig::default()).await;
    let client = common::http_client();

    let mut tasks = Vec::new();
    for i in 0..24 {
        let client = client.clone();
        let register_url = server.url("/registry/INVENTORY-SERVICE");
        let instance_url = server.url(&format!("/registry/INVENTORY-SERVICE/inv-{}", i));
        tasks.push(tokio::spawn(async move {
            let res = client
                .post(register_url)
                .json(&json!({ "instanceId": format!("inv-{}", i), "hostName": "inv", "ipAddr": "10.0.1.1", "port": 5000 + i }))
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NO_CONTENT);

            client.put(&instance_url).send().await.unwrap();
            if i % 3 == 0 {
                client.delete(&instance_url).send().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let instances = server.registry.list_instances("INVENTORY-SERVICE").unwrap();
    assert_eq!(instances.len(), 16);
    assert!(instances.iter().all(|i| i.instance_id.trim_start_matches("inv-").parse::<u32>().unwrap() % 3 != 0));

    server.stop().await;
}
