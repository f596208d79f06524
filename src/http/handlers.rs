//! Registry route handlers.
//!
//! Thin adapters between axum extractors and [`RegistryService`]; all
//! registry semantics live in the service.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::server::AppState;
use crate::registry::{
    Application, Applications, HeartbeatAck, RegisterRequest, RegistryError, StatusUpdate,
};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

pub async fn register(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let instance_id = state.registry.register(&app_id, request);
    let location = format!("/registry/{}/{}", app_id, instance_id);
    (StatusCode::NO_CONTENT, [(header::LOCATION, location)]).into_response()
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path((app_id, instance_id)): Path<(String, String)>,
) -> Json<HeartbeatAck> {
    let renewed = state.registry.heartbeat(&app_id, &instance_id);
    Json(HeartbeatAck { renewed })
}

pub async fn set_status(
    State(state): State<AppState>,
    Path((app_id, instance_id)): Path<(String, String)>,
    Json(update): Json<StatusUpdate>,
) -> Result<StatusCode, RegistryError> {
    state.registry.set_status(&app_id, &instance_id, update.status)?;
    Ok(StatusCode::OK)
}

pub async fn deregister(
    State(state): State<AppState>,
    Path((app_id, instance_id)): Path<(String, String)>,
) -> StatusCode {
    state.registry.deregister(&app_id, &instance_id);
    StatusCode::OK
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<Application>, RegistryError> {
    let instances = state.registry.list_instances(&app_id)?;
    Ok(Json(Application {
        name: app_id,
        instances,
    }))
}

pub async fn get_applications(State(state): State<AppState>) -> Json<Applications> {
    let applications = state
        .registry
        .list_all()
        .into_iter()
        .map(|(name, instances)| Application { name, instances })
        .collect();
    Json(Applications { applications })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::DiscoveryConfig;
    use crate::http::server::build_router;
    use crate::registry::RegistryService;

    fn app() -> (Router, Arc<RegistryService>) {
        let config = DiscoveryConfig::default();
        let registry = Arc::new(RegistryService::new(config.registry.clone()));
        (build_router(&config, registry.clone(), None), registry)
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let response = app.oneshot(empty_request(Method::GET, "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "UP" }));
    }

    #[tokio::test]
    async fn test_register_returns_location() {
        let (app, registry) = app();
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/registry/ORDER-SERVICE",
                json!({ "instanceId": "order-1", "hostName": "order", "ipAddr": "10.0.0.5", "port": 3001 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::LOCATION], "/registry/ORDER-SERVICE/order-1");
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(registry.list_instances("ORDER-SERVICE").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_generates_instance_id() {
        let (app, registry) = app();
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/registry/USER-SERVICE",
                json!({ "hostName": "user", "ipAddr": "10.0.0.6", "port": 3002 }),
            ))
            .await
            .unwrap();

        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        let instances = registry.list_instances("USER-SERVICE").unwrap();
        assert_eq!(location, format!("/registry/USER-SERVICE/{}", instances[0].instance_id));
    }

    #[tokio::test]
    async fn test_unknown_application_is_404() {
        let (app, _) = app();
        let response = app
            .oneshot(empty_request(Method::GET, "/registry/NOPE"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "error": "Application NOPE not found" }));
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_instance_is_not_renewed() {
        let (app, registry) = app();
        let response = app
            .oneshot(empty_request(Method::PUT, "/registry/GHOST/ghost-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "renewed": false }));
        assert_eq!(registry.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_status_update_and_listing() {
        let (app, registry) = app();
        registry.register(
            "ORDER-SERVICE",
            RegisterRequest {
                instance_id: Some("order-1".into()),
                host_name: "order".into(),
                ip_addr: "10.0.0.5".into(),
                port: 3001,
                status: None,
            },
        );

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/registry/ORDER-SERVICE/order-1/status",
                json!({ "status": "DOWN" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/registry/ORDER-SERVICE/order-9/status",
                json!({ "status": "DOWN" }),
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let listing = app.oneshot(empty_request(Method::GET, "/registry")).await.unwrap();
        let body = body_json(listing).await;
        assert_eq!(body["applications"][0]["name"], "ORDER-SERVICE");
        assert_eq!(body["applications"][0]["instances"][0]["status"], "DOWN");
    }

    #[tokio::test]
    async fn test_deregister_prunes_application() {
        let (app, registry) = app();
        registry.register(
            "ORDER-SERVICE",
            RegisterRequest {
                instance_id: Some("order-1".into()),
                host_name: "order".into(),
                ip_addr: "10.0.0.5".into(),
                port: 3001,
                status: None,
            },
        );

        let response = app
            .clone()
            .oneshot(empty_request(Method::DELETE, "/registry/ORDER-SERVICE/order-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(empty_request(Method::GET, "/registry/ORDER-SERVICE"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
