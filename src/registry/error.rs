//! Registry error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Application {app_id} not found")]
    NotFound { app_id: String },

    #[error("Instance {instance_id} of application {app_id} not found")]
    InstanceNotFound { app_id: String, instance_id: String },
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::NOT_FOUND, body).into_response()
    }
}
