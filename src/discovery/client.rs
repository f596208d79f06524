//! Typed HTTP client for the registry API.
//!
//! Every request goes through a [`ResilientClient`], so a registry outage
//! trips the breaker instead of stalling each caller for the full retry
//! schedule. Lookups and liveness traffic (register, heartbeat, deregister,
//! status) are charged to separate limiter keys, and definitive client-error
//! answers such as 404 complete the breaker call as a success.

use reqwest::{header::LOCATION, Method, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::ResilienceConfig;
use crate::discovery::balancer::RoundRobin;
use crate::registry::{
    Application, Applications, HeartbeatAck, InstanceStatus, RegisterRequest, ServiceInstance,
    StatusUpdate,
};
use crate::resilience::{is_retry_safe, is_retryable, ResilienceError, ResilientClient, Transient};

#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    #[error("invalid registry url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("registry url cannot take a path: {0}")]
    NotABase(String),

    #[error("request to registry failed: {source}")]
    Transport {
        retry_safe: bool,
        #[source]
        source: reqwest::Error,
    },

    #[error("registry answered {status}")]
    Status { status: StatusCode, retry_safe: bool },

    #[error("{0} not found")]
    NotFound(String),

    #[error("registry response has no Location header")]
    MissingLocation,
}

impl Transient for RegistryClientError {
    fn is_transient(&self) -> bool {
        match self {
            RegistryClientError::Transport { retry_safe, source } => {
                !source.is_decode() && !source.is_builder() && is_retryable(None, *retry_safe)
            }
            RegistryClientError::Status { status, retry_safe } => is_retryable(Some(*status), *retry_safe),
            _ => false,
        }
    }
}

impl RegistryClientError {
    /// The registry answered and the answer is final; its health is not in doubt.
    pub fn is_definitive(&self) -> bool {
        match self {
            RegistryClientError::NotFound(_) => true,
            RegistryClientError::Status { status, .. } => {
                status.is_client_error()
                    && *status != StatusCode::REQUEST_TIMEOUT
                    && *status != StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ResilienceError<RegistryClientError>>;

/// Limiter key suffixes for the two classes of registry traffic.
const QUERY_CLASS: &str = "query";
const LIVENESS_CLASS: &str = "liveness";

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base: Url,
    resilience: ResilientClient,
    query_key: String,
    liveness_key: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, config: &ResilienceConfig) -> Result<Self, RegistryClientError> {
        let resilience = ResilientClient::from_config("registry", config);
        Self::with_resilience(base_url, resilience)
    }

    pub fn with_resilience(base_url: &str, resilience: ResilientClient) -> Result<Self, RegistryClientError> {
        Self::with_http(base_url, resilience, reqwest::Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (proxy settings, TLS, pooling).
    pub fn with_http(
        base_url: &str,
        resilience: ResilientClient,
        http: reqwest::Client,
    ) -> Result<Self, RegistryClientError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(RegistryClientError::NotABase(base_url.to_string()));
        }
        let query_key = format!("{}:{}", resilience.name(), QUERY_CLASS);
        let liveness_key = format!("{}:{}", resilience.name(), LIVENESS_CLASS);
        Ok(Self {
            http,
            base,
            resilience,
            query_key,
            liveness_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn resilience(&self) -> &ResilientClient {
        &self.resilience
    }

    /// Limiter key charged by `instances`, `applications`, `health` and `resolve`.
    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    /// Limiter key charged by `register`, `heartbeat`, `deregister` and `set_status`.
    pub fn liveness_key(&self) -> &str {
        &self.liveness_key
    }

    /// Register an instance and return the id the registry stored.
    ///
    /// Only retried when the request names its instance id, since the
    /// registry then treats it as an upsert.
    pub async fn register(&self, app_id: &str, request: &RegisterRequest) -> ClientResult<String> {
        let url = self.endpoint(&["registry", app_id]);
        let retry_safe = is_retry_safe(
            &Method::POST,
            request.instance_id.as_deref().is_some_and(|id| !id.is_empty()),
        );
        let http = &self.http;
        let url = &url;

        self.call(&self.liveness_key, move || async move {
            let response = http
                .post(url.clone())
                .json(request)
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe, source })?;
            let response = ensure_success(response, retry_safe)?;
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| location.rsplit('/').next())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or(RegistryClientError::MissingLocation)
        })
        .await
    }

    /// Returns false when the registry no longer knows the instance.
    pub async fn heartbeat(&self, app_id: &str, instance_id: &str) -> ClientResult<bool> {
        let url = self.endpoint(&["registry", app_id, instance_id]);
        let http = &self.http;
        let url = &url;

        self.call(&self.liveness_key, move || async move {
            let response = http
                .put(url.clone())
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            let ack: HeartbeatAck = ensure_success(response, true)?
                .json()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            Ok(ack.renewed)
        })
        .await
    }

    pub async fn deregister(&self, app_id: &str, instance_id: &str) -> ClientResult<()> {
        let url = self.endpoint(&["registry", app_id, instance_id]);
        let http = &self.http;
        let url = &url;

        self.call(&self.liveness_key, move || async move {
            let response = http
                .delete(url.clone())
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            ensure_success(response, true)?;
            Ok(())
        })
        .await
    }

    pub async fn set_status(&self, app_id: &str, instance_id: &str, status: InstanceStatus) -> ClientResult<()> {
        let url = self.endpoint(&["registry", app_id, instance_id, "status"]);
        let http = &self.http;
        let url = &url;
        let body = StatusUpdate { status };

        self.call(&self.liveness_key, move || async move {
            let response = http
                .put(url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(RegistryClientError::NotFound(format!(
                    "Instance {} of application {}",
                    instance_id, app_id
                )));
            }
            ensure_success(response, true)?;
            Ok(())
        })
        .await
    }

    /// Instances of one application, ordered by instance id.
    pub async fn instances(&self, app_id: &str) -> ClientResult<Vec<ServiceInstance>> {
        let url = self.endpoint(&["registry", app_id]);
        let http = &self.http;
        let url = &url;

        self.call(&self.query_key, move || async move {
            let response = http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(RegistryClientError::NotFound(format!("Application {}", app_id)));
            }
            let application: Application = ensure_success(response, true)?
                .json()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            Ok(application.instances)
        })
        .await
    }

    pub async fn applications(&self) -> ClientResult<Applications> {
        let url = self.endpoint(&["registry"]);
        self.get_json(&url).await
    }

    /// The registry's own health status, `"UP"` when healthy.
    pub async fn health(&self) -> ClientResult<String> {
        let url = self.endpoint(&["health"]);
        let body: HealthBody = self.get_json(&url).await?;
        Ok(body.status)
    }

    /// Pick the next UP instance of `app_id`, or `None` if all are down.
    pub async fn resolve(&self, app_id: &str, balancer: &RoundRobin) -> ClientResult<Option<ServiceInstance>> {
        let instances = self.instances(app_id).await?;
        Ok(balancer.next_instance(&instances).cloned())
    }

    async fn get_json<T>(&self, url: &Url) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let http = &self.http;
        self.call(&self.query_key, move || async move {
            let response = http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })?;
            ensure_success(response, true)?
                .json()
                .await
                .map_err(|source| RegistryClientError::Transport { retry_safe: true, source })
        })
        .await
    }

    async fn call<F, Fut, T>(&self, key: &str, op: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RegistryClientError>>,
    {
        let op = &op;
        // Definitive answers leave the breaker as successes and are unwrapped below.
        let outcome = self
            .resilience
            .call(key, move || async move {
                match op().await {
                    Err(e) if e.is_definitive() => Ok(Err(e)),
                    other => other.map(Ok),
                }
            })
            .await?;
        outcome.map_err(ResilienceError::Upstream)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in the constructor.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn ensure_success(response: Response, retry_safe: bool) -> Result<Response, RegistryClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RegistryClientError::Status { status, retry_safe })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = RegistryClient::new("http://localhost:8761/", &ResilienceConfig::default()).unwrap();
        assert_eq!(
            client.endpoint(&["registry", "ORDER SERVICE", "a/b"]).as_str(),
            "http://localhost:8761/registry/ORDER%20SERVICE/a%2Fb"
        );

        let prefixed = RegistryClient::new("http://localhost:8761/eureka", &ResilienceConfig::default()).unwrap();
        assert_eq!(prefixed.endpoint(&["health"]).as_str(), "http://localhost:8761/eureka/health");
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(matches!(
            RegistryClient::new("mailto:ops@example.com", &ResilienceConfig::default()),
            Err(RegistryClientError::NotABase(_))
        ));
        assert!(matches!(
            RegistryClient::new("not a url", &ResilienceConfig::default()),
            Err(RegistryClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_status_errors_classify() {
        let unavailable = RegistryClientError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            retry_safe: true,
        };
        assert!(unavailable.is_transient());

        let unsafe_post = RegistryClientError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            retry_safe: false,
        };
        assert!(!unsafe_post.is_transient());

        let bad_request = RegistryClientError::Status {
            status: StatusCode::BAD_REQUEST,
            retry_safe: true,
        };
        assert!(!bad_request.is_transient());
        assert!(!RegistryClientError::NotFound("Application X".into()).is_transient());
    }

    #[test]
    fn test_definitive_answers() {
        assert!(RegistryClientError::NotFound("Application X".into()).is_definitive());
        for (status, definitive) in [
            (StatusCode::BAD_REQUEST, true),
            (StatusCode::NOT_FOUND, true),
            (StatusCode::CONFLICT, true),
            (StatusCode::REQUEST_TIMEOUT, false),
            (StatusCode::TOO_MANY_REQUESTS, false),
            (StatusCode::INTERNAL_SERVER_ERROR, false),
            (StatusCode::SERVICE_UNAVAILABLE, false),
        ] {
            let err = RegistryClientError::Status { status, retry_safe: true };
            assert_eq!(err.is_definitive(), definitive, "{}", status);
        }
        assert!(!RegistryClientError::MissingLocation.is_definitive());
    }

    #[test]
    fn test_operation_classes_use_separate_keys() {
        let client = RegistryClient::new("http://localhost:8761", &ResilienceConfig::default()).unwrap();
        assert_eq!(client.query_key(), "registry:query");
        assert_eq!(client.liveness_key(), "registry:liveness");
    }
}
