//! Registration client: maps the local identity to a subscriber record

use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};
use udpu_shared::{pubsub, timing, SubscriberRecord};

use crate::backoff::Backoff;
use crate::discovery::Endpoint;
use crate::error::{AgentError, AgentResult};

/// Configuration for the registration client
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Bound on the whole registration request
    pub request_timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(timing::REGISTRATION_TIMEOUT_MS),
        }
    }
}

/// One-shot HTTP exchange with the control plane
pub struct RegistrationClient {
    client: Client,
}

impl RegistrationClient {
    pub fn new(config: RegistrationConfig) -> AgentResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client })
    }

    /// Fetch this device's subscriber record.
    ///
    /// An empty `subscriber_uid` is returned as-is; callers decide whether
    /// the record is usable via [`SubscriberRecord::is_assigned`].
    pub async fn register(
        &self,
        endpoint: &Endpoint,
        identity: &str,
    ) -> AgentResult<SubscriberRecord> {
        let url = endpoint.http_url(&pubsub::registration_path(identity));

        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(|e| AgentError::Decode(e.to_string()))
    }

    /// Register, retrying with the backoff policy until an id is assigned
    pub async fn register_until_assigned(
        &self,
        endpoint: &Endpoint,
        identity: &str,
        backoff: &mut dyn Backoff,
    ) -> SubscriberRecord {
        loop {
            info!("Trying to get uDPU object from server {}", endpoint);
            match self.register(endpoint, identity).await {
                Ok(record) if record.is_assigned() => {
                    info!(
                        subscriber_uid = %record.subscriber_uid,
                        role = %record.role,
                        location = %record.location,
                        "Registered"
                    );
                    backoff.reset();
                    return record;
                }
                Ok(_) => warn!("Server has no subscriber id for {} yet", identity),
                Err(e) => warn!("Registration failed: {}", e),
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ConstantBackoff;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MAC: &str = "00:1B:44:11:3A:18";

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn endpoint(addr: SocketAddr) -> Endpoint {
        Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            service_class: "server".into(),
        }
    }

    fn fast_client() -> RegistrationClient {
        RegistrationClient::new(RegistrationConfig {
            request_timeout: Duration::from_millis(500),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_decodes_record() {
        let addr = serve(Router::new().route(
            "/api/v1.0/adapter/{identity}/udpu",
            get(|Path(identity): Path<String>| async move {
                Json(json!({
                    "subscriber_uid": "sub-42",
                    "location": "rack-3",
                    "mac_address": identity,
                    "role": "edge",
                    "upstream_qos": "10",
                    "downstream_qos": "100",
                    "hostname": "udpu-1"
                }))
            }),
        ))
        .await;

        let record = fast_client().register(&endpoint(addr), MAC).await.unwrap();
        assert_eq!(record.subscriber_uid, "sub-42");
        assert_eq!(record.mac_address, MAC);
        assert_eq!(record.downstream_qos, "100");
    }

    #[tokio::test]
    async fn test_register_malformed_body_is_decode_error() {
        let addr = serve(Router::new().route(
            "/api/v1.0/adapter/{identity}/udpu",
            get(|| async { "<html>oops</html>" }),
        ))
        .await;

        let result = fast_client().register(&endpoint(addr), MAC).await;
        assert!(matches!(result, Err(AgentError::Decode(_))));
    }

    #[tokio::test]
    async fn test_register_error_status_is_transport_error() {
        let addr = serve(Router::new().route(
            "/api/v1.0/adapter/{identity}/udpu",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;

        let result = fast_client().register(&endpoint(addr), MAC).await;
        assert!(matches!(result, Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    async fn test_register_unreachable_is_transport_error() {
        let ep = Endpoint {
            host: "127.0.0.1".into(),
            port: 1,
            service_class: "server".into(),
        };
        let result = fast_client().register(&ep, MAC).await;
        assert!(matches!(result, Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_subscriber_id_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let addr = serve(Router::new().route(
            "/api/v1.0/adapter/{identity}/udpu",
            get(move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => StatusCode::BAD_GATEWAY.into_response(),
                        1 => Json(json!({"subscriber_uid": ""})).into_response(),
                        _ => Json(json!({"subscriber_uid": "sub-7", "role": "edge"}))
                            .into_response(),
                    }
                }
            }),
        ))
        .await;

        let mut backoff = ConstantBackoff::new(Duration::from_millis(10));
        let record = fast_client()
            .register_until_assigned(&endpoint(addr), MAC, &mut backoff)
            .await;

        assert_eq!(record.subscriber_uid, "sub-7");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
