// shipsync-services/src/order_client.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HOST};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::ServiceConfig;

/// The slice of an order the shipping service reads over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOrder {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Kept as text: the order service may report statuses this side does not model.
    pub status: String,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("order {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Unavailable(String),
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Read-only access to the order service.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn fetch_order(
        &self,
        order_id: i64,
        authorization: Option<&str>,
    ) -> Result<RemoteOrder, LookupError>;
}

#[derive(Clone)]
pub struct HttpOrderClient {
    client: Client,
    base_url: String,
    host_override: bool,
}

impl HttpOrderClient {
    /// `host_override` sends `Host: localhost`, which the service hosts expect
    /// outside production.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        host_override: bool,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            host_override,
        })
    }

    /// Client for the order service of the configured environment.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, LookupError> {
        Self::new(
            config.urls.order_service_url.clone(),
            config.http_timeout,
            config.environment.needs_host_override(),
        )
    }

    pub fn order_url(&self, order_id: i64) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), order_id)
    }
}

#[async_trait]
impl OrderLookup for HttpOrderClient {
    async fn fetch_order(
        &self,
        order_id: i64,
        authorization: Option<&str>,
    ) -> Result<RemoteOrder, LookupError> {
        let url = self.order_url(order_id);
        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if self.host_override {
            request = request.header(HOST, "localhost");
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(order_id, url = %url, error = %e, "order service request failed");
            LookupError::Unavailable(e.to_string())
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(LookupError::NotFound(order_id)),
            status if !status.is_success() => {
                tracing::warn!(order_id, status = status.as_u16(), "order service returned error");
                return Err(LookupError::UnexpectedStatus(status.as_u16()));
            }
            _ => {}
        }

        response.json::<RemoteOrder>().await.map_err(|e| {
            tracing::error!(order_id, error = %e, "invalid JSON from order service");
            LookupError::InvalidResponse(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_order_urls() {
        let client = HttpOrderClient::new(
            "http://order_service:8000/api/orders/",
            Duration::from_secs(5),
            true,
        )
        .unwrap();

        assert_eq!(
            client.order_url(42),
            "http://order_service:8000/api/orders/42/"
        );
    }

    #[test]
    fn development_config_targets_local_orders() {
        let config = ServiceConfig::from_lookup(|key| {
            (key == "ENVIRONMENT").then(|| "development".to_string())
        })
        .unwrap();
        let client = HttpOrderClient::from_config(&config).unwrap();

        assert_eq!(client.order_url(7), "http://localhost:8003/api/orders/7/");
        assert!(client.host_override);
    }

    #[test]
    fn tolerates_sparse_order_bodies() {
        let order: RemoteOrder =
            serde_json::from_str(r#"{"id": 101, "status": "confirmed"}"#).unwrap();

        assert_eq!(order.status, "confirmed");
        assert_eq!(order.user_id, None);
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let client =
            HttpOrderClient::new("http://127.0.0.1:9/api/orders/", Duration::from_secs(1), false)
                .unwrap();

        let err = client.fetch_order(1, None).await.unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
    }
}
