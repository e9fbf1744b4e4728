use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Health of one model endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub online: bool,
    pub model_loaded: bool,
}

impl EndpointStatus {
    pub const OFFLINE: EndpointStatus = EndpointStatus {
        online: false,
        model_loaded: false,
    };
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    model_loaded: bool,
}

/// Checks `GET {url}/health` on model endpoints with a short timeout.
#[derive(Debug, Clone)]
pub struct EndpointProber {
    client: Client,
    timeout: Duration,
}

impl EndpointProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Probe one endpoint. Any failure (network, timeout, non-200, body that is
    /// not JSON) reads as offline; this never returns an error.
    pub async fn check(&self, base_url: &str) -> EndpointStatus {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Endpoint probe failed");
                return EndpointStatus::OFFLINE;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::debug!(url = %url, status = %response.status(), "Endpoint unhealthy");
            return EndpointStatus::OFFLINE;
        }

        match response.json::<HealthBody>().await {
            Ok(body) => EndpointStatus {
                online: true,
                model_loaded: body.model_loaded,
            },
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Unreadable health response");
                EndpointStatus::OFFLINE
            }
        }
    }
}
