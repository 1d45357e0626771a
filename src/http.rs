use anyhow::{anyhow, Result};
use reqwest::{
    header,
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, ClientBuilder,
};
use tokio::time::Duration;

use crate::{
    config::DEFAULT_TIMEOUT,
    error::ToggleError,
    models::{EvaluationContext, Response, TelemetryPayload},
};

/// The environment variable to change the default timeout for toggle requests.
const TOGGLE_TIMEOUT_MS: &str = "TOGGLE_TIMEOUT_MS";
const API_KEY_HEADER: &str = "x-api-key";

fn request_timeout(timeout: Option<Duration>) -> Duration {
    timeout.unwrap_or_else(|| timeout_from_env(std::env::var(TOGGLE_TIMEOUT_MS).ok()))
}

/// Unset or unparsable values fall back to the default timeout.
fn timeout_from_env(value: Option<String>) -> Duration {
    value
        .and_then(|ms| ms.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT)
}

fn create_http_connection_client(
    key: &str,
    timeout: Option<Duration>,
) -> Result<Client, ToggleError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_str(key).map_err(|_| ToggleError::InvalidPublicKey)?,
    );
    let client = ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(60)))
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .timeout(request_timeout(timeout))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Thin wrapper over one pooled reqwest client, a single attempt per call.
#[derive(Clone)]
pub struct ToggleHttpClient {
    http_client: Client,
}

impl ToggleHttpClient {
    pub fn new(public_key: &str, timeout: Option<Duration>) -> Result<Self, ToggleError> {
        let http_client = create_http_connection_client(public_key, timeout)?;
        Ok(Self { http_client })
    }

    pub async fn evaluate(&self, url: &str, ctx: &EvaluationContext) -> Result<Response> {
        let response = self.http_client.post(url).json(ctx).send().await;
        let res = match response {
            Ok(result) if result.status().is_success() => Ok(result),
            Ok(result) => Err(anyhow!("toggle error: server returned {}", result.status())),
            Err(err) => Err(anyhow!("failed to send request: {}", err)),
        }?;

        res.json::<Response>()
            .await
            .map_err(|e| anyhow!("error parsing evaluation response: {}", e))
    }

    pub async fn send_telemetry(&self, url: &str, payload: &TelemetryPayload) -> Result<()> {
        let response = self.http_client.post(url).json(payload).send().await;

        match response {
            Ok(result) if result.status().is_success() => Ok(()),
            Ok(result) => Err(anyhow!("toggle error: server returned {}", result.status())),
            Err(err) => Err(anyhow!("failed to send request: {}", err)),
        }
    }
}
