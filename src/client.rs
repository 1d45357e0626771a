use std::sync::{Arc, Weak};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::time::{self, Duration};
use tracing::{event, Level};

use crate::{
    cache::TtlCache,
    config::{CacheOptions, ToggleOptions},
    endpoints::{resolve_endpoints, DefaultEndpoints, Endpoints},
    error::{Result, ToggleError},
    http::ToggleHttpClient,
    models::{EvaluationContext, Response, TelemetryPayload},
};

/// The two calls the provider makes against the evaluation service.
#[async_trait]
pub trait ToggleApi: Send + Sync {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<Arc<Response>>;

    async fn send_telemetry(&self, payload: &TelemetryPayload) -> Result<()>;
}

/// Evaluation client with ordered failover across endpoints and an optional
/// response cache.
pub struct Client {
    endpoints: Vec<Endpoints>,
    http_client: ToggleHttpClient,
    cache: Option<Arc<TtlCache<Arc<Response>>>>,
}

impl Client {
    pub fn new(options: &ToggleOptions, defaults: &DefaultEndpoints) -> Result<Self> {
        let endpoints = resolve_endpoints(&options.server_urls, &options.public_key, defaults);
        Self::with_endpoints(options, endpoints)
    }

    pub fn with_endpoints(options: &ToggleOptions, endpoints: Vec<Endpoints>) -> Result<Self> {
        let http_client = ToggleHttpClient::new(&options.public_key, options.timeout)?;
        let cache = options.cache.as_ref().map(|cache_options| {
            let cache = Arc::new(TtlCache::new(cache_options.ttl, cache_options.key_fn.clone()));
            spawn_sweeper(&cache, cache_options);
            cache
        });

        event!(
            Level::DEBUG,
            "Toggle client created with endpoints {:?}",
            endpoints
        );

        Ok(Self {
            endpoints,
            http_client,
            cache,
        })
    }

    pub fn endpoints(&self) -> &[Endpoints] {
        &self.endpoints
    }

    pub fn cache(&self) -> Option<&TtlCache<Arc<Response>>> {
        self.cache.as_deref()
    }

    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Result<Arc<Response>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(ctx) {
                event!(Level::TRACE, "Toggle cache hit for {}", cache.key(ctx));
                return Ok(cached);
            }
            event!(Level::TRACE, "Toggle cache miss for {}", cache.key(ctx));
        }

        let mut last_err = None;
        for endpoint in &self.endpoints {
            match self.http_client.evaluate(&endpoint.evaluate, ctx).await {
                Ok(response) => {
                    let response = Arc::new(response);
                    if let Some(cache) = &self.cache {
                        cache.set(ctx, response.clone());
                    }
                    return Ok(response);
                }
                Err(e) => {
                    event!(
                        Level::WARN,
                        "Toggle evaluation failed against {}: {}",
                        endpoint.evaluate,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow!("no endpoints configured"));
        event!(Level::ERROR, "All toggle evaluation attempts failed: {}", err);
        Err(ToggleError::EvaluationFailed(err))
    }

    pub async fn send_telemetry(&self, payload: &TelemetryPayload) -> Result<()> {
        let mut last_err = None;
        for endpoint in &self.endpoints {
            match self
                .http_client
                .send_telemetry(&endpoint.telemetry, payload)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    event!(
                        Level::WARN,
                        "Toggle telemetry failed against {}: {}",
                        endpoint.telemetry,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(ToggleError::TelemetryFailed(
            last_err.unwrap_or_else(|| anyhow!("no endpoints configured")),
        ))
    }
}

#[async_trait]
impl ToggleApi for Client {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<Arc<Response>> {
        Client::evaluate(self, ctx).await
    }

    async fn send_telemetry(&self, payload: &TelemetryPayload) -> Result<()> {
        Client::send_telemetry(self, payload).await
    }
}

fn spawn_sweeper(cache: &Arc<TtlCache<Arc<Response>>>, options: &CacheOptions) {
    let Some(interval) = options.sweep_interval else {
        return;
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(sweep_expired(Arc::downgrade(cache), interval));
        }
        Err(_) => event!(
            Level::WARN,
            "No tokio runtime available, toggle cache entries expire on read only"
        ),
    }
}

async fn sweep_expired(cache: Weak<TtlCache<Arc<Response>>>, sweep_interval: Duration) {
    let mut interval = time::interval(sweep_interval);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(cache) = cache.upgrade() else {
            event!(Level::DEBUG, "Toggle cache dropped, stopping sweeper");
            return;
        };
        let purged = cache.purge_expired();
        if purged > 0 {
            event!(Level::DEBUG, "Purged {} expired toggle cache entries", purged);
        }
    }
}
