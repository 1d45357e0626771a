use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rand::{distributions::Uniform, rngs::SmallRng, Rng, SeedableRng};
use serde_json::Value;
use tracing::{event, Level};

use crate::{
    client::ToggleApi,
    error::{Result, ToggleError},
    models::{Evaluation, EvaluationContext, TelemetryPayload},
    provider::models::{HookContext, HostContext, ResolutionDetails},
};

const TARGETING_KEY_SUFFIX_LEN: usize = 7;
const TARGETING_KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Attributes copied as is into telemetry, when they hold a string.
const TELEMETRY_ATTRIBUTES: [&str; 3] = ["region", "subscriptionLevel", "ipAddress"];

/// Runs around every flag evaluation performed by the host framework.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Returns a replacement context for the evaluation, if any.
    fn before(&self, _ctx: &HookContext) -> Result<Option<HostContext>> {
        Ok(None)
    }

    async fn after(&self, _ctx: &HookContext, _details: &ResolutionDetails<Value>) -> Result<()> {
        Ok(())
    }

    fn error(&self, _ctx: &HookContext, _err: &ToggleError) {}
}

/// Receives failures reported to the hook's error stage.
pub trait HookLogger: Send + Sync {
    fn error(&self, flag_key: &str, err: &ToggleError);
}

/// Writes hook failures as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl HookLogger for TracingLogger {
    fn error(&self, flag_key: &str, err: &ToggleError) {
        event!(Level::ERROR, "Error in toggle hook for {}: {}", flag_key, err);
    }
}

pub struct ToggleHook {
    application: String,
    environment: String,
    enable_usage: bool,
    client: Arc<dyn ToggleApi>,
    logger: Option<Arc<dyn HookLogger>>,
}

impl ToggleHook {
    pub fn new(
        application: String,
        environment: String,
        enable_usage: bool,
        client: Arc<dyn ToggleApi>,
        logger: Option<Arc<dyn HookLogger>>,
    ) -> Self {
        Self {
            application,
            environment,
            enable_usage,
            client,
            logger,
        }
    }

    fn telemetry_payload(
        &self,
        ctx: &HookContext,
        details: &ResolutionDetails<Value>,
    ) -> TelemetryPayload {
        let host = &ctx.evaluation_context;
        let context = EvaluationContext {
            targeting_key: host.targeting_key().unwrap_or_default().to_string(),
            application: self.application.clone(),
            environment: self.environment.clone(),
            custom_attributes: flatten_attributes(&host.attributes),
            ..Default::default()
        };
        let toggle = Evaluation {
            key: ctx.flag_key.clone(),
            value: details.value.clone(),
            flag_type: ctx.flag_type,
            reason: details.reason.map(|r| r.to_string()),
            error: details.error.as_ref().map(|e| e.to_string()),
        };
        TelemetryPayload::new(context, toggle)
    }
}

#[async_trait]
impl Hook for ToggleHook {
    fn before(&self, ctx: &HookContext) -> Result<Option<HostContext>> {
        let mut attributes = ctx.evaluation_context.attributes.clone();
        attributes.insert(
            "application".to_string(),
            Value::String(self.application.clone()),
        );
        attributes.insert(
            "environment".to_string(),
            Value::String(self.environment.clone()),
        );

        let targeting_key = match ctx.evaluation_context.targeting_key() {
            Some(key) => key.to_string(),
            None => user_id(&attributes).unwrap_or_else(|| {
                generate_targeting_key(&self.application, &self.environment)
            }),
        };

        Ok(Some(HostContext {
            targeting_key: Some(targeting_key),
            attributes,
        }))
    }

    async fn after(&self, ctx: &HookContext, details: &ResolutionDetails<Value>) -> Result<()> {
        if !self.enable_usage {
            return Ok(());
        }
        let payload = self.telemetry_payload(ctx, details);
        self.client.send_telemetry(&payload).await
    }

    fn error(&self, ctx: &HookContext, err: &ToggleError) {
        match &self.logger {
            Some(logger) => logger.error(&ctx.flag_key, err),
            None => event!(
                Level::DEBUG,
                "Dropping toggle hook error for {}: {}",
                ctx.flag_key,
                err
            ),
        }
    }
}

fn user_id(attributes: &HashMap<String, Value>) -> Option<String> {
    attributes
        .get("user")?
        .get("id")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Anonymous fallback key, `{application}-{environment}-{7 random chars}`.
///
/// Not a secret, a fast non cryptographic rng is enough.
pub fn generate_targeting_key(application: &str, environment: &str) -> String {
    let rng = SmallRng::from_entropy();
    let charset = Uniform::from(0..TARGETING_KEY_CHARSET.len());
    let suffix: String = rng
        .sample_iter(charset)
        .take(TARGETING_KEY_SUFFIX_LEN)
        .map(|i| TARGETING_KEY_CHARSET[i] as char)
        .collect();
    format!("{application}-{environment}-{suffix}")
}

/// Pulls the attributes reported with telemetry out of the mixed attribute map.
pub fn flatten_attributes(attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut flattened = HashMap::new();
    let nested = attributes
        .get("customAttributes")
        .and_then(Value::as_object);

    for name in TELEMETRY_ATTRIBUTES {
        let value = attributes
            .get(name)
            .and_then(Value::as_str)
            .or_else(|| nested.and_then(|n| n.get(name)).and_then(Value::as_str));
        if let Some(value) = value {
            flattened.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    if let Some(user) = attributes.get("user").and_then(Value::as_object) {
        for field in ["id", "email", "name"] {
            if let Some(value) = user.get(field).and_then(Value::as_str) {
                flattened.insert(format!("user.{field}"), Value::String(value.to_string()));
            }
        }
        if let Some(custom) = user.get("customAttributes").and_then(Value::as_object) {
            for (key, value) in custom {
                if !value.is_object() && !value.is_array() && !value.is_null() {
                    flattened.insert(format!("user.{key}"), value.clone());
                }
            }
        }
    }

    flattened
}
