use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{event, Level};

use crate::{
    client::{Client, ToggleApi},
    config::ToggleOptions,
    context::build_context,
    endpoints::{resolve_endpoints, DefaultEndpoints, Endpoints},
    error::{Result, ToggleError},
    hook::{Hook, ToggleHook},
    models::{FlagType, Response},
};

use self::getters::{get_bool, get_float, get_int, get_object, get_string, value_kind};
use self::models::{
    ErrorCode, FlattenedContext, ProviderMetadata, ResolutionDetails, ResolutionError,
};

mod getters;
pub mod models;

pub const PROVIDER_NAME: &str = "hyphen-provider";

/// The capability a host flag framework calls into.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    fn metadata(&self) -> &ProviderMetadata;

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        vec![]
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        default_value: bool,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<bool>;

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<String>;

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        default_value: i64,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<i64>;

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<f64>;

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        default_value: Value,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<Value>;
}

/// Resolves flags through the remote evaluation service.
///
/// Every accessor returns a value: any failure hands back the caller's default
/// with a [`ResolutionError`] attached.
pub struct ToggleProvider {
    options: ToggleOptions,
    metadata: ProviderMetadata,
    endpoints: Vec<Endpoints>,
    client: Arc<dyn ToggleApi>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl ToggleProvider {
    pub fn new(options: ToggleOptions) -> Result<Self> {
        Self::with_defaults(options, &DefaultEndpoints::default())
    }

    pub fn with_defaults(options: ToggleOptions, defaults: &DefaultEndpoints) -> Result<Self> {
        options.validate()?;
        let client = Client::new(&options, defaults)?;
        let endpoints = client.endpoints().to_vec();
        Ok(Self::build(options, endpoints, Arc::new(client)))
    }

    /// Uses the given client instead of one talking to the resolved endpoints.
    pub fn with_client(options: ToggleOptions, client: Arc<dyn ToggleApi>) -> Result<Self> {
        options.validate()?;
        let endpoints = resolve_endpoints(
            &options.server_urls,
            &options.public_key,
            &DefaultEndpoints::default(),
        );
        Ok(Self::build(options, endpoints, client))
    }

    fn build(
        options: ToggleOptions,
        endpoints: Vec<Endpoints>,
        client: Arc<dyn ToggleApi>,
    ) -> Self {
        let hook: Arc<dyn Hook> = Arc::new(ToggleHook::new(
            options.application.clone(),
            options.environment.clone(),
            options.enable_usage,
            client.clone(),
            options.logger.clone(),
        ));
        Self {
            metadata: ProviderMetadata {
                name: PROVIDER_NAME.to_string(),
            },
            endpoints,
            client,
            hooks: vec![hook],
            options,
        }
    }

    pub fn options(&self) -> &ToggleOptions {
        &self.options
    }

    pub fn endpoints(&self) -> &[Endpoints] {
        &self.endpoints
    }

    /// Resolves an object flag straight into `T`.
    pub async fn get_object<T: DeserializeOwned + Send>(
        &self,
        flag_key: &str,
        default_value: T,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<T> {
        let details = self
            .resolve(flag_key, Value::Null, ctx, FlagType::Object, get_object)
            .await;
        if details.is_error() {
            return details.map(|_| default_value);
        }
        match serde_json::from_value::<T>(details.value) {
            Ok(value) => ResolutionDetails::matched(value),
            Err(e) => ResolutionDetails::failed(
                default_value,
                ResolutionError::new(
                    ErrorCode::TypeMismatch,
                    format!("cannot decode {}: {}", flag_key, e),
                ),
            ),
        }
    }

    async fn resolve<T: Send>(
        &self,
        flag_key: &str,
        default_value: T,
        ctx: &FlattenedContext,
        flag_type: FlagType,
        coerce: fn(&Value) -> Option<T>,
    ) -> ResolutionDetails<T> {
        let evaluation_context =
            match build_context(ctx, &self.options.application, &self.options.environment) {
                Ok(c) => c,
                Err(e) => {
                    event!(Level::DEBUG, "Invalid context for toggle {}: {}", flag_key, e);
                    return ResolutionDetails::failed(
                        default_value,
                        ResolutionError::new(ErrorCode::ParseError, e.to_string()),
                    );
                }
            };

        let response = match self.client.evaluate(&evaluation_context).await {
            Ok(r) => r,
            Err(e) => {
                return ResolutionDetails::failed(
                    default_value,
                    ResolutionError::new(ErrorCode::General, e.to_string()),
                )
            }
        };

        match typed_value(&response, flag_key, flag_type, coerce) {
            Ok(value) => ResolutionDetails::matched(value),
            Err(e) => {
                event!(Level::DEBUG, "Toggle {} resolved to default: {}", flag_key, e);
                ResolutionDetails::failed(
                    default_value,
                    ResolutionError::new(ErrorCode::TypeMismatch, e.to_string()),
                )
            }
        }
    }
}

fn typed_value<T>(
    response: &Response,
    flag_key: &str,
    flag_type: FlagType,
    coerce: fn(&Value) -> Option<T>,
) -> Result<T> {
    let evaluation = response
        .toggles
        .get(flag_key)
        .ok_or_else(|| ToggleError::FlagNotFound(flag_key.to_string()))?;

    if evaluation.flag_type != flag_type {
        return Err(ToggleError::InvalidFlagType {
            flag: flag_key.to_string(),
            expected: flag_type.to_string(),
            actual: evaluation.flag_type.to_string(),
        });
    }

    coerce(&evaluation.value).ok_or_else(|| ToggleError::InvalidFlagType {
        flag: flag_key.to_string(),
        expected: flag_type.to_string(),
        actual: format!("{} value", value_kind(&evaluation.value)),
    })
}

#[async_trait]
impl FeatureProvider for ToggleProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.hooks.clone()
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        default_value: bool,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<bool> {
        self.resolve(flag_key, default_value, ctx, FlagType::Boolean, get_bool)
            .await
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<String> {
        self.resolve(flag_key, default_value, ctx, FlagType::String, get_string)
            .await
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        default_value: i64,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<i64> {
        self.resolve(flag_key, default_value, ctx, FlagType::Number, get_int)
            .await
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<f64> {
        self.resolve(flag_key, default_value, ctx, FlagType::Number, get_float)
            .await
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        default_value: Value,
        ctx: &FlattenedContext,
    ) -> ResolutionDetails<Value> {
        self.resolve(flag_key, default_value, ctx, FlagType::Object, get_object)
            .await
    }
}
