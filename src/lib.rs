//! Feature flag provider backed by the Hyphen Toggle evaluation service
//!
//! Flags are resolved remotely over `POST {base}/toggle/evaluate`, trying the
//! configured servers in order until one answers. Responses can be cached per
//! context for a fixed TTL, and usage telemetry is posted by the provider hook
//! after each evaluation.
//!
//! To change the default request timeout set the TOGGLE_TIMEOUT_MS
//! environment variable to the desired timeout value.
mod cache;
mod client;
mod config;
mod context;
mod endpoints;
mod error;
mod hook;
mod http;
mod provider;

pub mod models;

pub use crate::cache::TtlCache;
pub use crate::client::{Client, ToggleApi};
pub use crate::config::{
    is_valid_environment, CacheKeyFn, CacheOptions, ToggleOptions, DEFAULT_CACHE_TTL,
    DEFAULT_TIMEOUT,
};
pub use crate::context::build_context;
pub use crate::endpoints::{organization_id, resolve_endpoints, DefaultEndpoints, Endpoints};
pub use crate::error::{Result, ToggleError};
pub use crate::hook::{
    flatten_attributes, generate_targeting_key, Hook, HookLogger, ToggleHook, TracingLogger,
};
pub use crate::provider::models::{
    ErrorCode, FlattenedContext, HookContext, HostContext, ProviderMetadata, Reason,
    ResolutionDetails, ResolutionError, TARGETING_KEY,
};
pub use crate::provider::{FeatureProvider, ToggleProvider, PROVIDER_NAME};
