use std::{fmt, sync::Arc, sync::OnceLock, time::Duration};

use regex::Regex;

use crate::{
    error::{Result, ToggleError},
    hook::HookLogger,
    models::EvaluationContext,
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PROJECT_ENVIRONMENT_PREFIX: &str = "pevr_";
const RESERVED_ENVIRONMENT_WORD: &str = "environments";

pub type CacheKeyFn = Arc<dyn Fn(&EvaluationContext) -> String + Send + Sync>;

/// Options used to build a [`ToggleProvider`](crate::ToggleProvider).
///
/// `server_urls` are tried in order, the first one answering wins. When empty,
/// the endpoint is derived from the organization embedded in the public key.
///
/// The request timeout defaults to 10s, set `timeout` or the
/// `TOGGLE_TIMEOUT_MS` environment variable to change it.
#[derive(Clone)]
pub struct ToggleOptions {
    pub public_key: String,
    pub application: String,
    pub environment: String,
    pub server_urls: Vec<String>,
    pub cache: Option<CacheOptions>,
    pub enable_usage: bool,
    pub timeout: Option<Duration>,
    pub logger: Option<Arc<dyn HookLogger>>,
}

impl ToggleOptions {
    pub fn new(
        public_key: impl Into<String>,
        application: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            application: application.into(),
            environment: environment.into(),
            server_urls: vec![],
            cache: None,
            enable_usage: true,
            timeout: None,
            logger: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.application.is_empty() {
            return Err(ToggleError::MissingApplication);
        }
        if self.environment.is_empty() {
            return Err(ToggleError::MissingEnvironment);
        }
        if self.public_key.is_empty() {
            return Err(ToggleError::MissingPublicKey);
        }
        if !is_valid_environment(&self.environment) {
            return Err(ToggleError::InvalidEnvironmentFormat);
        }
        Ok(())
    }
}

impl fmt::Debug for ToggleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggleOptions")
            .field("application", &self.application)
            .field("environment", &self.environment)
            .field("server_urls", &self.server_urls)
            .field("cache", &self.cache)
            .field("enable_usage", &self.enable_usage)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

/// Response cache settings. The default key is the targeting key.
#[derive(Clone)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub key_fn: CacheKeyFn,
    /// Periodically purge expired entries instead of waiting for a read.
    pub sweep_interval: Option<Duration>,
}

impl CacheOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            key_fn: Arc::new(|ctx: &EvaluationContext| ctx.targeting_key.clone()),
            sweep_interval: None,
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("ttl", &self.ttl)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

fn alternate_id_regex() -> &'static Regex {
    static ALTERNATE_ID: OnceLock<Regex> = OnceLock::new();
    ALTERNATE_ID.get_or_init(|| Regex::new(r"^[a-z0-9_-]{1,25}$").expect("valid regex"))
}

/// Accepts a project environment id (`pevr_...`) or an alternate id.
pub fn is_valid_environment(environment: &str) -> bool {
    if environment.starts_with(PROJECT_ENVIRONMENT_PREFIX) {
        return true;
    }
    alternate_id_regex().is_match(environment)
        && !environment.contains(RESERVED_ENVIRONMENT_WORD)
}
