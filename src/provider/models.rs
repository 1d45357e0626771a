use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::FlagType;

pub const TARGETING_KEY: &str = "targetingKey";

/// Context handed over by the host framework, with the targeting key merged in.
pub type FlattenedContext = HashMap<String, Value>;

/// Evaluation context as the host framework holds it before flattening.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HostContext {
    pub targeting_key: Option<String>,
    pub attributes: HashMap<String, Value>,
}

impl HostContext {
    pub fn new(targeting_key: impl Into<String>, attributes: HashMap<String, Value>) -> Self {
        Self {
            targeting_key: Some(targeting_key.into()),
            attributes,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Empty targeting keys count as missing.
    pub fn targeting_key(&self) -> Option<&str> {
        self.targeting_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn flatten(&self) -> FlattenedContext {
        let mut flat = self.attributes.clone();
        if let Some(key) = self.targeting_key() {
            flat.insert(TARGETING_KEY.to_string(), Value::String(key.to_string()));
        }
        flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Static,
    Default,
    TargetingMatch,
    Split,
    Cached,
    Disabled,
    Unknown,
    Error,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Static => "STATIC",
            Reason::Default => "DEFAULT",
            Reason::TargetingMatch => "TARGETING_MATCH",
            Reason::Split => "SPLIT",
            Reason::Cached => "CACHED",
            Reason::Disabled => "DISABLED",
            Reason::Unknown => "UNKNOWN",
            Reason::Error => "ERROR",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProviderNotReady,
    FlagNotFound,
    ParseError,
    TypeMismatch,
    TargetingKeyMissing,
    InvalidContext,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResolutionError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl ResolutionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{:?}: {}", self.code, message),
            None => write!(f, "{:?}", self.code),
        }
    }
}

/// What a provider hands back for one flag. `error` is set whenever `value` is the default.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionDetails<T> {
    pub value: T,
    pub variant: Option<String>,
    pub reason: Option<Reason>,
    pub error: Option<ResolutionError>,
}

impl<T> ResolutionDetails<T> {
    pub fn matched(value: T) -> Self {
        Self {
            value,
            variant: None,
            reason: Some(Reason::TargetingMatch),
            error: None,
        }
    }

    pub fn failed(default_value: T, error: ResolutionError) -> Self {
        Self {
            value: default_value,
            variant: None,
            reason: Some(Reason::Error),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResolutionDetails<U> {
        ResolutionDetails {
            value: f(self.value),
            variant: self.variant,
            reason: self.reason,
            error: self.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub name: String,
}

/// What a hook sees about the evaluation it wraps.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub flag_key: String,
    pub flag_type: FlagType,
    pub default_value: Value,
    pub evaluation_context: HostContext,
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flatten_inserts_targeting_key() {
        let ctx = HostContext::new("user-1", HashMap::new()).with_attribute("plan", json!("pro"));
        let flat = ctx.flatten();
        assert_eq!(flat.get(TARGETING_KEY), Some(&json!("user-1")));
        assert_eq!(flat.get("plan"), Some(&json!("pro")));

        let anonymous = HostContext {
            targeting_key: Some(String::new()),
            ..HostContext::default()
        };
        assert!(anonymous.targeting_key().is_none());
        assert!(!anonymous.flatten().contains_key(TARGETING_KEY));
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_value(Reason::TargetingMatch).expect("should serialize"),
            json!("TARGETING_MATCH")
        );
        assert_eq!(Reason::TargetingMatch.to_string(), "TARGETING_MATCH");
        assert_eq!(
            serde_json::to_value(ErrorCode::TypeMismatch).expect("should serialize"),
            json!("TYPE_MISMATCH")
        );
    }

    #[test]
    fn test_resolution_details_map() {
        let details = ResolutionDetails::failed(1, ResolutionError::new(ErrorCode::General, "boom"))
            .map(|v| json!(v));
        assert_eq!(details.value, json!(1));
        assert_eq!(details.reason, Some(Reason::Error));
        assert_eq!(
            details.error.map(|e| e.to_string()),
            Some("General: boom".to_string())
        );
    }
}
