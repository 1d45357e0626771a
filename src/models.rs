use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// Canonical context sent to the evaluation service.
///
/// A fresh instance is built for every evaluation call.
#[skip_serializing_none]
#[derive(Debug, Default, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub targeting_key: String,
    pub ip_address: Option<String>,
    pub application: String,
    pub environment: String,
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_attributes: HashMap<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Default, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_attributes: HashMap<String, Value>,
}

/// Declared type of a flag as reported by the service.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Boolean,
    String,
    Number,
    Object,
    #[default]
    #[serde(other)]
    Unknown,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Boolean => "boolean",
            FlagType::String => "string",
            FlagType::Number => "number",
            FlagType::Object => "object",
            FlagType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flag outcome produced by the service.
#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct Evaluation {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "type")]
    pub flag_type: FlagType,
    pub reason: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, PartialEq, Clone, Deserialize, Serialize)]
pub struct Response {
    #[serde(default)]
    pub toggles: HashMap<String, Evaluation>,
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct TelemetryPayload {
    pub context: EvaluationContext,
    pub data: TelemetryData,
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct TelemetryData {
    pub toggle: Evaluation,
}

impl TelemetryPayload {
    pub fn new(context: EvaluationContext, toggle: Evaluation) -> Self {
        Self {
            context,
            data: TelemetryData { toggle },
        }
    }
}
