use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
    error::{Result, ToggleError},
    models::{EvaluationContext, User},
    provider::models::{FlattenedContext, TARGETING_KEY},
};

const USER: &str = "user";
const IP_ADDRESS: &str = "ipAddress";
const CUSTOM_ATTRIBUTES: &str = "customAttributes";

/// Builds the canonical context for one call.
///
/// Application and environment always come from the provider, whatever the
/// caller passed.
pub fn build_context(
    raw: &FlattenedContext,
    application: &str,
    environment: &str,
) -> Result<EvaluationContext> {
    let targeting_key = match raw.get(TARGETING_KEY) {
        Some(Value::String(key)) => key.clone(),
        _ => return Err(ToggleError::MissingTargetingKey),
    };

    let user = match raw.get(USER) {
        Some(Value::Object(user)) => Some(build_user(user, &targeting_key)),
        _ => None,
    };

    let ip_address = raw
        .get(IP_ADDRESS)
        .and_then(Value::as_str)
        .map(str::to_string);

    let custom_attributes = raw
        .iter()
        .filter(|(k, _)| k.as_str() != TARGETING_KEY && k.as_str() != USER)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(EvaluationContext {
        targeting_key,
        ip_address,
        application: application.to_string(),
        environment: environment.to_string(),
        user,
        custom_attributes,
    })
}

fn build_user(user: &Map<String, Value>, targeting_key: &str) -> User {
    let field = |name: &str| user.get(name).and_then(Value::as_str).map(str::to_string);

    let custom_attributes = match user.get(CUSTOM_ATTRIBUTES) {
        Some(Value::Object(attrs)) => attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => HashMap::new(),
    };

    User {
        id: field("id")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| targeting_key.to_string()),
        email: field("email"),
        name: field("name"),
        custom_attributes,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn flat(value: Value) -> FlattenedContext {
        serde_json::from_value(value).expect("should be an object")
    }

    #[test]
    fn test_build_context_with_custom_attribute() {
        let ctx = build_context(
            &flat(json!({"targetingKey": "user-123", "custom": "value"})),
            "app",
            "production",
        )
        .expect("should build");

        assert_eq!(ctx.targeting_key, "user-123");
        assert_eq!(ctx.application, "app");
        assert_eq!(ctx.environment, "production");
        assert_eq!(ctx.user, None);
        assert_eq!(ctx.ip_address, None);
        assert_eq!(
            ctx.custom_attributes,
            HashMap::from([("custom".to_string(), json!("value"))])
        );
    }

    #[test]
    fn test_build_context_missing_targeting_key() {
        for raw in [
            json!({"custom": "value"}),
            json!({"targetingKey": null}),
            json!({"targetingKey": 12}),
        ] {
            assert!(matches!(
                build_context(&flat(raw), "app", "production"),
                Err(ToggleError::MissingTargetingKey)
            ));
        }
    }

    #[test]
    fn test_build_context_with_user() {
        let ctx = build_context(
            &flat(json!({
                "targetingKey": "user-123",
                "ipAddress": "203.0.113.42",
                "user": {
                    "email": "user@example.com",
                    "name": "John Doe",
                    "customAttributes": {"role": "admin"}
                }
            })),
            "app",
            "production",
        )
        .expect("should build");

        let user = ctx.user.expect("should have a user");
        assert_eq!(user.id, "user-123");
        assert_eq!(user.email.as_deref(), Some("user@example.com"));
        assert_eq!(user.name.as_deref(), Some("John Doe"));
        assert_eq!(user.custom_attributes.get("role"), Some(&json!("admin")));
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.42"));
        assert!(!ctx.custom_attributes.contains_key("user"));
        assert_eq!(
            ctx.custom_attributes.get("ipAddress"),
            Some(&json!("203.0.113.42"))
        );
    }

    #[test]
    fn test_build_context_ignores_caller_tenant() {
        let ctx = build_context(
            &flat(json!({
                "targetingKey": "user-123",
                "application": "other-app",
                "environment": "other-env"
            })),
            "app",
            "production",
        )
        .expect("should build");

        assert_eq!(ctx.application, "app");
        assert_eq!(ctx.environment, "production");
    }

    #[test]
    fn test_build_context_accepts_empty_targeting_key() {
        let ctx = build_context(&flat(json!({"targetingKey": ""})), "app", "production")
            .expect("should build");
        assert_eq!(ctx.targeting_key, "");
        assert!(ctx.custom_attributes.is_empty());
    }

    #[test]
    fn test_build_context_non_object_user() {
        let ctx = build_context(
            &flat(json!({"targetingKey": "user-123", "user": "someone"})),
            "app",
            "production",
        )
        .expect("should build");
        assert_eq!(ctx.user, None);
        assert!(ctx.custom_attributes.is_empty());
    }
}
