use httptest::{matchers::request, responders::json_encoded, Expectation, Server};
use serde_json::{json, Value};

use hyphen_toggle::{
    CacheOptions, FeatureProvider, FlattenedContext, HookContext, HostContext, ResolutionDetails,
    ToggleError, ToggleOptions, ToggleProvider,
};
use hyphen_toggle::models::FlagType;

pub fn toggles() -> Value {
    json!({
        "toggles": {
            "alpha": {"key": "alpha", "value": "variant-a", "type": "string"},
            "teta": {"key": "teta", "value": true, "type": "boolean"},
            "delta": {"key": "delta", "value": 2.5, "type": "number"},
            "count": {"key": "count", "value": 10, "type": "number"},
            "gamma": {
                "key": "gamma",
                "value": {"field1": "hello", "field2": 2},
                "type": "object"
            }
        }
    })
}

pub fn expect_evaluate(server: &Server, times: usize) {
    server.expect(
        Expectation::matching(request::method_path("POST", "/toggle/evaluate"))
            .times(times)
            .respond_with(json_encoded(toggles())),
    );
}

pub fn expect_telemetry(server: &Server, times: usize) {
    server.expect(
        Expectation::matching(request::method_path("POST", "/toggle/telemetry"))
            .times(times)
            .respond_with(json_encoded(json!({}))),
    );
}

pub fn server_url(server: &Server) -> String {
    format!("http://{}", server.addr())
}

pub fn options(servers: &[&Server]) -> ToggleOptions {
    ToggleOptions {
        server_urls: servers.iter().map(|s| server_url(s)).collect(),
        ..ToggleOptions::new("api_key", "test-app", "production")
    }
}

pub fn create_provider(servers: &[&Server], cache: Option<CacheOptions>) -> ToggleProvider {
    ToggleProvider::new(ToggleOptions {
        cache,
        ..options(servers)
    })
    .expect("should be able to create toggle provider")
}

/// Runs one boolean evaluation the way a host framework drives provider hooks.
pub async fn evaluate_bool_with_hooks(
    provider: &ToggleProvider,
    flag_key: &str,
    default_value: bool,
    evaluation_context: HostContext,
) -> (ResolutionDetails<bool>, Vec<ToggleError>) {
    let mut hook_ctx = HookContext {
        flag_key: flag_key.to_string(),
        flag_type: FlagType::Boolean,
        default_value: json!(default_value),
        evaluation_context,
    };
    let hooks = provider.hooks();
    let mut errors = vec![];

    for hook in &hooks {
        match hook.before(&hook_ctx) {
            Ok(Some(ctx)) => hook_ctx.evaluation_context = ctx,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    let flat: FlattenedContext = hook_ctx.evaluation_context.flatten();
    let details = provider
        .resolve_bool_value(flag_key, default_value, &flat)
        .await;

    let erased = details.clone().map(Value::Bool);
    for hook in &hooks {
        if let Err(e) = hook.after(&hook_ctx, &erased).await {
            hook.error(&hook_ctx, &e);
            errors.push(e);
        }
    }

    (details, errors)
}
