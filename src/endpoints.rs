use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

const PUBLIC_KEY_PREFIX: &str = "public_";
const EVALUATE_PATH: &str = "/toggle/evaluate";
const TELEMETRY_PATH: &str = "/toggle/telemetry";

/// The pair of urls used against one evaluation server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub evaluate: String,
    pub telemetry: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            evaluate: format!("{base_url}{EVALUATE_PATH}"),
            telemetry: format!("{base_url}{TELEMETRY_PATH}"),
        }
    }
}

/// Fallback urls used when no server url is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultEndpoints {
    pub global_url: String,
    /// `{org}` is replaced by the organization id found in the public key.
    pub organization_url_template: String,
}

impl Default for DefaultEndpoints {
    fn default() -> Self {
        Self {
            global_url: "https://toggle.hyphen.cloud".to_string(),
            organization_url_template: "https://{org}.toggle.hyphen.cloud".to_string(),
        }
    }
}

impl DefaultEndpoints {
    fn organization_url(&self, org_id: &str) -> String {
        self.organization_url_template.replace("{org}", org_id)
    }
}

/// Returns the endpoints to try, in failover order. Never empty.
pub fn resolve_endpoints(
    server_urls: &[String],
    public_key: &str,
    defaults: &DefaultEndpoints,
) -> Vec<Endpoints> {
    if !server_urls.is_empty() {
        return server_urls.iter().map(|url| Endpoints::new(url)).collect();
    }

    let base_url = match organization_id(public_key) {
        Some(org_id) => defaults.organization_url(&org_id),
        None => defaults.global_url.clone(),
    };
    vec![Endpoints::new(&base_url)]
}

/// Decodes the organization id embedded in a `public_<base64(org:...)>` key.
pub fn organization_id(public_key: &str) -> Option<String> {
    let encoded = public_key
        .strip_prefix(PUBLIC_KEY_PREFIX)
        .unwrap_or(public_key);
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let org_id = decoded.split(':').next()?;

    organization_id_regex()
        .is_match(org_id)
        .then(|| org_id.to_string())
}

fn organization_id_regex() -> &'static Regex {
    static ORGANIZATION_ID: OnceLock<Regex> = OnceLock::new();
    ORGANIZATION_ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"))
}
