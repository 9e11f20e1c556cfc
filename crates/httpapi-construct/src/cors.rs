//! Cross-origin policy of an HTTP API.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::route::HttpMethod;

/// Methods allowed when CORS is enabled without options, in rendered order.
pub const DEFAULT_ALLOW_METHODS: [HttpMethod; 7] = [
    HttpMethod::Get,
    HttpMethod::Put,
    HttpMethod::Post,
    HttpMethod::Head,
    HttpMethod::Patch,
    HttpMethod::Delete,
    HttpMethod::Options,
];

/// CORS toggle: `true` for the permissive default, `false` for none, or
/// options merged over the default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CorsToggle {
    /// Enable with the default policy, or disable.
    Enabled(bool),
    /// Enable with overrides.
    Options(CorsOptions),
}

impl From<bool> for CorsToggle {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<CorsOptions> for CorsToggle {
    fn from(options: CorsOptions) -> Self {
        Self::Options(options)
    }
}

/// CORS overrides. Unset fields keep the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsOptions {
    pub allow_origins: Option<Vec<String>>,
    pub allow_headers: Option<Vec<String>>,
    pub allow_methods: Option<Vec<HttpMethod>>,
    pub expose_headers: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
    /// Preflight cache duration in seconds.
    pub max_age: Option<u32>,
}

/// A resolved CORS policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CorsConfiguration {
    pub allow_origins: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_methods: Vec<HttpMethod>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: Option<bool>,
    pub max_age: Option<u32>,
}

impl Default for CorsConfiguration {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_headers: vec!["*".to_string()],
            allow_methods: DEFAULT_ALLOW_METHODS.to_vec(),
            expose_headers: Vec::new(),
            allow_credentials: None,
            max_age: None,
        }
    }
}

impl CorsConfiguration {
    /// Render as the `CorsConfiguration` property of an HTTP API.
    ///
    /// `ANY` is written as `*`.
    pub fn to_json(&self) -> Value {
        let methods: Vec<&str> = self
            .allow_methods
            .iter()
            .map(|m| match m {
                HttpMethod::Any => "*",
                other => other.as_str(),
            })
            .collect();

        let mut map = Map::new();
        map.insert("AllowHeaders".into(), json!(self.allow_headers));
        map.insert("AllowMethods".into(), json!(methods));
        map.insert("AllowOrigins".into(), json!(self.allow_origins));
        if !self.expose_headers.is_empty() {
            map.insert("ExposeHeaders".into(), json!(self.expose_headers));
        }
        if let Some(credentials) = self.allow_credentials {
            map.insert("AllowCredentials".into(), json!(credentials));
        }
        if let Some(max_age) = self.max_age {
            map.insert("MaxAge".into(), json!(max_age));
        }
        Value::Object(map)
    }
}

/// Resolve the CORS toggle; `None` means no CORS block at all.
pub(crate) fn resolve_cors(toggle: Option<&CorsToggle>) -> Option<CorsConfiguration> {
    match toggle? {
        CorsToggle::Enabled(false) => None,
        CorsToggle::Enabled(true) => Some(CorsConfiguration::default()),
        CorsToggle::Options(options) => {
            let defaults = CorsConfiguration::default();
            Some(CorsConfiguration {
                allow_origins: options
                    .allow_origins
                    .clone()
                    .unwrap_or(defaults.allow_origins),
                allow_headers: options
                    .allow_headers
                    .clone()
                    .unwrap_or(defaults.allow_headers),
                allow_methods: options
                    .allow_methods
                    .clone()
                    .unwrap_or(defaults.allow_methods),
                expose_headers: options
                    .expose_headers
                    .clone()
                    .unwrap_or(defaults.expose_headers),
                allow_credentials: options.allow_credentials.or(defaults.allow_credentials),
                max_age: options.max_age.or(defaults.max_age),
            })
        }
    }
}
