//! Synth file structures.
//!
//! A synth file declares a stack and the APIs built into it:
//! - [`ConfigFile`]: top-level file structure
//! - [`HostedZoneEntry`]: a hosted zone available for custom domains
//! - [`ApiEntry`]: an API and its props

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use httpapi_common::{AppConfig, ConstructError};
use httpapi_core::{HostedZone, Stack, StaticZoneLookup};

use crate::api::{Api, ApiProps};

/// Top-level synth file structure.
///
/// # Example
///
/// ```toml
/// stack = "backend"
///
/// [app]
/// stage = "prod"
/// name = "shop"
///
/// [[hosted_zones]]
/// name = "domain.com"
/// id = "Z0123456789ABC"
///
/// [[apis]]
/// id = "Api"
///
/// [apis.props]
/// custom_domain = "api.domain.com"
/// cors = true
///
/// [apis.props.routes]
/// "GET /items" = "src/items.list"
/// "POST /items" = { handler = "src/items.create", timeout = 20 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Application context.
    #[serde(default)]
    pub app: AppConfig,

    /// Stack name.
    #[serde(default = "defaults::stack")]
    pub stack: String,

    /// Hosted zones custom domains can be served from.
    #[serde(default)]
    pub hosted_zones: Vec<HostedZoneEntry>,

    /// APIs to build, in order.
    #[serde(default)]
    pub apis: Vec<ApiEntry>,
}

impl ConfigFile {
    /// Load a synth file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse a synth file from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }

    /// A zone lookup over the declared hosted zones.
    #[must_use]
    pub fn zone_lookup(&self) -> StaticZoneLookup {
        self.hosted_zones
            .iter()
            .fold(StaticZoneLookup::new(), |lookup, zone| {
                lookup.with_zone(HostedZone::new(zone.id.clone(), &zone.name))
            })
    }

    /// Build every API into a new stack.
    ///
    /// # Errors
    ///
    /// Stops at the first API that fails to construct.
    pub fn build(&self) -> Result<(Stack, Vec<Api>), ConstructError> {
        let stack = Stack::with_zone_lookup(&self.stack, self.app.clone(), self.zone_lookup());

        let apis = self
            .apis
            .iter()
            .map(|entry| Api::new(&stack.root(), &entry.id, entry.props.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            stack = %self.stack,
            stage = %self.app.stage,
            apis = apis.len(),
            resources = stack.resource_count(),
            "Built stack"
        );

        Ok((stack, apis))
    }
}

/// A hosted zone entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostedZoneEntry {
    /// Zone name (e.g. `domain.com`).
    pub name: String,

    /// Zone id.
    pub id: String,
}

/// An API entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiEntry {
    /// Construct id of the API.
    pub id: String,

    /// API props.
    #[serde(default)]
    pub props: ApiProps,
}

/// Synth file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read the synth file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the synth file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn stack() -> String {
        "stack".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpapi_core::ZoneLookup;

    #[test]
    fn test_parse_minimal_file() {
        let toml = r#"
            [[apis]]
            id = "Api"

            [apis.props.routes]
            "GET /" = "src/lambda.handler"
        "#;

        let file = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(file.stack, "stack");
        assert_eq!(file.app, AppConfig::default());
        assert!(file.hosted_zones.is_empty());
        assert_eq!(file.apis.len(), 1);
        assert_eq!(file.apis[0].id, "Api");
    }

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            stack = "backend"

            [app]
            stage = "prod"
            name = "shop"
            region = "eu-west-1"

            [[hosted_zones]]
            name = "domain.com."
            id = "Z1"

            [[apis]]
            id = "Api"

            [apis.props]
            custom_domain = { domain_name = "api.domain.com", path = "v1" }
            access_log = true
            default_authorization_type = "JWT"
            default_authorization_scopes = ["user.id"]

            [apis.props.default_authorizer]
            type = "jwt"
            audience = ["123"]
            issuer = "https://abc.us.auth0.com"

            [apis.props.routes]
            "GET /items" = "src/items.list"
            "POST /items" = { function = "src/items.create", authorization_type = "NONE" }
        "#;

        let file = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(file.stack, "backend");
        assert_eq!(file.app.resource_name("Api"), "prod-shop-Api");
        assert_eq!(file.zone_lookup().lookup("domain.com").unwrap().zone_id, "Z1");

        let props = &file.apis[0].props;
        assert!(props.custom_domain.is_some());
        assert!(props.default_authorizer.is_some());
        assert_eq!(props.routes.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_build() {
        let toml = r#"
            [[hosted_zones]]
            name = "domain.com"
            id = "Z1"

            [[apis]]
            id = "Api"

            [apis.props]
            custom_domain = "api.domain.com"

            [apis.props.routes]
            "GET /" = "src/lambda.handler"

            [[apis]]
            id = "Admin"

            [apis.props.routes]
            "GET /admin" = "src/admin.handler"
        "#;

        let (stack, apis) = ConfigFile::from_toml(toml).unwrap().build().unwrap();

        assert_eq!(apis.len(), 2);
        assert_eq!(apis[0].custom_domain_url().as_deref(), Some("https://api.domain.com"));
        assert_eq!(
            stack
                .synthesize()
                .count_of_type("AWS::ApiGatewayV2::Api"),
            2
        );
    }

    #[test]
    fn test_build_propagates_construct_errors() {
        let toml = r#"
            [[apis]]
            id = "Api"

            [apis.props]
            custom_domain = "api.domain.com"

            [apis.props.routes]
            "GET /" = "src/lambda.handler"
        "#;

        let err = ConfigFile::from_toml(toml).unwrap().build().unwrap_err();
        assert_eq!(err, ConstructError::hosted_zone_not_found("domain.com"));
    }

    #[test]
    fn test_build_demo_file() {
        let file = ConfigFile::from_toml(include_str!("../../../demos/synth.toml")).unwrap();
        let (stack, apis) = file.build().unwrap();
        let template = stack.synthesize();

        assert_eq!(apis[0].routes().count(), 3);
        assert_eq!(
            apis[0].custom_domain_url().as_deref(),
            Some("https://api.domain.com/v1")
        );
        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::Authorizer"), 1);
        assert_eq!(template.count_of_type("AWS::Logs::LogGroup"), 1);
    }

    #[test]
    fn test_parse_route_authorization_type_error() {
        let toml = r#"
            [[apis]]
            id = "Api"

            [apis.props.routes]
            "GET /" = { function = { handler = "test/lambda.handler" }, authorization_type = "ABC" }
        "#;

        let err = ConfigFile::from_toml(toml).unwrap_err();
        let ConfigFileError::Parse { message } = err else {
            panic!("expected a parse error");
        };
        assert!(message.contains("does not currently support ABC"), "{message}");
    }

    #[test]
    fn test_parse_unknown_field() {
        let result = ConfigFile::from_toml("unknown = 1");
        assert!(matches!(result, Err(ConfigFileError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigFile::from_file("/nonexistent/synth.toml");
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
