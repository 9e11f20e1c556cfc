//! Application context configuration.
//!
//! [`AppConfig`] carries the settings every stack is built in: the deployment
//! stage, the application name, and the region. Resource names and
//! region-scoped values (such as Cognito issuer URLs) derive from it.

use serde::{Deserialize, Serialize};

/// Application context shared by every construct in a stack.
///
/// It can be loaded from TOML or JSON; every field has a default so an
/// empty table is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Deployment stage (e.g. `dev`, `prod`).
    #[serde(default = "defaults::stage")]
    pub stage: String,

    /// Application name.
    #[serde(default = "defaults::name")]
    pub name: String,

    /// Region the stack is deployed to.
    #[serde(default = "defaults::region")]
    pub region: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stage: defaults::stage(),
            name: defaults::name(),
            region: defaults::region(),
        }
    }
}

impl AppConfig {
    /// Build the physical name of a resource owned by this app.
    ///
    /// Names are prefixed with the stage and app name so that several
    /// stages of the same app can share an account.
    pub fn resource_name(&self, id: &str) -> String {
        format!("{}-{}-{}", self.stage, self.name, id)
    }

    /// Parse an app configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn stage() -> String {
        "dev".to_string()
    }

    pub fn name() -> String {
        "my-app".to_string()
    }

    pub fn region() -> String {
        "us-east-1".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.stage, "dev");
        assert_eq!(config.name, "my-app");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_resource_name() {
        let config = AppConfig::default();
        assert_eq!(config.resource_name("Api"), "dev-my-app-Api");

        let config = AppConfig {
            stage: "prod".into(),
            ..Default::default()
        };
        assert_eq!(config.resource_name("Api"), "prod-my-app-Api");
    }

    #[test]
    fn test_partial_deserialization() {
        let config = AppConfig::from_toml(r#"region = "eu-west-1""#).unwrap();

        // Explicitly set value
        assert_eq!(config.region, "eu-west-1");
        // Default values for unspecified fields
        assert_eq!(config.stage, "dev");
        assert_eq!(config.name, "my-app");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, deserialized);
    }
}
