//! Access logging for the default stage.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use httpapi_common::ConstructError;
use httpapi_core::{LogicalId, Resource, Scope, get_att};

/// Access-log line written when no format is given.
pub const DEFAULT_ACCESS_LOG_FORMAT: &str = concat!(
    r#"{"requestTime":"$context.requestTime","#,
    r#""requestId":"$context.requestId","#,
    r#""httpMethod":"$context.httpMethod","#,
    r#""path":"$context.path","#,
    r#""routeKey":"$context.routeKey","#,
    r#""status":"$context.status","#,
    r#""responseLatency":"$context.responseLatency","#,
    r#""integrationRequestId":"$context.integration.requestId","#,
    r#""integrationStatus":"$context.integration.status","#,
    r#""integrationLatency":"$context.integration.latency","#,
    r#""integrationServiceStatus":"$context.integration.integrationStatus","#,
    r#""ip":"$context.identity.sourceIp","#,
    r#""userAgent":"$context.identity.userAgent","#,
    r#""cognitoIdentityId":"$context.identity.cognitoIdentityId"}"#,
);

/// Access-log toggle: `true` for a new log group with the default format,
/// `false` for none, or options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AccessLogToggle {
    /// Enable with defaults, or disable.
    Enabled(bool),
    /// Enable with overrides.
    Options(AccessLogOptions),
}

impl From<bool> for AccessLogToggle {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<AccessLogOptions> for AccessLogToggle {
    fn from(options: AccessLogOptions) -> Self {
        Self::Options(options)
    }
}

/// Access-log overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessLogOptions {
    /// Existing log destination; a log group is created when unset.
    pub destination_arn: Option<String>,

    /// Log line format.
    pub format: Option<String>,

    /// Retention of the created log group.
    pub retention_in_days: Option<u32>,
}

/// A resolved access-log setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccessLogConfiguration {
    pub destination_arn: Option<String>,
    pub format: String,
    pub retention_in_days: Option<u32>,
}

/// Resolve the access-log toggle; `None` means no access logging.
pub(crate) fn resolve_access_log(
    toggle: Option<&AccessLogToggle>,
) -> Option<AccessLogConfiguration> {
    let options = match toggle? {
        AccessLogToggle::Enabled(false) => return None,
        AccessLogToggle::Enabled(true) => AccessLogOptions::default(),
        AccessLogToggle::Options(options) => options.clone(),
    };

    Some(AccessLogConfiguration {
        destination_arn: options.destination_arn,
        format: options
            .format
            .unwrap_or_else(|| DEFAULT_ACCESS_LOG_FORMAT.to_string()),
        retention_in_days: options.retention_in_days,
    })
}

/// Declare the log group (when needed) and build the stage's
/// `AccessLogSettings`.
pub(crate) fn declare_access_log(
    scope: &Scope,
    config: &AccessLogConfiguration,
) -> Result<(Option<LogicalId>, Value), ConstructError> {
    let (log_group, destination) = match &config.destination_arn {
        Some(arn) => (None, json!(arn)),
        None => {
            let mut properties = json!({});
            if let Some(days) = config.retention_in_days {
                properties["RetentionInDays"] = json!(days);
            }
            let id = scope
                .child("LogGroup")
                .declare(Resource::new("AWS::Logs::LogGroup", properties))?;
            debug!(log_group = %id, "Declared access log group");
            let arn = get_att(&id, "Arn");
            (Some(id), arn)
        }
    };

    let settings = json!({
        "DestinationArn": destination,
        "Format": config.format,
    });
    Ok((log_group, settings))
}
