//! Capability-based permissions for compute handles.
//!
//! This module provides [`Permission`], which describes what a function is
//! allowed to do, and [`PolicyStatement`], the fine-grained form every
//! permission is lowered to before it lands in the function's policy.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Whether a statement grants or denies its actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// A fine-grained policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyStatement {
    /// Allow or deny.
    #[serde(default)]
    pub effect: Effect,

    /// Actions the statement applies to (e.g. `s3:GetObject`).
    pub actions: Vec<String>,

    /// Resources the statement applies to. Defaults to `*`.
    #[serde(default = "defaults::resources")]
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// Start building an `Allow` statement.
    pub fn allow() -> PolicyStatementBuilder {
        PolicyStatementBuilder::new(Effect::Allow)
    }

    /// Start building a `Deny` statement.
    pub fn deny() -> PolicyStatementBuilder {
        PolicyStatementBuilder::new(Effect::Deny)
    }

    /// The statement every function carries so it can emit traces.
    pub fn tracing() -> Self {
        Self::allow()
            .actions(["xray:PutTraceSegments", "xray:PutTelemetryRecords"])
            .build()
    }

    /// Render the statement as a policy-document entry.
    ///
    /// Single-element action and resource lists are written as plain strings.
    pub fn to_json(&self) -> Value {
        json!({
            "Action": collapse(&self.actions),
            "Effect": self.effect,
            "Resource": collapse(&self.resources),
        })
    }
}

fn collapse(values: &[String]) -> Value {
    match values {
        [single] => Value::String(single.clone()),
        _ => json!(values),
    }
}

/// Builder for [`PolicyStatement`].
#[derive(Debug)]
pub struct PolicyStatementBuilder {
    inner: PolicyStatement,
}

impl PolicyStatementBuilder {
    fn new(effect: Effect) -> Self {
        Self {
            inner: PolicyStatement {
                effect,
                actions: Vec::new(),
                resources: Vec::new(),
            },
        }
    }

    /// Add one action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.inner.actions.push(action.into());
        self
    }

    /// Add several actions.
    #[must_use]
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Add one resource.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.inner.resources.push(resource.into());
        self
    }

    /// Build the statement. Without explicit resources it applies to `*`.
    #[must_use]
    pub fn build(mut self) -> PolicyStatement {
        if self.inner.resources.is_empty() {
            self.inner.resources = defaults::resources();
        }
        self.inner
    }
}

/// A permission granted to a function.
///
/// Coarse permissions name a service (`"s3"`) and grant every action on it;
/// `"*"` grants everything. Statements pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Permission {
    /// Every action of a service, or `*` for all services.
    Service(String),
    /// An explicit statement.
    Statement(PolicyStatement),
}

impl Permission {
    /// Grant every action of `service`.
    pub fn service(service: impl Into<String>) -> Self {
        Self::Service(service.into())
    }

    /// Grant every action on every service.
    pub fn all() -> Self {
        Self::Service("*".to_string())
    }

    /// Lower the permission to a policy statement.
    pub fn to_statement(&self) -> PolicyStatement {
        match self {
            Self::Service(service) if service == "*" => PolicyStatement::allow().action("*").build(),
            Self::Service(service) => PolicyStatement::allow()
                .action(format!("{service}:*"))
                .build(),
            Self::Statement(statement) => statement.clone(),
        }
    }
}

impl From<&str> for Permission {
    fn from(service: &str) -> Self {
        Self::service(service)
    }
}

impl From<PolicyStatement> for Permission {
    fn from(statement: PolicyStatement) -> Self {
        Self::Statement(statement)
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn resources() -> Vec<String> {
        vec!["*".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_permission() {
        let statement = Permission::service("s3").to_statement();

        assert_eq!(
            statement.to_json(),
            json!({ "Action": "s3:*", "Effect": "Allow", "Resource": "*" })
        );
    }

    #[test]
    fn test_all_permission() {
        let statement = Permission::all().to_statement();
        assert_eq!(statement.actions, vec!["*"]);
        assert_eq!(statement.resources, vec!["*"]);
    }

    #[test]
    fn test_tracing_statement() {
        assert_eq!(
            PolicyStatement::tracing().to_json(),
            json!({
                "Action": ["xray:PutTraceSegments", "xray:PutTelemetryRecords"],
                "Effect": "Allow",
                "Resource": "*",
            })
        );
    }

    #[test]
    fn test_builder() {
        let statement = PolicyStatement::deny()
            .action("dynamodb:DeleteItem")
            .resource("arn:aws:dynamodb:us-east-1:123:table/a")
            .resource("arn:aws:dynamodb:us-east-1:123:table/b")
            .build();

        assert_eq!(statement.effect, Effect::Deny);
        assert_eq!(
            statement.to_json()["Resource"],
            json!([
                "arn:aws:dynamodb:us-east-1:123:table/a",
                "arn:aws:dynamodb:us-east-1:123:table/b"
            ])
        );
    }

    #[test]
    fn test_statement_passes_through() {
        let statement = PolicyStatement::allow().action("sns:Publish").build();
        let permission: Permission = statement.clone().into();

        assert_eq!(permission.to_statement(), statement);
    }

    #[test]
    fn test_deserialize_mixed_permissions() {
        let json = r#"["s3", {"actions": ["sqs:SendMessage"]}]"#;
        let permissions: Vec<Permission> = serde_json::from_str(json).unwrap();

        assert_eq!(permissions[0], Permission::service("s3"));
        match &permissions[1] {
            Permission::Statement(s) => {
                assert_eq!(s.effect, Effect::Allow);
                assert_eq!(s.resources, vec!["*"]);
            }
            Permission::Service(_) => panic!("expected a statement"),
        }
    }
}
