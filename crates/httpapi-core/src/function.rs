//! Compute handles.
//!
//! A [`Function`] is a unit of backend logic declared into a stack together
//! with its execution role and a default policy. The handle is cheap to
//! clone; every clone refers to the same declared function, so permissions
//! attached through one clone are visible through all of them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use httpapi_common::ConstructError;

use crate::permissions::{Permission, PolicyStatement};
use crate::stack::{LogicalId, Resource, Scope, get_att, reference};

/// Runtime used when none is configured.
pub const DEFAULT_RUNTIME: &str = "nodejs14.x";

/// Timeout in seconds used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u32 = 10;

/// Memory in megabytes used when none is configured.
pub const DEFAULT_MEMORY_SIZE_MB: u32 = 1024;

const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Configuration of a function to create.
///
/// Every field is optional so that the same type can describe both a
/// function and the defaults applied to a family of functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionProps {
    /// Handler as `path/to/file.export` (e.g. `src/lambda.handler`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    /// Runtime identifier (e.g. `nodejs14.x`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    /// Memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,

    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Permissions attached when the function is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

impl FunctionProps {
    /// Props with only a handler set.
    pub fn from_handler(handler: impl Into<String>) -> Self {
        Self {
            handler: Some(handler.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge these props over `defaults`.
    ///
    /// - scalar fields: `self` wins when set
    /// - `environment`: merged key by key, `self` wins on conflicts
    /// - `permissions`: defaults first, then `self`
    #[must_use]
    pub fn merge_over(&self, defaults: &FunctionProps) -> FunctionProps {
        let mut environment = defaults.environment.clone();
        environment.extend(
            self.environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut permissions = defaults.permissions.clone();
        permissions.extend(self.permissions.iter().cloned());

        FunctionProps {
            handler: self.handler.clone().or_else(|| defaults.handler.clone()),
            runtime: self.runtime.clone().or_else(|| defaults.runtime.clone()),
            timeout: self.timeout.or(defaults.timeout),
            memory_size: self.memory_size.or(defaults.memory_size),
            environment,
            permissions,
        }
    }
}

impl From<&str> for FunctionProps {
    fn from(handler: &str) -> Self {
        Self::from_handler(handler)
    }
}

/// Split `src/path/file.export` into the code path and the handler name.
fn split_handler(handler: &str) -> (&str, &str) {
    match handler.rsplit_once('/') {
        Some((src_path, name)) => (src_path, name),
        None => (".", handler),
    }
}

struct FunctionInner {
    scope: Scope,
    logical_id: LogicalId,
    policy_id: LogicalId,
    handler: String,
    src_path: String,
    runtime: String,
    timeout: u32,
    memory_size: u32,
    statements: Mutex<Vec<PolicyStatement>>,
}

/// A declared function.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

impl Function {
    /// Declare a function, its execution role and its default policy.
    ///
    /// # Arguments
    ///
    /// * `scope` - Parent scope
    /// * `id` - Construct id of the function inside `scope`
    /// * `props` - Function configuration; `handler` is required
    pub fn new(scope: &Scope, id: &str, props: FunctionProps) -> Result<Self, ConstructError> {
        let handler = props
            .handler
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConstructError::MissingHandler { id: id.to_string() })?;

        let function_scope = scope.child(id);
        let role_scope = function_scope.child("ServiceRole");
        let policy_scope = role_scope.child("DefaultPolicy");
        let role_id = role_scope.logical_id();
        let policy_id = policy_scope.logical_id();

        let (src_path, handler_name) = split_handler(handler);
        let runtime = props
            .runtime
            .clone()
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string());
        let timeout = props.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let memory_size = props.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE_MB);

        let mut properties = json!({
            "Code": { "SourcePath": src_path },
            "Handler": handler_name,
            "Runtime": runtime,
            "Timeout": timeout,
            "MemorySize": memory_size,
            "Role": get_att(&role_id, "Arn"),
            "TracingConfig": { "Mode": "Active" },
        });
        if !props.environment.is_empty() {
            properties["Environment"] = json!({ "Variables": props.environment });
        }

        let logical_id = function_scope.declare(
            Resource::new("AWS::Lambda::Function", properties)
                .depends_on(role_id.clone())
                .depends_on(policy_id.clone()),
        )?;

        role_scope.declare(Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                    }],
                    "Version": "2012-10-17",
                },
                "ManagedPolicyArns": [BASIC_EXECUTION_POLICY],
            }),
        ))?;

        let mut statements = vec![PolicyStatement::tracing()];
        statements.extend(props.permissions.iter().map(Permission::to_statement));

        policy_scope.declare(Resource::new(
            "AWS::IAM::Policy",
            policy_properties(&policy_id, &role_id, &statements),
        ))?;

        debug!(
            logical_id = %logical_id,
            handler = handler_name,
            runtime = %runtime,
            timeout,
            "Declared function"
        );

        Ok(Self {
            inner: Arc::new(FunctionInner {
                scope: function_scope,
                logical_id,
                policy_id,
                handler: handler_name.to_string(),
                src_path: src_path.to_string(),
                runtime,
                timeout,
                memory_size,
                statements: Mutex::new(statements),
            }),
        })
    }

    /// Get the logical id of the function resource.
    pub fn logical_id(&self) -> &LogicalId {
        &self.inner.logical_id
    }

    /// Get the logical id of the function's default policy.
    pub fn policy_id(&self) -> &LogicalId {
        &self.inner.policy_id
    }

    /// Get the handler name (without the code path).
    pub fn handler(&self) -> &str {
        &self.inner.handler
    }

    /// Get the code path the handler lives in.
    pub fn src_path(&self) -> &str {
        &self.inner.src_path
    }

    /// Get the runtime identifier.
    pub fn runtime(&self) -> &str {
        &self.inner.runtime
    }

    /// Get the timeout in seconds.
    pub fn timeout(&self) -> u32 {
        self.inner.timeout
    }

    /// Get the memory size in megabytes.
    pub fn memory_size(&self) -> u32 {
        self.inner.memory_size
    }

    /// A reference to the function's ARN.
    pub fn arn(&self) -> Value {
        get_att(&self.inner.logical_id, "Arn")
    }

    /// Get a copy of the statements in the function's policy.
    pub fn statements(&self) -> Vec<PolicyStatement> {
        self.inner.statements.lock().clone()
    }

    /// Returns `true` if both handles refer to the same declared function.
    pub fn same_as(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Grant additional permissions to the function.
    pub fn attach_permissions(&self, permissions: &[Permission]) {
        if permissions.is_empty() {
            return;
        }

        let mut statements = self.inner.statements.lock();
        statements.extend(permissions.iter().map(Permission::to_statement));

        let role_id = self.inner.scope.child("ServiceRole").logical_id();
        let properties = policy_properties(&self.inner.policy_id, &role_id, &statements);
        let updated = self
            .inner
            .scope
            .stack()
            .update_resource(&self.inner.policy_id, |policy| {
                policy.properties = properties;
            });
        if !updated {
            warn!(
                logical_id = %self.inner.logical_id,
                policy_id = %self.inner.policy_id,
                "Function policy is missing from the stack; permissions not synthesized"
            );
        }

        debug!(
            logical_id = %self.inner.logical_id,
            added = permissions.len(),
            total = statements.len(),
            "Attached permissions"
        );
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("logical_id", &self.inner.logical_id)
            .field("handler", &self.inner.handler)
            .finish_non_exhaustive()
    }
}

fn policy_properties(
    policy_id: &LogicalId,
    role_id: &LogicalId,
    statements: &[PolicyStatement],
) -> Value {
    json!({
        "PolicyDocument": {
            "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
            "Version": "2012-10-17",
        },
        "PolicyName": policy_id,
        "Roles": [reference(role_id)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use httpapi_common::AppConfig;

    fn stack() -> Stack {
        Stack::new("stack", AppConfig::default())
    }

    #[test]
    fn test_split_handler() {
        assert_eq!(split_handler("test/lambda.handler"), ("test", "lambda.handler"));
        assert_eq!(split_handler("src/a/b.main"), ("src/a", "b.main"));
        assert_eq!(split_handler("index.handler"), (".", "index.handler"));
    }

    #[test]
    fn test_merge_scalar_precedence() {
        let defaults = FunctionProps {
            timeout: Some(3),
            runtime: Some("nodejs12.x".into()),
            ..Default::default()
        };
        let route = FunctionProps {
            handler: Some("test/lambda.handler".into()),
            timeout: Some(5),
            ..Default::default()
        };

        let merged = route.merge_over(&defaults);
        assert_eq!(merged.handler.as_deref(), Some("test/lambda.handler"));
        assert_eq!(merged.timeout, Some(5));
        assert_eq!(merged.runtime.as_deref(), Some("nodejs12.x"));
        assert_eq!(merged.memory_size, None);
    }

    #[test]
    fn test_merge_environment_and_permissions() {
        let mut defaults = FunctionProps::default();
        defaults.environment.insert("TABLE".into(), "users".into());
        defaults.environment.insert("STAGE".into(), "dev".into());
        defaults.permissions.push(Permission::service("s3"));

        let mut route = FunctionProps::from_handler("a.handler");
        route.environment.insert("STAGE".into(), "prod".into());
        route.permissions.push(Permission::service("sns"));

        let merged = route.merge_over(&defaults);
        assert_eq!(merged.environment["TABLE"], "users");
        assert_eq!(merged.environment["STAGE"], "prod");
        assert_eq!(
            merged.permissions,
            vec![Permission::service("s3"), Permission::service("sns")]
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(FunctionProps::default().is_empty());
        assert!(!FunctionProps::from_handler("a.b").is_empty());
    }

    #[test]
    fn test_new_declares_function_role_and_policy() {
        let stack = stack();
        let function = Function::new(
            &stack.root(),
            "F",
            FunctionProps {
                timeout: Some(3),
                ..FunctionProps::from_handler("test/lambda.handler")
            },
        )
        .unwrap();

        let template = stack.synthesize();
        assert_eq!(template.count_of_type("AWS::Lambda::Function"), 1);
        assert_eq!(template.count_of_type("AWS::IAM::Role"), 1);
        assert_eq!(template.count_of_type("AWS::IAM::Policy"), 1);

        let resource = template.get(function.logical_id()).unwrap();
        assert_eq!(resource.property("Handler"), Some(&json!("lambda.handler")));
        assert_eq!(resource.property("Timeout"), Some(&json!(3)));
        assert_eq!(resource.property("Runtime"), Some(&json!(DEFAULT_RUNTIME)));
        assert_eq!(function.src_path(), "test");
    }

    #[test]
    fn test_new_without_handler_fails() {
        let stack = stack();
        let err = Function::new(&stack.root(), "F", FunctionProps::default()).unwrap_err();

        assert!(matches!(err, ConstructError::MissingHandler { .. }));
        assert_eq!(stack.resource_count(), 0);
    }

    #[test]
    fn test_attach_permissions_updates_policy() {
        let stack = stack();
        let function =
            Function::new(&stack.root(), "F", FunctionProps::from_handler("a.handler")).unwrap();
        let clone = function.clone();

        clone.attach_permissions(&[Permission::service("s3")]);

        assert!(function.same_as(&clone));
        assert_eq!(function.statements().len(), 2);

        let policy = stack.resource(function.policy_id()).unwrap();
        assert_eq!(
            policy.properties["PolicyDocument"]["Statement"],
            json!([
                PolicyStatement::tracing().to_json(),
                { "Action": "s3:*", "Effect": "Allow", "Resource": "*" },
            ])
        );
        assert_eq!(policy.properties["PolicyName"], json!(function.policy_id()));
    }

    #[test]
    fn test_attach_permissions_repeatedly_keeps_policy_in_sync() {
        let stack = stack();
        let function =
            Function::new(&stack.root(), "F", FunctionProps::from_handler("a.handler")).unwrap();

        function.attach_permissions(&[Permission::service("s3")]);
        function.attach_permissions(&[]);
        function.attach_permissions(&[Permission::service("sns"), Permission::service("sqs")]);

        let policy = stack.resource(function.policy_id()).unwrap();
        let synthesized = policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap()
            .clone();
        let expected: Vec<Value> = function
            .statements()
            .iter()
            .map(PolicyStatement::to_json)
            .collect();

        assert_eq!(function.statements().len(), 4);
        assert_eq!(synthesized, expected);
    }

    #[test]
    fn test_environment_rendered() {
        let stack = stack();
        let mut props = FunctionProps::from_handler("a.handler");
        props.environment.insert("KEY".into(), "value".into());

        let function = Function::new(&stack.root(), "F", props).unwrap();
        let resource = stack.resource(function.logical_id()).unwrap();

        assert_eq!(
            resource.properties["Environment"]["Variables"]["KEY"],
            json!("value")
        );
    }
}
