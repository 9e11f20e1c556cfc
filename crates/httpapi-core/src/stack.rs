//! Stacks, scopes and declared resources.
//!
//! A [`Stack`] owns every resource declared into it. Constructs never touch
//! the stack directly; they receive a [`Scope`] (a path inside the stack) and
//! declare resources under it. The scope path determines the resource's
//! [`LogicalId`], so the same construct tree always synthesizes the same
//! template.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use httpapi_common::{AppConfig, ConstructError};

use crate::dns::{HostedZone, StaticZoneLookup, ZoneLookup};

/// Identifier of a resource inside a synthesized template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `{"Ref": id}` reference to a declared resource.
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id })
}

/// A `{"Fn::GetAtt": [id, attribute]}` reference to a resource attribute.
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Resource type (e.g. `AWS::ApiGatewayV2::Api`).
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Resource properties.
    #[serde(rename = "Properties")]
    pub properties: Value,

    /// Resources that must be created before this one.
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
}

impl Resource {
    /// Create a resource with the given type and properties.
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
        }
    }

    /// Add an explicit dependency on another resource.
    #[must_use]
    pub fn depends_on(mut self, id: LogicalId) -> Self {
        self.depends_on.push(id);
        self
    }

    /// Get a top-level property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// The synthesized output of a stack.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Template {
    /// Every declared resource keyed by logical id.
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, Resource>,
}

impl Template {
    /// Iterate over resources of the given type.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Count resources of the given type.
    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// Get a resource by logical id.
    pub fn get(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }
}

struct StackInner {
    name: String,
    app: AppConfig,
    zones: Box<dyn ZoneLookup>,
    resources: Mutex<BTreeMap<LogicalId, Resource>>,
    claimed: Mutex<BTreeSet<String>>,
}

/// A unit of deployment owning a graph of declared resources.
///
/// `Stack` is a cheap handle; clones share the same resources.
#[derive(Clone)]
pub struct Stack {
    inner: Arc<StackInner>,
}

impl Stack {
    /// Create a stack with no hosted zones available for lookup.
    pub fn new(name: impl Into<String>, app: AppConfig) -> Self {
        Self::with_zone_lookup(name, app, StaticZoneLookup::default())
    }

    /// Create a stack that resolves hosted zones through `zones`.
    pub fn with_zone_lookup(
        name: impl Into<String>,
        app: AppConfig,
        zones: impl ZoneLookup + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(StackInner {
                name: name.into(),
                app,
                zones: Box::new(zones),
                resources: Mutex::new(BTreeMap::new()),
                claimed: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// Get the stack name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the application context.
    pub fn app(&self) -> &AppConfig {
        &self.inner.app
    }

    /// Get the root scope of the stack.
    pub fn root(&self) -> Scope {
        Scope {
            stack: self.clone(),
            path: Vec::new(),
        }
    }

    /// Look up a hosted zone by name.
    pub fn lookup_hosted_zone(&self, name: &str) -> Option<HostedZone> {
        let zone = self.inner.zones.lookup(name);
        debug!(zone = name, found = zone.is_some(), "Hosted zone lookup");
        zone
    }

    /// Get a copy of a declared resource.
    pub fn resource(&self, id: &LogicalId) -> Option<Resource> {
        self.inner.resources.lock().get(id).cloned()
    }

    /// Apply `f` to a declared resource.
    ///
    /// Returns `false` if no resource with that id exists.
    pub fn update_resource(&self, id: &LogicalId, f: impl FnOnce(&mut Resource)) -> bool {
        match self.inner.resources.lock().get_mut(id) {
            Some(resource) => {
                f(resource);
                true
            }
            None => false,
        }
    }

    /// Number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.inner.resources.lock().len()
    }

    /// Snapshot every declared resource into a template.
    pub fn synthesize(&self) -> Template {
        Template {
            resources: self.inner.resources.lock().clone(),
        }
    }

    fn is_claimed(&self, path: &str) -> bool {
        self.inner.claimed.lock().contains(path)
    }

    fn claim(&self, path: &str) -> Result<(), ConstructError> {
        if self.inner.claimed.lock().insert(path.to_string()) {
            Ok(())
        } else {
            Err(ConstructError::DuplicateConstructId {
                path: path.to_string(),
            })
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("name", &self.inner.name)
            .field("resources_count", &self.resource_count())
            .finish_non_exhaustive()
    }
}

/// A path inside a stack under which resources are declared.
///
/// Scopes are passed explicitly from parent to child construct; there is no
/// ambient registry.
#[derive(Clone)]
pub struct Scope {
    stack: Stack,
    path: Vec<String>,
}

impl Scope {
    /// Get the stack this scope belongs to.
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Get the last path segment (the stack name for the root scope).
    pub fn id(&self) -> &str {
        self.path.last().map_or(self.stack.name(), String::as_str)
    }

    /// Get the full path joined with `/`.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    /// Create a child scope.
    #[must_use]
    pub fn child(&self, id: &str) -> Scope {
        let mut path = self.path.clone();
        path.push(id.to_string());
        Scope {
            stack: self.stack.clone(),
            path,
        }
    }

    /// Derive the logical id for this scope.
    ///
    /// The id is every path segment stripped to ASCII alphanumerics, followed
    /// by eight hex characters derived from the full path. Segments that only
    /// differ in punctuation (`GET /a-b` and `GET /ab`) still get distinct ids.
    pub fn logical_id(&self) -> LogicalId {
        let path = self.path();
        let human: String = self
            .path
            .iter()
            .flat_map(|segment| segment.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect();

        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, path.as_bytes())
            .simple()
            .to_string()
            .to_uppercase();

        LogicalId(format!("{human}{}", &digest[..8]))
    }

    /// Returns `true` if a construct or resource already occupies this path.
    pub fn is_claimed(&self) -> bool {
        self.stack.is_claimed(&self.path())
    }

    /// Reserve this path for a construct that declares its resources in
    /// child scopes.
    pub fn claim(&self) -> Result<(), ConstructError> {
        self.stack.claim(&self.path())
    }

    /// Declare a resource at this path.
    pub fn declare(&self, resource: Resource) -> Result<LogicalId, ConstructError> {
        self.claim()?;

        let id = self.logical_id();
        debug!(
            logical_id = %id,
            resource_type = %resource.resource_type,
            path = %self.path(),
            "Declared resource"
        );
        self.stack.inner.resources.lock().insert(id.clone(), resource);
        Ok(id)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("stack", &self.stack.name())
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> Stack {
        Stack::new("stack", AppConfig::default())
    }

    #[test]
    fn test_logical_id_is_stable() {
        let stack = stack();
        let a = stack.root().child("Api").child("Lambda_GET_/");
        let b = stack.root().child("Api").child("Lambda_GET_/");

        assert_eq!(a.logical_id(), b.logical_id());
        assert!(a.logical_id().as_str().starts_with("ApiLambdaGET"));
        assert_eq!(a.logical_id().as_str().len(), "ApiLambdaGET".len() + 8);
    }

    #[test]
    fn test_logical_id_disambiguates_punctuation() {
        let stack = stack();
        let a = stack.root().child("Lambda_GET_/a-b");
        let b = stack.root().child("Lambda_GET_/ab");

        assert_ne!(a.logical_id(), b.logical_id());
    }

    #[test]
    fn test_declare_and_synthesize() {
        let stack = stack();
        let scope = stack.root().child("Bucket");

        let id = scope
            .declare(Resource::new("AWS::S3::Bucket", json!({ "BucketName": "b" })))
            .unwrap();

        let template = stack.synthesize();
        assert_eq!(template.count_of_type("AWS::S3::Bucket"), 1);
        assert_eq!(
            template.get(&id).unwrap().property("BucketName"),
            Some(&json!("b"))
        );
    }

    #[test]
    fn test_duplicate_declaration_fails() {
        let stack = stack();
        let scope = stack.root().child("Bucket");

        scope
            .declare(Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        let err = scope
            .declare(Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap_err();

        assert!(matches!(err, ConstructError::DuplicateConstructId { .. }));
        assert_eq!(stack.resource_count(), 1);
    }

    #[test]
    fn test_update_resource() {
        let stack = stack();
        let id = stack
            .root()
            .child("Queue")
            .declare(Resource::new("AWS::SQS::Queue", json!({})))
            .unwrap();

        let updated = stack.update_resource(&id, |r| {
            r.properties["DelaySeconds"] = json!(5);
        });
        assert!(updated);
        assert_eq!(
            stack.resource(&id).unwrap().property("DelaySeconds"),
            Some(&json!(5))
        );

        let missing = stack.root().child("Missing").logical_id();
        assert!(!stack.update_resource(&missing, |_| {}));
    }

    #[test]
    fn test_template_serialization() {
        let stack = stack();
        let role = stack
            .root()
            .child("Role")
            .declare(Resource::new("AWS::IAM::Role", json!({})))
            .unwrap();
        stack
            .root()
            .child("Fn")
            .declare(
                Resource::new("AWS::Lambda::Function", json!({ "Role": get_att(&role, "Arn") }))
                    .depends_on(role.clone()),
            )
            .unwrap();

        let json = serde_json::to_value(stack.synthesize()).unwrap();
        let resources = json["Resources"].as_object().unwrap();
        assert_eq!(resources.len(), 2);

        let function = resources
            .values()
            .find(|r| r["Type"] == "AWS::Lambda::Function")
            .unwrap();
        assert_eq!(function["Properties"]["Role"]["Fn::GetAtt"][0], json!(role));
        assert_eq!(function["DependsOn"], json!([role]));
    }

    #[test]
    fn test_scope_id_and_path() {
        let stack = stack();
        assert_eq!(stack.root().id(), "stack");

        let scope = stack.root().child("Api").child("HttpApi");
        assert_eq!(scope.id(), "HttpApi");
        assert_eq!(scope.path(), "Api/HttpApi");
        assert_eq!(reference(&scope.logical_id())["Ref"], json!(scope.logical_id()));
    }
}
