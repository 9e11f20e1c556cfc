//! Route table parsing and function resolution.
//!
//! A route table maps route keys (`"GET /users/{id}"`) to route values. A
//! route value names the function that serves the route in one of four
//! shapes, optionally wrapped with a per-route authorization override:
//!
//! ```text
//! "src/list.handler"                        handler string
//! { handler = "src/list.handler", ... }     function props
//! Function                                  pre-built handle (programmatic only)
//! { function = ..., authorization_type = }  any of the above plus overrides
//! ```
//!
//! Tables are told apart by their keys: a table with a `function` key is a
//! route override, any other table is function props. Every shape is
//! discriminated once, in [`RouteValue::into_parts`], and resolved to a
//! [`FunctionSource`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use httpapi_common::ConstructError;
use httpapi_core::{Function, FunctionProps};

use crate::authorization::{
    AuthorizationType, DefaultAuthorization, HttpAuthorizer, ResolvedAuthorization,
    RouteAuthorization, resolve_route_authorization,
};

/// HTTP methods a route can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Any,
}

impl HttpMethod {
    /// Parse an uppercase method name.
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "ANY" => Some(Self::Any),
            _ => None,
        }
    }

    /// Get the method name as written in route keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `METHOD /path` route key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    method: HttpMethod,
    path: String,
}

impl RouteKey {
    /// Parse a route key.
    ///
    /// Whitespace between the method and the path is collapsed, so
    /// `"GET  /"` and `"GET /"` parse to the same key. Whitespace before the
    /// method or after the path counts as an extra token.
    ///
    /// # Errors
    ///
    /// - [`ConstructError::InvalidRoute`] if the key is not two tokens
    /// - [`ConstructError::InvalidMethod`] if the method is not supported
    /// - [`ConstructError::InvalidPath`] if the path is empty or not absolute
    pub fn parse(key: &str) -> Result<Self, ConstructError> {
        let Some((method, rest)) = key.split_once(char::is_whitespace) else {
            return Err(ConstructError::invalid_route(key));
        };

        let path = rest.trim_start();
        if method.is_empty() || path.contains(char::is_whitespace) {
            return Err(ConstructError::invalid_route(key));
        }

        let method = HttpMethod::parse(method).ok_or_else(|| ConstructError::invalid_method(key))?;

        if !path.starts_with('/') {
            return Err(ConstructError::invalid_path(key));
        }

        Ok(Self {
            method,
            path: path.to_string(),
        })
    }

    /// Get the method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Get the path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Suffix used to name the constructs declared for this route.
    pub(crate) fn construct_suffix(&self) -> String {
        format!("{}_{}", self.method, self.path)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Normalize a route key for lookups; `None` if it does not parse.
pub fn normalize_route_key(key: &str) -> Option<String> {
    RouteKey::parse(key).ok().map(|k| k.to_string())
}

/// The function that serves a route.
#[derive(Debug, Clone)]
pub enum RouteFunction {
    /// A handler string; a function is created for it.
    Handler(String),
    /// Function props; a function is created from them.
    Props(FunctionProps),
    /// A pre-built function, reused as-is.
    Function(Function),
}

impl<'de> Deserialize<'de> for RouteFunction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RouteFunctionVisitor)
    }
}

struct RouteFunctionVisitor;

impl<'de> Visitor<'de> for RouteFunctionVisitor {
    type Value = RouteFunction;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a handler string or a table of function props")
    }

    fn visit_str<E: de::Error>(self, handler: &str) -> Result<Self::Value, E> {
        Ok(RouteFunction::Handler(handler.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        from_table(collect_table(map)?).map(RouteFunction::Props)
    }
}

impl From<&str> for RouteFunction {
    fn from(handler: &str) -> Self {
        Self::Handler(handler.to_string())
    }
}

impl From<FunctionProps> for RouteFunction {
    fn from(props: FunctionProps) -> Self {
        Self::Props(props)
    }
}

impl From<Function> for RouteFunction {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

/// A function plus a per-route authorization override.
///
/// Every override that is set replaces the API default for this route only.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteProps {
    /// The function serving the route.
    pub function: RouteFunction,

    /// Authorization type for this route.
    #[serde(default)]
    pub authorization_type: Option<AuthorizationType>,

    /// Authorizer for this route.
    #[serde(default)]
    pub authorizer: Option<HttpAuthorizer>,

    /// JWT scopes for this route.
    #[serde(default)]
    pub authorization_scopes: Option<Vec<String>>,
}

impl RouteProps {
    /// Route props with no authorization override.
    pub fn new(function: impl Into<RouteFunction>) -> Self {
        Self {
            function: function.into(),
            authorization_type: None,
            authorizer: None,
            authorization_scopes: None,
        }
    }

    /// Override the authorization type.
    #[must_use]
    pub fn authorization_type(mut self, authorization_type: AuthorizationType) -> Self {
        self.authorization_type = Some(authorization_type);
        self
    }

    /// Override the authorizer.
    #[must_use]
    pub fn authorizer(mut self, authorizer: HttpAuthorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Override the JWT scopes.
    #[must_use]
    pub fn authorization_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorization_scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }
}

/// A value in the route table.
#[derive(Debug, Clone)]
pub enum RouteValue {
    /// A handler string.
    Handler(String),
    /// A function plus authorization overrides.
    Route(RouteProps),
    /// Function props.
    Props(FunctionProps),
    /// A pre-built function.
    Function(Function),
}

impl<'de> Deserialize<'de> for RouteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RouteValueVisitor)
    }
}

struct RouteValueVisitor;

impl<'de> Visitor<'de> for RouteValueVisitor {
    type Value = RouteValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a handler string or a table of function or route props")
    }

    fn visit_str<E: de::Error>(self, handler: &str) -> Result<Self::Value, E> {
        Ok(RouteValue::Handler(handler.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        let table = collect_table(map)?;
        if table.contains_key("function") {
            from_table(table).map(RouteValue::Route)
        } else {
            from_table(table).map(RouteValue::Props)
        }
    }
}

/// Buffer a table so its keys can pick the shape before it is decoded.
fn collect_table<'de, A: MapAccess<'de>>(mut map: A) -> Result<Map<String, Value>, A::Error> {
    let mut table = Map::new();
    while let Some((key, value)) = map.next_entry::<String, Value>()? {
        table.insert(key, value);
    }
    Ok(table)
}

/// Decode a buffered table, keeping the shape's own error message.
fn from_table<T: DeserializeOwned, E: de::Error>(table: Map<String, Value>) -> Result<T, E> {
    T::deserialize(Value::Object(table)).map_err(E::custom)
}

impl RouteValue {
    /// Split the value into the function and the authorization override.
    pub(crate) fn into_parts(self) -> (RouteFunction, RouteAuthorization) {
        match self {
            Self::Handler(handler) => (RouteFunction::Handler(handler), RouteAuthorization::default()),
            Self::Props(props) => (RouteFunction::Props(props), RouteAuthorization::default()),
            Self::Function(function) => (
                RouteFunction::Function(function),
                RouteAuthorization::default(),
            ),
            Self::Route(route) => (
                route.function,
                RouteAuthorization {
                    authorization_type: route.authorization_type,
                    authorizer: route.authorizer,
                    scopes: route.authorization_scopes,
                },
            ),
        }
    }
}

impl From<&str> for RouteValue {
    fn from(handler: &str) -> Self {
        Self::Handler(handler.to_string())
    }
}

impl From<FunctionProps> for RouteValue {
    fn from(props: FunctionProps) -> Self {
        Self::Props(props)
    }
}

impl From<Function> for RouteValue {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<RouteProps> for RouteValue {
    fn from(route: RouteProps) -> Self {
        Self::Route(route)
    }
}

/// Where a route's function comes from.
#[derive(Debug, Clone)]
pub(crate) enum FunctionSource {
    /// Reuse a pre-built function.
    Existing(Function),
    /// Create a function from fully merged props.
    Create(FunctionProps),
}

/// A route that passed validation and is ready to be declared.
#[derive(Debug, Clone)]
pub(crate) struct PlannedRoute {
    pub key: RouteKey,
    pub source: FunctionSource,
    pub authorization: ResolvedAuthorization,
}

/// Defaults applied to every route of an API.
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteDefaults {
    pub function_props: Option<FunctionProps>,
    pub authorization: DefaultAuthorization,
}

/// Resolve the function of one route.
///
/// A pre-built function cannot be combined with default function props. Any
/// other shape is merged over the defaults and must end up with a handler.
pub(crate) fn resolve_function(
    key: &str,
    function: RouteFunction,
    defaults: Option<&FunctionProps>,
) -> Result<FunctionSource, ConstructError> {
    let props = match function {
        RouteFunction::Function(function) => {
            if defaults.is_some() {
                return Err(ConstructError::DefaultFunctionPropsConflict {
                    key: key.to_string(),
                });
            }
            return Ok(FunctionSource::Existing(function));
        }
        RouteFunction::Handler(handler) => FunctionProps::from_handler(handler),
        RouteFunction::Props(props) => props,
    };

    let merged = match defaults {
        Some(defaults) => props.merge_over(defaults),
        None => props,
    };

    let has_handler = merged
        .handler
        .as_deref()
        .is_some_and(|h| !h.trim().is_empty());
    if !has_handler {
        return Err(ConstructError::InvalidFunctionDefinition {
            key: key.to_string(),
        });
    }

    Ok(FunctionSource::Create(merged))
}

/// Validate and resolve a route table.
///
/// `existing` holds the normalized keys already bound on the API; a route
/// that normalizes to one of them, or to another key in `routes`, fails.
pub(crate) fn plan_routes(
    routes: BTreeMap<String, RouteValue>,
    existing: &BTreeSet<String>,
    defaults: &RouteDefaults,
) -> Result<Vec<PlannedRoute>, ConstructError> {
    let mut seen = existing.clone();
    let mut planned = Vec::with_capacity(routes.len());

    for (raw_key, value) in routes {
        let key = RouteKey::parse(&raw_key)?;
        let normalized = key.to_string();
        if !seen.insert(normalized.clone()) {
            return Err(ConstructError::DuplicateRoute { key: normalized });
        }

        let (function, overrides) = value.into_parts();
        let source = resolve_function(&raw_key, function, defaults.function_props.as_ref())?;
        let authorization =
            resolve_route_authorization(&normalized, &defaults.authorization, &overrides)?;

        debug!(
            route = %normalized,
            reuses_function = matches!(source, FunctionSource::Existing(_)),
            authorization = %authorization.authorization_type,
            "Planned route"
        );

        planned.push(PlannedRoute {
            key,
            source,
            authorization,
        });
    }

    Ok(planned)
}
