//! The HTTP API construct.
//!
//! [`Api::new`] runs in two phases. The plan phase validates every input and
//! performs the hosted-zone lookup without declaring anything; the declare
//! phase then writes the resources. A failed construction leaves the stack
//! exactly as it was.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use httpapi_common::ConstructError;
use httpapi_core::{
    Function, FunctionProps, LogicalId, Permission, Resource, Scope, get_att, reference,
};

use crate::access_log::{
    AccessLogConfiguration, AccessLogToggle, declare_access_log, resolve_access_log,
};
use crate::authorization::{
    AuthorizationType, AuthorizerRegistry, DefaultAuthorization, HttpAuthorizer,
};
use crate::cors::{CorsConfiguration, CorsToggle, resolve_cors};
use crate::domain::{CustomDomain, DomainResources, PlannedDomain, declare_domain, plan_domain};
use crate::route::{
    FunctionSource, PlannedRoute, RouteDefaults, RouteValue, normalize_route_key, plan_routes,
};

/// Child ids the construct declares its own resources under.
const RESERVED_IDS: [&str; 6] = [
    "HttpApi",
    "LogGroup",
    "Certificate",
    "DomainName",
    "ApiMapping",
    "AliasRecord",
];

/// Prefixes of the child ids declared per route.
const ROUTE_PREFIXES: [&str; 4] = ["Lambda_", "Integration_", "Route_", "Permission_"];

fn is_reserved_id(id: &str) -> bool {
    RESERVED_IDS.contains(&id) || ROUTE_PREFIXES.iter().any(|p| id.starts_with(p))
}

/// An HTTP API created outside this construct.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportedHttpApi {
    /// Id of the existing HTTP API.
    pub api_id: String,
}

impl ImportedHttpApi {
    /// Import the HTTP API with the given id.
    pub fn new(api_id: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
        }
    }
}

/// Configuration of an [`Api`].
///
/// Only `routes` is required. `cors`, `access_log` and `custom_domain`
/// configure the HTTP API itself, so they cannot be combined with
/// `http_api`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiProps {
    /// Route table keyed by `METHOD /path`.
    pub routes: Option<BTreeMap<String, RouteValue>>,

    /// Custom domain.
    pub custom_domain: Option<CustomDomain>,

    /// CORS toggle; absent when unset.
    pub cors: Option<CorsToggle>,

    /// Access-log toggle; absent when unset.
    pub access_log: Option<AccessLogToggle>,

    /// Attach the routes to an existing HTTP API instead of creating one.
    pub http_api: Option<ImportedHttpApi>,

    /// Authorization type of routes without an override. `NONE` when unset.
    pub default_authorization_type: Option<AuthorizationType>,

    /// Authorizer of JWT routes without an override.
    pub default_authorizer: Option<HttpAuthorizer>,

    /// Scopes of JWT routes without an override.
    pub default_authorization_scopes: Option<Vec<String>>,

    /// Props every created function is merged over.
    pub default_function_props: Option<FunctionProps>,
}

impl ApiProps {
    /// Props with the given routes and nothing else.
    pub fn with_routes<I, K, V>(routes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RouteValue>,
    {
        Self {
            routes: Some(
                routes
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Add a route.
    #[must_use]
    pub fn route(mut self, key: impl Into<String>, value: impl Into<RouteValue>) -> Self {
        self.routes
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Everything [`Api::new`] resolved before declaring resources.
struct ApiPlan {
    imported: Option<ImportedHttpApi>,
    domain: Option<PlannedDomain>,
    cors: Option<CorsConfiguration>,
    access_log: Option<AccessLogConfiguration>,
    defaults: RouteDefaults,
    routes: Vec<PlannedRoute>,
}

/// An HTTP API with one function per route.
pub struct Api {
    scope: Scope,
    id: String,
    api_id: Value,
    http_api: Option<LogicalId>,
    stage: Option<LogicalId>,
    access_log_group: Option<LogicalId>,
    domain: Option<(PlannedDomain, DomainResources)>,
    defaults: RouteDefaults,
    authorizers: AuthorizerRegistry,
    functions: BTreeMap<String, Function>,
}

impl Api {
    /// Construct an API under `scope`.
    ///
    /// # Arguments
    ///
    /// * `scope` - Parent scope
    /// * `id` - Construct id; names the HTTP API and prefixes every resource
    /// * `props` - API configuration
    pub fn new(scope: &Scope, id: &str, props: ApiProps) -> Result<Self, ConstructError> {
        let api_scope = scope.child(id);
        let plan = Self::plan(&api_scope, props)?;
        Self::declare(api_scope, id, plan)
    }

    fn plan(api_scope: &Scope, props: ApiProps) -> Result<ApiPlan, ConstructError> {
        if api_scope.is_claimed() {
            return Err(ConstructError::DuplicateConstructId {
                path: api_scope.path(),
            });
        }

        if props.http_api.is_some() {
            if props.cors.is_some() {
                return Err(ConstructError::HttpApiConflict { field: "cors" });
            }
            if props.access_log.is_some() {
                return Err(ConstructError::HttpApiConflict { field: "accessLog" });
            }
            if props.custom_domain.is_some() {
                return Err(ConstructError::HttpApiConflict {
                    field: "customDomain",
                });
            }
        }

        let routes = props.routes.ok_or(ConstructError::MissingRoutes)?;
        if routes.is_empty() {
            return Err(ConstructError::EmptyRoutes);
        }

        let domain = props
            .custom_domain
            .map(|domain| plan_domain(api_scope, domain))
            .transpose()?;

        let authorization = DefaultAuthorization {
            authorization_type: props.default_authorization_type.unwrap_or_default(),
            authorizer: props.default_authorizer,
            scopes: props.default_authorization_scopes,
        };
        authorization.validate()?;

        let defaults = RouteDefaults {
            function_props: props.default_function_props,
            authorization,
        };
        let routes = plan_routes(routes, &BTreeSet::new(), &defaults)?;
        check_authorizers(api_scope, &AuthorizerRegistry::default(), &routes)?;

        Ok(ApiPlan {
            imported: props.http_api,
            domain,
            cors: resolve_cors(props.cors.as_ref()),
            access_log: resolve_access_log(props.access_log.as_ref()),
            defaults,
            routes,
        })
    }

    fn declare(scope: Scope, id: &str, plan: ApiPlan) -> Result<Self, ConstructError> {
        scope.claim()?;

        let mut http_api = None;
        let mut stage = None;
        let mut access_log_group = None;

        let api_id = match &plan.imported {
            Some(imported) => json!(imported.api_id),
            None => {
                let mut properties = json!({
                    "Name": scope.stack().app().resource_name(id),
                    "ProtocolType": "HTTP",
                });
                if let Some(cors) = &plan.cors {
                    properties["CorsConfiguration"] = cors.to_json();
                }
                let api_scope = scope.child("HttpApi");
                let api_logical_id =
                    api_scope.declare(Resource::new("AWS::ApiGatewayV2::Api", properties))?;
                let api_id = reference(&api_logical_id);

                let mut stage_properties = json!({
                    "ApiId": api_id,
                    "StageName": "$default",
                    "AutoDeploy": true,
                });
                if let Some(access_log) = &plan.access_log {
                    let (group, settings) = declare_access_log(&scope, access_log)?;
                    stage_properties["AccessLogSettings"] = settings;
                    access_log_group = group;
                }
                stage = Some(api_scope.child("DefaultStage").declare(Resource::new(
                    "AWS::ApiGatewayV2::Stage",
                    stage_properties,
                ))?);

                http_api = Some(api_logical_id);
                api_id
            }
        };

        let domain = match plan.domain {
            Some(domain) => {
                let resources = declare_domain(&scope, &domain, &api_id, stage.as_ref())?;
                Some((domain, resources))
            }
            None => None,
        };

        let mut api = Self {
            scope,
            id: id.to_string(),
            api_id,
            http_api,
            stage,
            access_log_group,
            domain,
            defaults: plan.defaults,
            authorizers: AuthorizerRegistry::default(),
            functions: BTreeMap::new(),
        };
        for route in plan.routes {
            api.declare_route(route)?;
        }

        info!(
            api = %api.id,
            routes = api.functions.len(),
            imported = plan.imported.is_some(),
            custom_domain = ?api.custom_domain_url(),
            authorization = %api.defaults.authorization.authorization_type,
            authorizers = api.authorizers.len(),
            cors = plan.cors.is_some(),
            access_log = plan.access_log.is_some(),
            "Constructed HTTP API"
        );

        Ok(api)
    }

    fn declare_route(&mut self, route: PlannedRoute) -> Result<(), ConstructError> {
        let suffix = route.key.construct_suffix();
        let normalized = route.key.to_string();

        let function = match route.source {
            FunctionSource::Existing(function) => function,
            FunctionSource::Create(props) => {
                Function::new(&self.scope, &format!("Lambda_{suffix}"), props)?
            }
        };

        let integration = self
            .scope
            .child(&format!("Integration_{suffix}"))
            .declare(Resource::new(
                "AWS::ApiGatewayV2::Integration",
                json!({
                    "ApiId": self.api_id,
                    "IntegrationType": "AWS_PROXY",
                    "IntegrationUri": function.arn(),
                    "PayloadFormatVersion": "2.0",
                }),
            ))?;

        let authorization = &route.authorization;
        let mut properties = json!({
            "ApiId": self.api_id,
            "RouteKey": normalized,
            "AuthorizationType": authorization.authorization_type,
            "Target": {
                "Fn::Join": ["", ["integrations/", reference(&integration)]],
            },
        });
        if let Some(authorizer) = &authorization.authorizer {
            properties["AuthorizerId"] =
                self.authorizers
                    .bind(&self.scope, &self.api_id, authorizer)?;
        }
        if !authorization.scopes.is_empty() {
            properties["AuthorizationScopes"] = json!(authorization.scopes);
        }
        self.scope
            .child(&format!("Route_{suffix}"))
            .declare(Resource::new("AWS::ApiGatewayV2::Route", properties))?;

        let region = self.scope.stack().app().region.clone();
        self.scope
            .child(&format!("Permission_{suffix}"))
            .declare(Resource::new(
                "AWS::Lambda::Permission",
                json!({
                    "Action": "lambda:InvokeFunction",
                    "FunctionName": function.arn(),
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": {
                        "Fn::Join": ["", [
                            "arn:",
                            { "Ref": "AWS::Partition" },
                            ":execute-api:",
                            region,
                            ":",
                            { "Ref": "AWS::AccountId" },
                            ":",
                            self.api_id,
                            "/*/*",
                        ]],
                    },
                }),
            ))?;

        debug!(
            api = %self.id,
            route = %normalized,
            function = %function.logical_id(),
            "Declared route"
        );
        self.functions.insert(normalized, function);
        Ok(())
    }

    /// Add routes after construction.
    ///
    /// The API's defaults apply. A key that normalizes to an existing route
    /// fails, and nothing is declared unless every route is valid.
    pub fn add_routes<I, K, V>(&mut self, routes: I) -> Result<(), ConstructError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RouteValue>,
    {
        let routes: BTreeMap<String, RouteValue> = routes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let existing: BTreeSet<String> = self.functions.keys().cloned().collect();

        let planned = plan_routes(routes, &existing, &self.defaults)?;
        check_authorizers(&self.scope, &self.authorizers, &planned)?;

        for route in planned {
            self.declare_route(route)?;
        }
        Ok(())
    }

    /// Get the function serving a route.
    ///
    /// The key is normalized first, so `"GET  /"` finds `"GET /"`.
    pub fn get_function(&self, route_key: &str) -> Option<&Function> {
        let key = normalize_route_key(route_key)?;
        self.functions.get(&key)
    }

    /// Normalized keys of every route.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Grant permissions to every route's function.
    ///
    /// A function shared by several routes is granted once.
    pub fn attach_permissions(&self, permissions: &[Permission]) {
        let mut granted: Vec<&Function> = Vec::new();
        for function in self.functions.values() {
            if granted.iter().any(|f| f.same_as(function)) {
                continue;
            }
            function.attach_permissions(permissions);
            granted.push(function);
        }
    }

    /// Grant permissions to one route's function.
    pub fn attach_permissions_to_route(
        &self,
        route_key: &str,
        permissions: &[Permission],
    ) -> Result<(), ConstructError> {
        let function = self
            .get_function(route_key)
            .ok_or_else(|| ConstructError::RouteNotFound {
                key: route_key.to_string(),
            })?;
        function.attach_permissions(permissions);
        Ok(())
    }

    /// Get the construct id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Logical id of the HTTP API; `None` when it was imported.
    pub fn http_api(&self) -> Option<&LogicalId> {
        self.http_api.as_ref()
    }

    /// Logical id of the `$default` stage; `None` when the HTTP API was imported.
    pub fn stage(&self) -> Option<&LogicalId> {
        self.stage.as_ref()
    }

    /// The value routes and integrations reference the HTTP API by.
    pub fn http_api_id(&self) -> &Value {
        &self.api_id
    }

    /// The default endpoint of the HTTP API.
    pub fn api_endpoint(&self) -> Value {
        match (&self.http_api, self.api_id.as_str()) {
            (Some(id), _) => get_att(id, "ApiEndpoint"),
            (None, Some(api_id)) => json!(format!(
                "https://{api_id}.execute-api.{}.amazonaws.com",
                self.scope.stack().app().region
            )),
            (None, None) => Value::Null,
        }
    }

    /// The custom-domain URL, if a custom domain is configured.
    pub fn custom_domain_url(&self) -> Option<String> {
        self.domain.as_ref().map(|(domain, _)| domain.url())
    }

    /// Resources declared for the custom domain, if one is configured.
    pub fn custom_domain(&self) -> Option<&DomainResources> {
        self.domain.as_ref().map(|(_, resources)| resources)
    }

    /// Logical id of the access-log group created by the construct.
    pub fn access_log_group(&self) -> Option<&LogicalId> {
        self.access_log_group.as_ref()
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("id", &self.id)
            .field("path", &self.scope.path())
            .field("routes", &self.functions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Check that every authorizer the routes use can be declared.
fn check_authorizers(
    scope: &Scope,
    registry: &AuthorizerRegistry,
    routes: &[PlannedRoute],
) -> Result<(), ConstructError> {
    let authorizers: Vec<&HttpAuthorizer> = routes
        .iter()
        .filter_map(|r| r.authorization.authorizer.as_ref())
        .collect();

    for authorizer in &authorizers {
        if matches!(authorizer, HttpAuthorizer::Imported { .. }) {
            continue;
        }
        let name = authorizer.name();
        if is_reserved_id(name) {
            return Err(ConstructError::DuplicateConstructId {
                path: scope.child(name).path(),
            });
        }
    }

    registry.ensure_compatible(scope, authorizers)
}
