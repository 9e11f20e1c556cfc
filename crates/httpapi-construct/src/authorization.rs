//! Authorization for routes.
//!
//! Every route ends up with exactly one [`AuthorizationType`]. It comes from
//! the route's own override when one is set and from the API default
//! otherwise. Overrides replace the default field by field; lists are never
//! merged.
//!
//! JWT routes need an [`HttpAuthorizer`]. Authorizers are declared once per
//! API and name, and every route using the same authorizer points at the
//! same resource.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use httpapi_common::ConstructError;
use httpapi_core::{Resource, Scope, reference};

/// Identity source used when an authorizer does not name one.
pub const DEFAULT_IDENTITY_SOURCE: &str = "$request.header.Authorization";

/// How requests to a route are authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthorizationType {
    /// Open route.
    #[default]
    None,
    /// Signed requests checked against IAM.
    AwsIam,
    /// Bearer tokens checked by a JWT authorizer.
    Jwt,
}

impl AuthorizationType {
    /// Get the wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AwsIam => "AWS_IAM",
            Self::Jwt => "JWT",
        }
    }
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorizationType {
    type Err = ConstructError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NONE" => Ok(Self::None),
            "AWS_IAM" => Ok(Self::AwsIam),
            "JWT" => Ok(Self::Jwt),
            other => Err(ConstructError::unsupported_authorization_type(other)),
        }
    }
}

impl TryFrom<String> for AuthorizationType {
    type Error = ConstructError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthorizationType> for String {
    fn from(value: AuthorizationType) -> Self {
        value.as_str().to_string()
    }
}

/// An authorizer for JWT routes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuthorizer {
    /// Tokens issued by any OIDC-compatible issuer.
    Jwt {
        /// Authorizer name; `JwtAuthorizer` when unset.
        #[serde(default)]
        name: Option<String>,
        /// Accepted `aud` claims.
        audience: Vec<String>,
        /// Token issuer URL.
        issuer: String,
        /// Where the token is read from.
        #[serde(default)]
        identity_source: Option<Vec<String>>,
    },
    /// Tokens issued by a Cognito user pool.
    UserPool {
        /// Authorizer name; `UserPoolAuthorizer` when unset.
        #[serde(default)]
        name: Option<String>,
        /// User pool id.
        user_pool_id: String,
        /// App clients whose tokens are accepted.
        user_pool_client_ids: Vec<String>,
        /// Region of the user pool; the app region when unset.
        #[serde(default)]
        region: Option<String>,
        /// Where the token is read from.
        #[serde(default)]
        identity_source: Option<Vec<String>>,
    },
    /// An authorizer that already exists on the HTTP API.
    Imported {
        /// Id of the existing authorizer.
        authorizer_id: String,
    },
}

impl HttpAuthorizer {
    /// A JWT authorizer with the default name and identity source.
    pub fn jwt<I, S>(audience: I, issuer: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Jwt {
            name: None,
            audience: audience.into_iter().map(Into::into).collect(),
            issuer: issuer.into(),
            identity_source: None,
        }
    }

    /// A user-pool authorizer with the default name and identity source.
    pub fn user_pool<I, S>(user_pool_id: impl Into<String>, client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UserPool {
            name: None,
            user_pool_id: user_pool_id.into(),
            user_pool_client_ids: client_ids.into_iter().map(Into::into).collect(),
            region: None,
            identity_source: None,
        }
    }

    /// An authorizer that already exists.
    pub fn imported(authorizer_id: impl Into<String>) -> Self {
        Self::Imported {
            authorizer_id: authorizer_id.into(),
        }
    }

    /// Name the authorizer is declared under.
    pub fn name(&self) -> &str {
        match self {
            Self::Jwt { name, .. } => name.as_deref().unwrap_or("JwtAuthorizer"),
            Self::UserPool { name, .. } => name.as_deref().unwrap_or("UserPoolAuthorizer"),
            Self::Imported { authorizer_id } => authorizer_id,
        }
    }

    /// Check the parts of the authorizer that can be checked locally.
    pub(crate) fn validate(&self) -> Result<(), ConstructError> {
        let Self::Jwt { issuer, .. } = self else {
            return Ok(());
        };

        let invalid = |reason: &str| ConstructError::InvalidJwtIssuer {
            issuer: issuer.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(issuer).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(invalid("issuer must use https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("issuer has no host"));
        }
        Ok(())
    }

    fn properties(&self, api_id: &Value, region: &str) -> Value {
        let (audience, issuer, identity_source) = match self {
            Self::Jwt {
                audience,
                issuer,
                identity_source,
                ..
            } => (audience.clone(), issuer.clone(), identity_source),
            Self::UserPool {
                user_pool_id,
                user_pool_client_ids,
                region: pool_region,
                identity_source,
                ..
            } => {
                let pool_region = pool_region.as_deref().unwrap_or(region);
                (
                    user_pool_client_ids.clone(),
                    format!("https://cognito-idp.{pool_region}.amazonaws.com/{user_pool_id}"),
                    identity_source,
                )
            }
            Self::Imported { .. } => return Value::Null,
        };

        let identity_source = identity_source
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_IDENTITY_SOURCE.to_string()]);

        json!({
            "ApiId": api_id,
            "AuthorizerType": "JWT",
            "IdentitySource": identity_source,
            "JwtConfiguration": {
                "Audience": audience,
                "Issuer": issuer,
            },
            "Name": self.name(),
        })
    }
}

/// Authorization defaults of an API.
#[derive(Debug, Clone, Default)]
pub(crate) struct DefaultAuthorization {
    pub authorization_type: AuthorizationType,
    pub authorizer: Option<HttpAuthorizer>,
    pub scopes: Option<Vec<String>>,
}

impl DefaultAuthorization {
    /// Validate the defaults on their own.
    ///
    /// A JWT default without an authorizer fails even if every route
    /// overrides it.
    pub fn validate(&self) -> Result<(), ConstructError> {
        if self.authorization_type == AuthorizationType::Jwt && self.authorizer.is_none() {
            return Err(ConstructError::missing_jwt_authorizer("defaultAuthorizer"));
        }
        if let Some(authorizer) = &self.authorizer {
            authorizer.validate()?;
        }
        Ok(())
    }
}

/// Per-route authorization override.
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteAuthorization {
    pub authorization_type: Option<AuthorizationType>,
    pub authorizer: Option<HttpAuthorizer>,
    pub scopes: Option<Vec<String>>,
}

/// The authorization a route is declared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedAuthorization {
    pub authorization_type: AuthorizationType,
    pub authorizer: Option<HttpAuthorizer>,
    pub scopes: Vec<String>,
}

/// Resolve the authorization of one route.
///
/// Each override field, when set, replaces the matching default. Only JWT
/// routes keep an authorizer and scopes.
pub(crate) fn resolve_route_authorization(
    route_key: &str,
    defaults: &DefaultAuthorization,
    overrides: &RouteAuthorization,
) -> Result<ResolvedAuthorization, ConstructError> {
    let authorization_type = overrides
        .authorization_type
        .unwrap_or(defaults.authorization_type);
    let authorizer = overrides
        .authorizer
        .clone()
        .or_else(|| defaults.authorizer.clone());
    let scopes = overrides
        .scopes
        .clone()
        .or_else(|| defaults.scopes.clone())
        .unwrap_or_default();

    if let Some(authorizer) = &overrides.authorizer {
        authorizer.validate()?;
    }

    if authorization_type != AuthorizationType::Jwt {
        if overrides.scopes.as_ref().is_some_and(|s| !s.is_empty()) {
            warn!(
                route = route_key,
                authorization = %authorization_type,
                "Ignoring authorization scopes on a route that is not JWT-authorized"
            );
        }
        return Ok(ResolvedAuthorization {
            authorization_type,
            authorizer: None,
            scopes: Vec::new(),
        });
    }

    let Some(authorizer) = authorizer else {
        return Err(ConstructError::missing_jwt_authorizer(route_key));
    };

    Ok(ResolvedAuthorization {
        authorization_type,
        authorizer: Some(authorizer),
        scopes,
    })
}

/// Authorizers declared on one API, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct AuthorizerRegistry {
    bound: BTreeMap<String, (HttpAuthorizer, Value)>,
}

impl AuthorizerRegistry {
    /// Check that `authorizers` can all be bound without a name clash.
    pub fn ensure_compatible<'a>(
        &self,
        scope: &Scope,
        authorizers: impl IntoIterator<Item = &'a HttpAuthorizer>,
    ) -> Result<(), ConstructError> {
        let mut pending: BTreeMap<&str, &HttpAuthorizer> = BTreeMap::new();

        for authorizer in authorizers {
            if matches!(authorizer, HttpAuthorizer::Imported { .. }) {
                continue;
            }

            let name = authorizer.name();
            let known = self
                .bound
                .get(name)
                .map(|(existing, _)| existing)
                .or_else(|| pending.get(name).copied());

            match known {
                Some(existing) if existing != authorizer => {
                    return Err(ConstructError::DuplicateConstructId {
                        path: scope.child(name).path(),
                    });
                }
                Some(_) => {}
                None => {
                    pending.insert(name, authorizer);
                }
            }
        }

        Ok(())
    }

    /// Declare `authorizer` (once) and return the value routes reference it by.
    pub fn bind(
        &mut self,
        scope: &Scope,
        api_id: &Value,
        authorizer: &HttpAuthorizer,
    ) -> Result<Value, ConstructError> {
        if let HttpAuthorizer::Imported { authorizer_id } = authorizer {
            return Ok(json!(authorizer_id));
        }

        let name = authorizer.name();
        if let Some((existing, id)) = self.bound.get(name) {
            if existing == authorizer {
                return Ok(id.clone());
            }
            return Err(ConstructError::DuplicateConstructId {
                path: scope.child(name).path(),
            });
        }

        let region = scope.stack().app().region.clone();
        let logical_id = scope.child(name).declare(Resource::new(
            "AWS::ApiGatewayV2::Authorizer",
            authorizer.properties(api_id, &region),
        ))?;
        debug!(authorizer = name, logical_id = %logical_id, "Declared authorizer");

        let id = reference(&logical_id);
        self.bound
            .insert(name.to_string(), (authorizer.clone(), id.clone()));
        Ok(id)
    }

    /// Number of declared authorizers.
    pub fn len(&self) -> usize {
        self.bound.len()
    }
}
