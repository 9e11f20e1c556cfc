//! Error types for httpapi.
//!
//! Every failure is a synchronous configuration error raised while an API is
//! being constructed. Nothing here is retried; the caller fixes the input and
//! constructs again.
//!
//! The variants fall into four groups:
//! - schema errors: the shape of the route table or a function definition is wrong
//! - conflict errors: two inputs that cannot be combined were both supplied
//! - lookup errors: an external resource the construct depends on does not exist
//! - authorization errors: an unsupported or incomplete authorization setting

use thiserror::Error;

/// Authorization types accepted by the construct, in the order they are listed
/// in error messages.
pub const SUPPORTED_AUTHORIZATION_TYPES: &str = r#""NONE", "AWS_IAM" and "JWT""#;

/// Configuration errors raised while building the resource graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructError {
    /// No route table was supplied at all.
    #[error(r#"Missing "routes" in Api"#)]
    MissingRoutes,

    /// The route table was supplied but contains no entries.
    #[error("At least 1 route is required")]
    EmptyRoutes,

    /// The route key does not have the `METHOD /path` shape.
    #[error("Invalid route {key}")]
    InvalidRoute {
        /// The route key as written by the caller.
        key: String,
    },

    /// The route key's method is not one of the supported HTTP methods.
    #[error(r#"Invalid method defined for "{key}""#)]
    InvalidMethod {
        /// The route key as written by the caller.
        key: String,
    },

    /// The route key's path is empty or does not start with `/`.
    #[error(r#"Invalid path defined for "{key}""#)]
    InvalidPath {
        /// The route key as written by the caller.
        key: String,
    },

    /// Two route keys normalize to the same route.
    #[error(r#"Route "{key}" is defined more than once"#)]
    DuplicateRoute {
        /// The normalized route key.
        key: String,
    },

    /// A function definition did not resolve to a handler.
    #[error(r#"Invalid function definition for the "{key}" route"#)]
    InvalidFunctionDefinition {
        /// The route key the definition belongs to.
        key: String,
    },

    /// A pre-built function was passed in alongside default function props.
    #[error(
        r#"Cannot define defaultFunctionProps when a Function is passed in to the "{key}" route"#
    )]
    DefaultFunctionPropsConflict {
        /// The route key that carries the pre-built function.
        key: String,
    },

    /// A toggle that mutates the HTTP API was combined with an imported HTTP API.
    #[error("Cannot define both {field} and httpApi")]
    HttpApiConflict {
        /// The conflicting field (`cors`, `accessLog` or `customDomain`).
        field: &'static str,
    },

    /// The hosted zone for a custom domain does not exist.
    #[error(r#"Cannot find hosted zone "{zone}" in Route 53"#)]
    HostedZoneNotFound {
        /// The zone name that was looked up.
        zone: String,
    },

    /// A custom domain name cannot be used to derive a hosted zone.
    #[error(r#"Invalid domain name "{domain}""#)]
    InvalidDomainName {
        /// The domain name as supplied.
        domain: String,
    },

    /// The authorization type is not one of the supported values.
    #[error("Api does not currently support {value}. Only {supported} are currently supported.", supported = SUPPORTED_AUTHORIZATION_TYPES)]
    UnsupportedAuthorizationType {
        /// The offending value.
        value: String,
    },

    /// JWT authorization was requested without an authorizer.
    #[error("Missing JWT authorizer for {scope}")]
    MissingJwtAuthorizer {
        /// Where the authorizer was missing (`defaultAuthorizer` or a route key).
        scope: String,
    },

    /// A JWT issuer is not a valid `https` URL.
    #[error(r#"Invalid JWT issuer "{issuer}": {reason}"#)]
    InvalidJwtIssuer {
        /// The issuer as supplied.
        issuer: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two constructs were declared at the same scope path.
    #[error(r#"There is already a construct with id "{path}""#)]
    DuplicateConstructId {
        /// The scope path that is already taken.
        path: String,
    },

    /// No route with the given key exists on the API.
    #[error(r#"Failed to find a route for "{key}""#)]
    RouteNotFound {
        /// The route key as supplied.
        key: String,
    },

    /// A function was declared without a handler.
    #[error(r#"No handler defined for function "{id}""#)]
    MissingHandler {
        /// The construct id of the function.
        id: String,
    },
}

impl ConstructError {
    /// Create a new `InvalidRoute` error.
    pub fn invalid_route(key: impl Into<String>) -> Self {
        Self::InvalidRoute { key: key.into() }
    }

    /// Create a new `InvalidMethod` error.
    pub fn invalid_method(key: impl Into<String>) -> Self {
        Self::InvalidMethod { key: key.into() }
    }

    /// Create a new `InvalidPath` error.
    pub fn invalid_path(key: impl Into<String>) -> Self {
        Self::InvalidPath { key: key.into() }
    }

    /// Create a new `HostedZoneNotFound` error.
    pub fn hosted_zone_not_found(zone: impl Into<String>) -> Self {
        Self::HostedZoneNotFound { zone: zone.into() }
    }

    /// Create a new `UnsupportedAuthorizationType` error.
    pub fn unsupported_authorization_type(value: impl Into<String>) -> Self {
        Self::UnsupportedAuthorizationType {
            value: value.into(),
        }
    }

    /// Create a new `MissingJwtAuthorizer` error.
    pub fn missing_jwt_authorizer(scope: impl Into<String>) -> Self {
        Self::MissingJwtAuthorizer {
            scope: scope.into(),
        }
    }

    /// Returns `true` if the error is about the shape of the input.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRoutes
                | Self::EmptyRoutes
                | Self::InvalidRoute { .. }
                | Self::InvalidMethod { .. }
                | Self::InvalidPath { .. }
                | Self::DuplicateRoute { .. }
                | Self::InvalidFunctionDefinition { .. }
                | Self::InvalidDomainName { .. }
                | Self::MissingHandler { .. }
        )
    }

    /// Returns `true` if two supplied inputs cannot be combined.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DefaultFunctionPropsConflict { .. }
                | Self::HttpApiConflict { .. }
                | Self::DuplicateConstructId { .. }
        )
    }

    /// Returns `true` if the error comes from an authorization setting.
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAuthorizationType { .. }
                | Self::MissingJwtAuthorizer { .. }
                | Self::InvalidJwtIssuer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConstructError::invalid_route("GET / 1 2 3");
        assert_eq!(err.to_string(), "Invalid route GET / 1 2 3");

        let err = ConstructError::invalid_method("GARBAGE /");
        assert_eq!(err.to_string(), r#"Invalid method defined for "GARBAGE /""#);

        let err = ConstructError::hosted_zone_not_found("domain.com");
        assert_eq!(
            err.to_string(),
            r#"Cannot find hosted zone "domain.com" in Route 53"#
        );

        let err = ConstructError::HttpApiConflict { field: "cors" };
        assert_eq!(err.to_string(), "Cannot define both cors and httpApi");
    }

    #[test]
    fn test_unsupported_authorization_type_names_value_and_set() {
        let err = ConstructError::unsupported_authorization_type("ABC");
        let message = err.to_string();

        assert!(message.contains("does not currently support ABC"));
        assert!(message.contains(r#""AWS_IAM" and "JWT""#));
        assert!(message.contains(r#""NONE""#));
    }

    #[test]
    fn test_missing_jwt_authorizer_message() {
        let err = ConstructError::missing_jwt_authorizer("defaultAuthorizer");
        assert!(err.to_string().starts_with("Missing JWT authorizer"));
    }

    #[test]
    fn test_classification() {
        assert!(ConstructError::EmptyRoutes.is_schema_error());
        assert!(ConstructError::invalid_path("GET ").is_schema_error());
        assert!(!ConstructError::EmptyRoutes.is_conflict());

        assert!(ConstructError::HttpApiConflict { field: "accessLog" }.is_conflict());
        assert!(
            ConstructError::DefaultFunctionPropsConflict { key: "GET /".into() }.is_conflict()
        );

        assert!(ConstructError::unsupported_authorization_type("X").is_authorization_error());
        assert!(!ConstructError::hosted_zone_not_found("x.com").is_authorization_error());
    }
}
