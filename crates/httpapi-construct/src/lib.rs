//! HTTP API construct for httpapi.
//!
//! [`Api`] turns a declarative route table into a graph of resources: an
//! HTTP API with its stage, one function per route, authorizers, an optional
//! custom domain, CORS and access logging.
//!
//! Construction runs four resolvers in dependency order:
//! - [`domain`]: validates the custom domain and looks up its hosted zone
//! - [`authorization`]: validates default and per-route authorization
//! - [`route`]: parses route keys and resolves one function per route
//! - [`cors`] / [`access_log`]: boolean-or-object toggles on the HTTP API
//!
//! All of them run before a single resource is declared, so a failed
//! construction leaves the stack untouched.
//!
//! # Example
//!
//! ```
//! use httpapi_common::AppConfig;
//! use httpapi_construct::{Api, ApiProps, CorsToggle};
//! use httpapi_core::Stack;
//!
//! let stack = Stack::new("stack", AppConfig::default());
//! let api = Api::new(
//!     &stack.root(),
//!     "Api",
//!     ApiProps {
//!         cors: Some(CorsToggle::Enabled(true)),
//!         ..ApiProps::with_routes([("GET /", "src/list.handler")])
//!     },
//! )
//! .unwrap();
//!
//! assert!(api.get_function("GET /").is_some());
//! ```

pub mod access_log;
pub mod api;
pub mod authorization;
pub mod config_file;
pub mod cors;
pub mod domain;
pub mod route;

pub use access_log::{AccessLogOptions, AccessLogToggle};
pub use api::{Api, ApiProps, ImportedHttpApi};
pub use authorization::{AuthorizationType, HttpAuthorizer};
pub use config_file::{ApiEntry, ConfigFile, ConfigFileError, HostedZoneEntry};
pub use cors::{CorsOptions, CorsToggle};
pub use domain::{CustomDomain, CustomDomainOptions, DomainResources};
pub use route::{HttpMethod, RouteFunction, RouteKey, RouteProps, RouteValue};
