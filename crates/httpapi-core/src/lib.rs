//! Resource graph primitives for httpapi.
//!
//! This crate is the narrow interface to the provisioning framework the
//! constructs declare resources into:
//! - [`Stack`]: owns every declared resource and the hosted-zone lookup
//! - [`Scope`]: explicit parent handle used to derive stable logical ids
//! - [`Function`]: a compute handle with an attachable permission policy
//! - [`Permission`]: coarse capabilities or fine-grained policy statements
//! - [`ZoneLookup`]: resolves hosted zones by name
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Stack                            │
//! │  (AppConfig + ZoneLookup + resources by logical id)     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Scope                            │
//! │  (path inside the stack, e.g. Api/Lambda_GET_/)         │
//! │  - logical ids                                          │
//! │  - declare / update resources                           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Template                           │
//! │  ({"Resources": {...}} ready for plan/apply)            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod dns;
pub mod function;
pub mod permissions;
pub mod stack;

pub use dns::{HostedZone, StaticZoneLookup, ZoneLookup};
pub use function::{Function, FunctionProps};
pub use permissions::{Effect, Permission, PolicyStatement};
pub use stack::{LogicalId, Resource, Scope, Stack, Template, get_att, reference};
