//! Common types and errors for httpapi.
//!
//! This crate provides shared functionality used across the httpapi workspace:
//! - [`ConstructError`]: the configuration error taxonomy raised at construction time
//! - [`AppConfig`]: the application context (stage, name, region) every stack is built in

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::ConstructError;
