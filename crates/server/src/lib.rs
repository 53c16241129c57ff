//! # Intent Server
//!
//! The service façade: a `ServiceContext` built once at startup (encoder,
//! catalog-backed engine, feedback log) and a small axum route table over
//! it. The `intentd` binary wires both to a CLI.

pub mod context;
pub mod http_api;

pub use context::{ServiceContext, ServiceOptions};
pub use http_api::build_router;
