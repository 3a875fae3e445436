//! # Node Runtime Library
//!
//! Boots a peer's root group. The main entry point is the `main.rs` binary;
//! the library is exposed for tests and embedding.
//!
//! ## Modules
//!
//! - `config` - Platform configuration from TOML and `PG_*` environment variables
//! - `services` - Reference implementations of the standard group services
//! - `node` - Root group startup and shutdown

#![allow(clippy::type_complexity)]

pub mod config;
pub mod node;
pub mod services;

pub use config::{ConfigError, PlatformConfig};
pub use node::PeerNode;
pub use services::register_reference_modules;
