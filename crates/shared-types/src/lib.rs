//! # Shared Types Crate
//!
//! Value types shared by every crate of the peer group workspace.
//!
//! ## Contents
//!
//! - **Identifiers**: groups, peers, module roles and module specifications,
//!   all renderable as URNs.
//! - **Compatibility**: the closed key/value check gating module loading.
//! - **Advertisements**: module implementation and group descriptors, plus
//!   the structured parameter section of a standard group implementation.
//! - **Configuration**: per-role enable flags and parameter blobs.

pub mod advertisement;
pub mod compat;
pub mod config;
pub mod errors;
pub mod ids;

pub use advertisement::*;
pub use compat::{compatible, CompatibilityStatement};
pub use config::{ConfigParams, ServiceConfig};
pub use errors::*;
pub use ids::{well_known, ModuleClassId, ModuleSpecId, PeerGroupId, PeerId};
