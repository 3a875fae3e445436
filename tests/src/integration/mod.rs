//! # Hierarchy Integration
//!
//! Root and subgroups running the reference services, booted through
//! [`node_runtime::PeerNode`] against a private registry.

pub mod hierarchy;
