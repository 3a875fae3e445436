//! # Lifecycle Properties
//!
//! Each file checks one family of guarantees against a group built from
//! probe modules in a private registry.

pub mod convergence;
pub mod publication;
pub mod references;
pub mod registration;
pub mod teardown;
