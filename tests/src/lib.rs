//! # Peer Group Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Probe modules and the private-registry harness
//! │
//! ├── properties/       # Lifecycle guarantees of a single group
//! │   ├── convergence.rs    # bounded startup, soft ordering
//! │   ├── references.rs     # counted handles and arming
//! │   ├── teardown.rs       # reverse stop order
//! │   └── registration.rs   # unique ids, instance reuse
//! │
//! └── integration/      # Root and subgroups with the reference services
//!     └── hierarchy.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pg-tests
//!
//! # By category
//! cargo test -p pg-tests properties::
//! cargo test -p pg-tests integration::
//!
//! # Benchmarks
//! cargo bench -p pg-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
pub mod properties;
