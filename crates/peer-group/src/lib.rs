//! # Peer Group
//!
//! Module orchestration core. A peer group is a named, identity-bearing
//! container that loads a configured set of service modules, brings them
//! up without a declared dependency graph, and governs its own lifetime
//! through counted interface handles.
//!
//! ## Architecture
//!
//! ```text
//! GroupBuilder ──build──→ StdPeerGroup ──owns──→ GroupCore
//!                              │                   ├── identity, config
//!                              │                   ├── running module tables
//!                              │                   ├── worker + scheduled pools
//!                              │                   └── reference count
//!                              ├── ModuleLoader ──→ ModuleFactories
//!                              ├── startup coordinator
//!                              └── ContentStore
//!
//! GroupRegistry: process-wide map of live groups (weak) + root slot
//! ```
//!
//! ## Lifetime Rules
//!
//! | Rule | Description |
//! |------|-------------|
//! | Unique ids | A group id is registered at most once; a second construction fails |
//! | Arming | Only references taken after construction completed can stop the group |
//! | Release once | A counted handle releases its reference exactly once, on `unref` or drop |
//! | Reverse teardown | Modules stop in the reverse of the order they finished starting |
//!
//! ## Usage
//!
//! ```ignore
//! use peer_group::{GroupBuilder, GroupRegistry, ModuleFactories, PeerGroupApi};
//!
//! let factories = Arc::new(ModuleFactories::new());
//! // register the endpoint, resolver, membership and access implementations
//! let registry = Arc::new(GroupRegistry::new(factories));
//!
//! let root = GroupBuilder::root(Arc::clone(&registry)).build()?;
//! let endpoint = root.lookup_service(&well_known::ENDPOINT_CLASS)?;
//! ```

pub mod api;
mod coordinator;
pub mod error;
pub mod factory;
pub mod group;
mod group_core;
pub mod hierarchy;
pub mod interface;
mod loader;
pub mod module;
pub mod pool;
pub mod registry;
pub mod store;

pub use api::{PeerGroupApi, Scope};
pub use error::{ModuleError, PeerGroupError, Result};
pub use factory::{ModuleFactories, ModuleFactory};
pub use group::{StdPeerGroup, StoreLocation};
pub use group_core::Phase;
pub use hierarchy::{GroupBuilder, GroupVariant};
pub use interface::{GroupInterface, RoleMap, WeakGroupInterface};
pub use loader::LoaderConfig;
pub use module::{DiscoveryService, Module, ModuleDescriptor, StartStatus};
pub use pool::{PoolConfig, PoolError, ScheduledPool, ScheduledTask, WorkerPool};
pub use registry::GroupRegistry;
pub use store::{
    ContentStore, FileContentStore, InMemoryContentStore, StoreError, StoredRecord, DEFAULT_LIFETIME,
};
