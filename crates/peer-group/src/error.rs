//! Error types for group construction and module loading.

use shared_types::{
    AdvertisementError, CompatibilityError, ModuleClassId, ModuleSpecId, PeerGroupId,
};
use thiserror::Error;

use crate::pool::PoolError;
use crate::store::StoreError;

/// Errors raised by the peer group core.
#[derive(Debug, Error)]
pub enum PeerGroupError {
    /// The module's compatibility statement was rejected.
    #[error("module {spec_id} is not compatible with this runtime: {source}")]
    Compatibility {
        spec_id: ModuleSpecId,
        #[source]
        source: CompatibilityError,
    },

    /// No implementation could be found or instantiated.
    #[error("no usable implementation: {0}")]
    ResolutionFailure(String),

    /// A module's `init` failed.
    #[error("module {class_id} failed to initialize: {source}")]
    InitializationFailure {
        class_id: ModuleClassId,
        #[source]
        source: ModuleError,
    },

    /// The startup coordinator gave up on the remaining modules.
    #[error("group {group} failed to converge; {} module(s) never started: {}", .remaining.len(), describe(.remaining))]
    ConvergenceFailure {
        group: PeerGroupId,
        remaining: Vec<(ModuleClassId, String)>,
    },

    #[error("group {0} is already registered")]
    DuplicateRegistration(PeerGroupId),

    #[error("service {0} not found")]
    ServiceNotFound(ModuleClassId),

    #[error("a root group already exists in this process")]
    RootAlreadyExists,

    /// The group is stopping or its last reference was released.
    #[error("group {0} is no longer acquirable")]
    NotAcquirable(String),

    #[error("a child group requires a parent")]
    MissingParent,

    #[error("required services missing: {0:?}")]
    MissingRequiredServices(Vec<ModuleClassId>),

    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("advertisement error: {0}")]
    Advertisement(#[from] AdvertisementError),
}

fn describe(remaining: &[(ModuleClassId, String)]) -> String {
    remaining
        .iter()
        .map(|(id, descriptor)| format!("{id} ({descriptor})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors a module reports from its own lifecycle hooks.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("initialization failed: {0}")]
    Init(String),

    #[error("bad configuration: {0}")]
    Config(String),

    /// The module panicked; the payload message is preserved.
    #[error("module panicked: {0}")]
    Panicked(String),

    /// A call back into the group failed.
    #[error(transparent)]
    Group(Box<PeerGroupError>),

    #[error("{0}")]
    Other(String),
}

impl From<PeerGroupError> for ModuleError {
    fn from(err: PeerGroupError) -> Self {
        Self::Group(Box::new(err))
    }
}

/// Render a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub type Result<T> = std::result::Result<T, PeerGroupError>;
