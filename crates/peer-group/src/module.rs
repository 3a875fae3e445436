//! # Module Contract
//!
//! Everything a group loads (services, transports, applications) implements
//! [`Module`]. The group drives three hooks in order: `init` once, then
//! `start_app` until the module reports it is running, and `stop_app` once
//! at teardown.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use shared_types::{AdvertisementKind, ModuleClassId, ModuleImplAdvertisement, ModuleRef, ModuleSpecId};

use crate::api::PeerGroupApi;
use crate::error::{panic_message, ModuleError};

/// Result of a single `start_app` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    /// The module is running.
    Ok,
    /// Not ready yet, but something moved forward since the last call.
    AgainProgress,
    /// Not ready yet and nothing moved forward.
    AgainStalled,
    /// The module declined to run in this group.
    Disabled,
    /// The module gave up.
    Failed,
}

impl StartStatus {
    /// Whether this outcome counts as progress for the coordinator.
    pub fn is_progress(&self) -> bool {
        !matches!(self, Self::AgainStalled)
    }
}

/// A loadable unit of group functionality.
pub trait Module: Send + Sync + 'static {
    /// Bind the module to its group.
    ///
    /// `group` is the raw group for privileged (service and transport)
    /// modules, and a ref-counted interface for applications.
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        assigned_id: &ModuleClassId,
        impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError>;

    /// Try to start. Called repeatedly by the coordinator until it returns
    /// anything other than one of the `Again*` statuses.
    fn start_app(&self, args: &[String]) -> StartStatus;

    /// Stop the module. Called at most once per successful `init`.
    fn stop_app(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// The discovery capability, for modules that provide one.
    fn discovery(&self) -> Option<&dyn DiscoveryService> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn Module {
    /// Recover the concrete module type behind a looked up service.
    pub fn downcast_ref<T: Module>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Remote discovery, as offered by a discovery service module.
///
/// Results of a remote query arrive asynchronously in the group's content
/// store; the caller polls the store.
pub trait DiscoveryService: Send + Sync {
    fn remote_query(&self, kind: AdvertisementKind, attr: &str, value: &str) -> Result<(), ModuleError>;
}

/// Entry of a module table, before or after resolution.
#[derive(Clone)]
pub enum ModuleDescriptor {
    Resolved(Arc<dyn Module>),
    Impl(ModuleImplAdvertisement),
    Spec(ModuleSpecId),
}

impl ModuleDescriptor {
    /// Short human readable form, used in logs and convergence failures.
    pub fn describe(&self) -> String {
        match self {
            Self::Resolved(_) => "resolved module".to_string(),
            Self::Impl(adv) => format!("impl {} ({})", adv.code, adv.module_spec_id),
            Self::Spec(spec_id) => format!("spec {spec_id}"),
        }
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<ModuleRef> for ModuleDescriptor {
    fn from(module: ModuleRef) -> Self {
        match module {
            ModuleRef::Spec { spec_id } => Self::Spec(spec_id),
            ModuleRef::Impl { advertisement } => Self::Impl(*advertisement),
        }
    }
}

/// Run a module hook, turning a panic into a [`ModuleError::Panicked`].
pub(crate) fn isolate<T>(hook: impl FnOnce() -> T) -> Result<T, ModuleError> {
    catch_unwind(AssertUnwindSafe(hook)).map_err(|payload| ModuleError::Panicked(panic_message(&*payload)))
}

/// `start_app` with panics reported as [`StartStatus::Failed`].
pub(crate) fn start_isolated(module: &dyn Module, args: &[String]) -> StartStatus {
    isolate(|| module.start_app(args)).unwrap_or(StartStatus::Failed)
}

/// `stop_app` with panics reported as errors.
pub(crate) fn stop_isolated(module: &dyn Module) -> Result<(), ModuleError> {
    isolate(|| module.stop_app()).and_then(|r| r)
}
