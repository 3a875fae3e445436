//! Permit-all access control. Starts once a membership service is running,
//! since access decisions are made about members.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use peer_group::{Module, ModuleError, PeerGroupApi, StartStatus};
use shared_types::{well_known, ModuleClassId, ModuleImplAdvertisement};
use tracing::debug;

use super::upgrade;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Permitted,
    Denied,
}

#[derive(Default)]
pub struct AlwaysAccessService {
    group: RwLock<Option<Weak<dyn PeerGroupApi>>>,
    checks: AtomicU64,
}

impl AlwaysAccessService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide on an operation for the holder of `credential`.
    pub fn check(&self, operation: &str, credential: Option<&str>) -> AccessResult {
        self.checks.fetch_add(1, Ordering::Relaxed);
        debug!(operation, has_credential = credential.is_some(), "[Access] Permitted");
        AccessResult::Permitted
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }
}

impl Module for AlwaysAccessService {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        *self.group.write() = Some(Arc::downgrade(&group));
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        match upgrade(&self.group.read()) {
            Ok(group) if group.lookup_service(&well_known::MEMBERSHIP_CLASS).is_ok() => StartStatus::Ok,
            Ok(_) => StartStatus::AgainStalled,
            Err(_) => StartStatus::Failed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
