//! Open membership: every peer may join under any name, no credentials.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use peer_group::{Module, ModuleError, PeerGroupApi, StartStatus};
use shared_types::{ModuleClassId, ModuleImplAdvertisement, PeerId};
use tracing::info;

#[derive(Default)]
struct Membership {
    peer: Option<PeerId>,
    identity: Option<String>,
}

#[derive(Default)]
pub struct NoneMembershipService {
    state: RwLock<Membership>,
}

impl NoneMembershipService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join under `identity`. Always succeeds.
    pub fn join(&self, identity: impl Into<String>) -> Option<PeerId> {
        let mut state = self.state.write();
        state.identity = Some(identity.into());
        state.peer
    }

    pub fn resign(&self) {
        self.state.write().identity = None;
    }

    pub fn current_identity(&self) -> Option<String> {
        self.state.read().identity.clone()
    }
}

impl Module for NoneMembershipService {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        let mut state = self.state.write();
        state.peer = Some(group.peer_id());
        // Everyone starts out as the peer itself.
        state.identity = Some(group.peer_name());
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        if let Some(identity) = self.current_identity() {
            info!(identity = %identity, "[Membership] ✓ Open membership");
        }
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        self.resign();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
