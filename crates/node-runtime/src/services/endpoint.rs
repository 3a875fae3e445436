//! Loopback endpoint: delivers messages to listeners registered in the same
//! process, addressed by service name.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use peer_group::{Module, ModuleError, PeerGroupApi, StartStatus};
use serde::Deserialize;
use shared_types::{ModuleClassId, ModuleImplAdvertisement, PeerId};
use thiserror::Error;
use tracing::{debug, info};

/// Callback receiving messages for one service name.
pub type MessageListener = Arc<dyn Fn(&EndpointMessage) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMessage {
    pub source: PeerId,
    pub service: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    #[error("endpoint is not running")]
    NotRunning,

    #[error("no listener for service {0}")]
    NoListener(String),
}

#[derive(Debug, Default, Deserialize)]
struct EndpointParams {
    port: Option<u16>,
}

#[derive(Default)]
struct EndpointState {
    local: Option<PeerId>,
    port: Option<u16>,
    running: bool,
    listeners: HashMap<String, MessageListener>,
}

/// In-process message endpoint.
#[derive(Default)]
pub struct EndpointService {
    state: RwLock<EndpointState>,
}

impl EndpointService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_peer(&self) -> Option<PeerId> {
        self.state.read().local
    }

    /// Port from the group configuration, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.state.read().port
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    /// Register `listener` for `service`. Returns false if one is already registered.
    pub fn add_listener(&self, service: impl Into<String>, listener: MessageListener) -> bool {
        let mut state = self.state.write();
        let service = service.into();
        if state.listeners.contains_key(&service) {
            return false;
        }
        state.listeners.insert(service, listener);
        true
    }

    pub fn remove_listener(&self, service: &str) -> bool {
        self.state.write().listeners.remove(service).is_some()
    }

    /// Deliver `payload` to the listener for `service`.
    pub fn send(&self, service: &str, payload: Vec<u8>) -> Result<(), EndpointError> {
        let (listener, source) = {
            let state = self.state.read();
            if !state.running {
                return Err(EndpointError::NotRunning);
            }
            let listener = state
                .listeners
                .get(service)
                .cloned()
                .ok_or_else(|| EndpointError::NoListener(service.to_string()))?;
            (listener, state.local.ok_or(EndpointError::NotRunning)?)
        };

        // Listeners run outside the lock so they may send in turn.
        listener(&EndpointMessage {
            source,
            service: service.to_string(),
            payload,
        });
        Ok(())
    }
}

impl Module for EndpointService {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        let params: EndpointParams = match group.config().service_param(assigned_id) {
            Some(value) => EndpointParams::deserialize(value)
                .map_err(|e| ModuleError::Config(format!("endpoint parameters: {e}")))?,
            None => EndpointParams::default(),
        };

        let mut state = self.state.write();
        state.local = Some(group.peer_id());
        state.port = params.port;
        debug!(group = %group.peer_group_id(), port = ?params.port, "[Endpoint] Bound");
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        let mut state = self.state.write();
        state.running = true;
        if let Some(peer) = state.local {
            info!(peer = %peer, "[Endpoint] ✓ Loopback endpoint running");
        }
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        let mut state = self.state.write();
        state.running = false;
        state.listeners.clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
