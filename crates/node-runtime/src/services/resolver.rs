//! Local query resolver. Queries are routed to named handlers; the resolver
//! starts only once the group's endpoint is running, and listens on it for
//! queries addressed to [`RESOLVER_SERVICE_NAME`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use peer_group::{Module, ModuleError, PeerGroupApi, StartStatus};
use shared_types::{well_known, ModuleClassId, ModuleImplAdvertisement};
use thiserror::Error;
use tracing::{debug, info};

use super::endpoint::{EndpointMessage, EndpointService};
use super::upgrade;

/// Endpoint service name the resolver listens on.
pub const RESOLVER_SERVICE_NAME: &str = "resolver";

/// Answers a query payload, or declines with `None`.
pub type QueryHandler = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Debug, Error, PartialEq)]
pub enum ResolverError {
    #[error("no handler named {0}")]
    UnknownHandler(String),

    #[error("handler {0} declined the query")]
    NoAnswer(String),
}

#[derive(Default)]
pub struct ResolverService {
    group: RwLock<Option<Weak<dyn PeerGroupApi>>>,
    handlers: RwLock<HashMap<String, QueryHandler>>,
    queries: Arc<AtomicU64>,
}

impl ResolverService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register_handler(&self, name: impl Into<String>, handler: QueryHandler) -> Option<QueryHandler> {
        self.handlers.write().insert(name.into(), handler)
    }

    pub fn unregister_handler(&self, name: &str) -> Option<QueryHandler> {
        self.handlers.write().remove(name)
    }

    /// Resolve `payload` through the handler called `name`.
    pub fn query(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, ResolverError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let handler = self
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ResolverError::UnknownHandler(name.to_string()))?;
        handler(payload).ok_or_else(|| ResolverError::NoAnswer(name.to_string()))
    }

    /// Queries seen, local and from the endpoint.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Module for ResolverService {
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
        let group = match upgrade(&self.group.read()) {
            Ok(group) => group,
            Err(_) => return StartStatus::Failed,
        };
        let endpoint = match group.lookup_service(&well_known::ENDPOINT_CLASS) {
            Ok(endpoint) => endpoint,
            Err(_) => {
                debug!("[Resolver] Waiting for the endpoint");
                return StartStatus::AgainStalled;
            }
        };
        let Some(endpoint) = endpoint.downcast_ref::<EndpointService>() else {
            // Some other endpoint implementation; resolve locally only.
            return StartStatus::Ok;
        };

        let queries = Arc::clone(&self.queries);
        endpoint.add_listener(
            RESOLVER_SERVICE_NAME,
            Arc::new(move |_msg: &EndpointMessage| {
                queries.fetch_add(1, Ordering::Relaxed);
            }),
        );
        info!(group = %group.peer_group_id(), "[Resolver] ✓ Listening on endpoint");
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        self.handlers.write().clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_routes_to_named_handler() {
        let resolver = ResolverService::new();
        resolver.register_handler(
            "echo",
            Arc::new(|payload: &[u8]| Some(payload.to_vec())),
        );
        resolver.register_handler("silent", Arc::new(|_: &[u8]| None));

        assert_eq!(resolver.query("echo", b"ping").unwrap(), b"ping".to_vec());
        assert_eq!(
            resolver.query("silent", b"ping"),
            Err(ResolverError::NoAnswer("silent".into()))
        );
        assert_eq!(
            resolver.query("missing", b""),
            Err(ResolverError::UnknownHandler("missing".into()))
        );
        assert_eq!(resolver.query_count(), 3);
    }

    #[test]
    fn test_unbound_resolver_fails_to_start() {
        let resolver = ResolverService::new();
        assert_eq!(resolver.start_app(&[]), StartStatus::Failed);
    }
}
