//! # Reference Services
//!
//! Minimal in-process implementations of the services every standard group
//! requires, so that a root group can be built without any network stack.
//!
//! | Service | Role | Waits for |
//! |---------|------|-----------|
//! | [`EndpointService`] | endpoint | nothing |
//! | [`ResolverService`] | resolver | endpoint |
//! | [`NoneMembershipService`] | membership | nothing |
//! | [`AlwaysAccessService`] | access | membership |
//! | [`LocalDiscoveryService`] | discovery | nothing |
//!
//! Services hold their group weakly; the group owns them, not the reverse.

mod access;
mod discovery;
mod endpoint;
mod membership;
mod resolver;

use std::sync::{Arc, Weak};

use peer_group::{Module, ModuleError, ModuleFactories, PeerGroupApi};
use shared_types::{well_known, ModuleImplAdvertisement, ModuleSpecId};

pub use access::{AccessResult, AlwaysAccessService};
pub use discovery::LocalDiscoveryService;
pub use endpoint::{EndpointError, EndpointMessage, EndpointService, MessageListener};
pub use membership::NoneMembershipService;
pub use resolver::{QueryHandler, ResolverError, ResolverService};

pub const ENDPOINT_CODE: &str = "pg.impl.endpoint.Loopback";
pub const RESOLVER_CODE: &str = "pg.impl.resolver.Local";
pub const MEMBERSHIP_CODE: &str = "pg.impl.membership.None";
pub const ACCESS_CODE: &str = "pg.impl.access.Always";
pub const DISCOVERY_CODE: &str = "pg.impl.discovery.Local";

fn reference_impl(spec_id: ModuleSpecId, code: &str, description: &str) -> ModuleImplAdvertisement {
    ModuleImplAdvertisement::new(spec_id, code)
        .with_description(description)
        .with_provider("pg")
}

/// Register the reference implementations of every standard service.
pub fn register_reference_modules(factories: &ModuleFactories) {
    factories.register(
        reference_impl(well_known::REF_ENDPOINT_SPEC, ENDPOINT_CODE, "Loopback endpoint"),
        || -> Arc<dyn Module> { Arc::new(EndpointService::new()) },
    );
    factories.register(
        reference_impl(well_known::REF_RESOLVER_SPEC, RESOLVER_CODE, "Local query resolver"),
        || -> Arc<dyn Module> { Arc::new(ResolverService::new()) },
    );
    factories.register(
        reference_impl(well_known::REF_MEMBERSHIP_SPEC, MEMBERSHIP_CODE, "Open membership"),
        || -> Arc<dyn Module> { Arc::new(NoneMembershipService::new()) },
    );
    factories.register(
        reference_impl(well_known::REF_ACCESS_SPEC, ACCESS_CODE, "Permit-all access control"),
        || -> Arc<dyn Module> { Arc::new(AlwaysAccessService::new()) },
    );
    factories.register(
        reference_impl(well_known::REF_DISCOVERY_SPEC, DISCOVERY_CODE, "Enclosing-group discovery"),
        || -> Arc<dyn Module> { Arc::new(LocalDiscoveryService::new()) },
    );
}

/// The group a service was bound to, if it is still alive.
pub(crate) fn upgrade(group: &Option<Weak<dyn PeerGroupApi>>) -> Result<Arc<dyn PeerGroupApi>, ModuleError> {
    group
        .as_ref()
        .and_then(Weak::upgrade)
        .ok_or_else(|| ModuleError::Other("service is not bound to a live group".into()))
}
