//! # Configuration Parameters
//!
//! Per-role enable flags and opaque parameter blobs consulted while a group
//! builds its module tables. A group never mutates the configuration it was
//! handed; children receive a copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ModuleClassId, PeerGroupId, PeerId};

fn enabled_by_default() -> bool {
    true
}

/// Configuration of one module role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            param: None,
        }
    }
}

/// Effective configuration of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigParams {
    #[serde(default)]
    pub peer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
    #[serde(default)]
    pub services: BTreeMap<ModuleClassId, ServiceConfig>,
}

impl ConfigParams {
    /// A fresh configuration for a process that has none: a new peer
    /// identity in the root group and every role enabled.
    pub fn synthesize(peer_name: impl Into<String>) -> Self {
        Self {
            peer_name: peer_name.into(),
            peer_id: Some(PeerId::new(PeerGroupId::WORLD)),
            services: BTreeMap::new(),
        }
    }

    /// The entry for `class_id`, falling back to its base class.
    fn entry(&self, class_id: &ModuleClassId) -> Option<&ServiceConfig> {
        self.services
            .get(class_id)
            .or_else(|| self.services.get(&class_id.base_class()))
    }

    /// Roles without an entry are enabled.
    pub fn is_service_enabled(&self, class_id: &ModuleClassId) -> bool {
        self.entry(class_id).map_or(true, |s| s.enabled)
    }

    pub fn service_param(&self, class_id: &ModuleClassId) -> Option<&Value> {
        self.entry(class_id).and_then(|s| s.param.as_ref())
    }

    pub fn set_service_enabled(&mut self, class_id: ModuleClassId, enabled: bool) {
        self.services.entry(class_id).or_default().enabled = enabled;
    }

    pub fn set_service_param(&mut self, class_id: ModuleClassId, param: Value) {
        self.services.entry(class_id).or_default().param = Some(param);
    }

    /// Layer `other` on top of `self`. Entries in `other` win; an empty
    /// peer name or absent peer id leaves the current value in place.
    pub fn overlay(&mut self, other: &ConfigParams) {
        if !other.peer_name.is_empty() {
            self.peer_name = other.peer_name.clone();
        }
        if other.peer_id.is_some() {
            self.peer_id = other.peer_id;
        }
        for (class_id, service) in &other.services {
            self.services.insert(*class_id, service.clone());
        }
    }

    /// Apply per-role parameter overrides, e.g. from a group advertisement.
    #[must_use]
    pub fn with_param_overrides(mut self, overrides: &BTreeMap<ModuleClassId, Value>) -> Self {
        for (class_id, param) in overrides {
            self.set_service_param(*class_id, param.clone());
        }
        self
    }
}
