//! # Advertisements
//!
//! Serializable descriptors of modules and groups. A
//! [`ModuleImplAdvertisement`] names one concrete implementation of a
//! specification; a [`PeerGroupAdvertisement`] names a group and the
//! specification of the implementation that runs it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compat::CompatibilityStatement;
use crate::errors::AdvertisementError;
use crate::ids::{well_known, ModuleClassId, ModuleSpecId, PeerGroupId};

/// Code locator of the standard group implementation.
pub const STD_GROUP_CODE: &str = "pg.group.StdPeerGroup";

/// Indexed attribute: module specification id.
pub const ATTR_MSID: &str = "MSID";
/// Indexed attribute: peer group id.
pub const ATTR_GID: &str = "GID";
/// Indexed attribute: human readable name.
pub const ATTR_NAME: &str = "Name";
/// Indexed attribute: code locator of an implementation.
pub const ATTR_CODE: &str = "Code";

// =============================================================================
// MODULE IMPLEMENTATION ADVERTISEMENT
// =============================================================================

/// Describes one implementation of a [`ModuleSpecId`].
///
/// Several advertisements may share a specification id; each is a candidate
/// the loader can try in turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImplAdvertisement {
    pub module_spec_id: ModuleSpecId,
    /// Locator resolved to a factory at load time.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub description: String,
    pub compat: CompatibilityStatement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
}

impl ModuleImplAdvertisement {
    /// Advertisement with the standard compatibility statement and no parameters.
    pub fn new(module_spec_id: ModuleSpecId, code: impl Into<String>) -> Self {
        Self {
            module_spec_id,
            code: code.into(),
            uri: None,
            provider: String::new(),
            description: String::new(),
            compat: CompatibilityStatement::standard(),
            param: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_compat(mut self, compat: CompatibilityStatement) -> Self {
        self.compat = compat;
        self
    }

    #[must_use]
    pub fn with_param(mut self, param: Value) -> Self {
        self.param = Some(param);
        self
    }

    /// Store `params` as the parameter section of a group implementation.
    pub fn with_group_params(self, params: &StdGroupParams) -> Result<Self, AdvertisementError> {
        let value = serde_json::to_value(params)
            .map_err(|e| AdvertisementError::MalformedParams(e.to_string()))?;
        Ok(self.with_param(value))
    }

    /// Interpret the parameter section as a group implementation's module tables.
    pub fn std_group_params(&self) -> Result<StdGroupParams, AdvertisementError> {
        let param = self
            .param
            .as_ref()
            .ok_or_else(|| AdvertisementError::MissingParams(self.module_spec_id.to_string()))?;
        StdGroupParams::deserialize(param)
            .map_err(|e| AdvertisementError::MalformedParams(e.to_string()))
    }

    /// Store key. Unique per (specification, code) pair.
    pub fn key(&self) -> String {
        format!("{}#{}", self.module_spec_id, self.code)
    }

    /// The standard group implementation, running the reference services.
    pub fn std_group() -> Self {
        let params = StdGroupParams::default()
            .with_service(
                well_known::ENDPOINT_CLASS,
                ModuleRef::spec(well_known::REF_ENDPOINT_SPEC),
            )
            .with_service(
                well_known::RESOLVER_CLASS,
                ModuleRef::spec(well_known::REF_RESOLVER_SPEC),
            )
            .with_service(
                well_known::DISCOVERY_CLASS,
                ModuleRef::spec(well_known::REF_DISCOVERY_SPEC),
            )
            .with_service(
                well_known::MEMBERSHIP_CLASS,
                ModuleRef::spec(well_known::REF_MEMBERSHIP_SPEC),
            )
            .with_service(
                well_known::ACCESS_CLASS,
                ModuleRef::spec(well_known::REF_ACCESS_SPEC),
            );

        Self {
            param: serde_json::to_value(&params).ok(),
            ..Self::new(well_known::STD_PEER_GROUP_SPEC, STD_GROUP_CODE)
                .with_description("General purpose peer group implementation")
                .with_provider("pg")
        }
    }
}

// =============================================================================
// GROUP PARAMETERS
// =============================================================================

/// How a module table entry names its module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ModuleRef {
    /// Any compatible implementation of this specification.
    Spec { spec_id: ModuleSpecId },
    /// Exactly this implementation.
    Impl {
        advertisement: Box<ModuleImplAdvertisement>,
    },
}

impl ModuleRef {
    pub fn spec(spec_id: ModuleSpecId) -> Self {
        Self::Spec { spec_id }
    }

    pub fn implementation(advertisement: ModuleImplAdvertisement) -> Self {
        Self::Impl {
            advertisement: Box::new(advertisement),
        }
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec { spec_id } => write!(f, "spec {spec_id}"),
            Self::Impl { advertisement } => {
                write!(f, "impl {} ({})", advertisement.code, advertisement.module_spec_id)
            }
        }
    }
}

/// One row of a group's module table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub class_id: ModuleClassId,
    pub module: ModuleRef,
}

/// The three module tables of a standard group implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StdGroupParams {
    #[serde(default)]
    pub services: Vec<ParamEntry>,
    #[serde(default)]
    pub transports: Vec<ParamEntry>,
    #[serde(default)]
    pub apps: Vec<ParamEntry>,
}

impl StdGroupParams {
    #[must_use]
    pub fn with_service(mut self, class_id: ModuleClassId, module: ModuleRef) -> Self {
        self.services.push(ParamEntry { class_id, module });
        self
    }

    #[must_use]
    pub fn with_transport(mut self, class_id: ModuleClassId, module: ModuleRef) -> Self {
        self.transports.push(ParamEntry { class_id, module });
        self
    }

    #[must_use]
    pub fn with_app(mut self, class_id: ModuleClassId, module: ModuleRef) -> Self {
        self.apps.push(ParamEntry { class_id, module });
        self
    }
}

// =============================================================================
// PEER GROUP ADVERTISEMENT
// =============================================================================

/// Names a group and the implementation that runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerGroupAdvertisement {
    pub id: PeerGroupId,
    pub module_spec_id: ModuleSpecId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Per-role parameters overriding the effective configuration.
    #[serde(default)]
    pub service_params: BTreeMap<ModuleClassId, Value>,
}

impl PeerGroupAdvertisement {
    pub fn new(id: PeerGroupId, module_spec_id: ModuleSpecId, name: impl Into<String>) -> Self {
        Self {
            id,
            module_spec_id,
            name: name.into(),
            description: String::new(),
            service_params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_service_param(mut self, class_id: ModuleClassId, param: Value) -> Self {
        self.service_params.insert(class_id, param);
        self
    }

    pub fn service_param(&self, class_id: &ModuleClassId) -> Option<&Value> {
        self.service_params.get(class_id)
    }
}

// =============================================================================
// ADVERTISEMENT ENVELOPE
// =============================================================================

/// Kinds of advertisement held by a content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdvertisementKind {
    ModuleImpl,
    PeerGroup,
}

impl AdvertisementKind {
    pub const ALL: [Self; 2] = [Self::ModuleImpl, Self::PeerGroup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModuleImpl => "module-impl",
            Self::PeerGroup => "peer-group",
        }
    }
}

impl fmt::Display for AdvertisementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any advertisement a content store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Advertisement {
    ModuleImpl(ModuleImplAdvertisement),
    PeerGroup(PeerGroupAdvertisement),
}

impl Advertisement {
    pub fn kind(&self) -> AdvertisementKind {
        match self {
            Self::ModuleImpl(_) => AdvertisementKind::ModuleImpl,
            Self::PeerGroup(_) => AdvertisementKind::PeerGroup,
        }
    }

    /// Unique key within the advertisement's kind.
    pub fn key(&self) -> String {
        match self {
            Self::ModuleImpl(adv) => adv.key(),
            Self::PeerGroup(adv) => adv.id.to_string(),
        }
    }

    /// Attribute/value pairs a store indexes this advertisement under.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ModuleImpl(adv) => vec![
                (ATTR_MSID, adv.module_spec_id.to_string()),
                (ATTR_CODE, adv.code.clone()),
            ],
            Self::PeerGroup(adv) => vec![
                (ATTR_GID, adv.id.to_string()),
                (ATTR_MSID, adv.module_spec_id.to_string()),
                (ATTR_NAME, adv.name.clone()),
            ],
        }
    }

    pub fn matches(&self, attr: &str, value: &str) -> bool {
        self.attributes()
            .iter()
            .any(|(a, v)| *a == attr && v == value)
    }

    pub fn as_module_impl(&self) -> Option<&ModuleImplAdvertisement> {
        match self {
            Self::ModuleImpl(adv) => Some(adv),
            Self::PeerGroup(_) => None,
        }
    }

    pub fn as_peer_group(&self) -> Option<&PeerGroupAdvertisement> {
        match self {
            Self::PeerGroup(adv) => Some(adv),
            Self::ModuleImpl(_) => None,
        }
    }
}

impl From<ModuleImplAdvertisement> for Advertisement {
    fn from(adv: ModuleImplAdvertisement) -> Self {
        Self::ModuleImpl(adv)
    }
}

impl From<PeerGroupAdvertisement> for Advertisement {
    fn from(adv: PeerGroupAdvertisement) -> Self {
        Self::PeerGroup(adv)
    }
}
