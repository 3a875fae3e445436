//! # Identifiers
//!
//! Value types naming groups, peers, module roles and module implementations.
//!
//! Every identifier renders as a URN and parses back from it:
//!
//! ```text
//! urn:pg:group:<group-uuid>
//! urn:pg:peer:<group-uuid>:<unique-uuid>
//! urn:pg:class:<class-uuid>:<role-uuid>
//! urn:pg:spec:<class-uuid>:<role-uuid>:<spec-uuid>
//! ```
//!
//! A nil role marks the base class of a role family.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::IdParseError;

/// Common prefix of every identifier URN.
pub const URN_PREFIX: &str = "urn:pg:";

/// Split `urn:pg:<kind>:<a>:<b>...` into its uuid components.
fn parse_urn(input: &str, kind: &'static str, parts: usize) -> Result<Vec<Uuid>, IdParseError> {
    let rest = input
        .strip_prefix(URN_PREFIX)
        .and_then(|r| r.strip_prefix(kind))
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| IdParseError::WrongKind {
            expected: kind,
            input: input.to_string(),
        })?;

    let uuids = rest
        .split(':')
        .map(|p| {
            Uuid::parse_str(p).map_err(|_| IdParseError::MalformedComponent {
                component: p.to_string(),
                input: input.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if uuids.len() != parts {
        return Err(IdParseError::WrongArity {
            expected: parts,
            found: uuids.len(),
            input: input.to_string(),
        });
    }
    Ok(uuids)
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.to_string()
            }
        }
    };
}

// =============================================================================
// PEER GROUP ID
// =============================================================================

/// Identifier of a peer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerGroupId(Uuid);

impl PeerGroupId {
    /// The root ("world") group every process boots first.
    pub const WORLD: Self = Self(Uuid::from_u128(0x5047_0000_0000_4000_8000_0000_0000_0001));

    /// The default network-wide group instantiated below the root.
    pub const NET: Self = Self(Uuid::from_u128(0x5047_0000_0000_4000_8000_0000_0000_0002));

    /// Create a fresh random group id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The unique portion of the id, suitable as a directory or file key.
    #[must_use]
    pub fn unique_value(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for PeerGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URN_PREFIX}group:{}", self.0)
    }
}

impl FromStr for PeerGroupId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_urn(s, "group", 1)?;
        Ok(Self(parts[0]))
    }
}

string_serde!(PeerGroupId);

// =============================================================================
// PEER ID
// =============================================================================

/// Identifier of a peer within a particular group.
///
/// A peer keeps the same unique value in every group it joins; only the
/// group component changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId {
    group: PeerGroupId,
    unique: Uuid,
}

impl PeerId {
    /// Create a new peer with a random unique value.
    #[must_use]
    pub fn new(group: PeerGroupId) -> Self {
        Self {
            group,
            unique: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub const fn from_parts(group: PeerGroupId, unique: Uuid) -> Self {
        Self { group, unique }
    }

    /// The same peer, as seen from another group.
    #[must_use]
    pub const fn in_group(&self, group: PeerGroupId) -> Self {
        Self {
            group,
            unique: self.unique,
        }
    }

    #[must_use]
    pub const fn group(&self) -> PeerGroupId {
        self.group
    }

    #[must_use]
    pub const fn unique(&self) -> Uuid {
        self.unique
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URN_PREFIX}peer:{}:{}", self.group.0, self.unique)
    }
}

impl FromStr for PeerId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_urn(s, "peer", 2)?;
        Ok(Self {
            group: PeerGroupId(parts[0]),
            unique: parts[1],
        })
    }
}

string_serde!(PeerId);

// =============================================================================
// MODULE CLASS ID
// =============================================================================

/// Identifies a role within a group, e.g. "the endpoint service slot".
///
/// Several instances of the same kind of module coexist by deriving
/// sub-roles from a common base class (see [`ModuleClassId::new_role`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleClassId {
    class: Uuid,
    role: Uuid,
}

impl ModuleClassId {
    /// Create a new, random base class.
    #[must_use]
    pub fn new() -> Self {
        Self {
            class: Uuid::new_v4(),
            role: Uuid::nil(),
        }
    }

    /// A base class with a fixed value, for well-known roles.
    #[must_use]
    pub const fn well_known(class: u128) -> Self {
        Self {
            class: Uuid::from_u128(class),
            role: Uuid::nil(),
        }
    }

    /// Derive a fresh sub-role of this id's base class.
    #[must_use]
    pub fn new_role(&self) -> Self {
        Self {
            class: self.class,
            role: Uuid::new_v4(),
        }
    }

    /// Derive a deterministic sub-role of this id's base class.
    #[must_use]
    pub const fn with_role(&self, role: u128) -> Self {
        Self {
            class: self.class,
            role: Uuid::from_u128(role),
        }
    }

    #[must_use]
    pub const fn base_class(&self) -> Self {
        Self {
            class: self.class,
            role: Uuid::nil(),
        }
    }

    #[must_use]
    pub fn is_base_class(&self) -> bool {
        self.role.is_nil()
    }

    #[must_use]
    pub fn is_same_base_class(&self, other: &Self) -> bool {
        self.class == other.class
    }
}

impl Default for ModuleClassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URN_PREFIX}class:{}:{}", self.class, self.role)
    }
}

impl FromStr for ModuleClassId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_urn(s, "class", 2)?;
        Ok(Self {
            class: parts[0],
            role: parts[1],
        })
    }
}

string_serde!(ModuleClassId);

// =============================================================================
// MODULE SPEC ID
// =============================================================================

/// Identifies a concrete specification conforming to a [`ModuleClassId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleSpecId {
    class: ModuleClassId,
    spec: Uuid,
}

impl ModuleSpecId {
    /// Create a new random specification of `class`.
    #[must_use]
    pub fn new(class: ModuleClassId) -> Self {
        Self {
            class,
            spec: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub const fn well_known(class: ModuleClassId, spec: u128) -> Self {
        Self {
            class,
            spec: Uuid::from_u128(spec),
        }
    }

    /// The class (role) this specification was derived from.
    #[must_use]
    pub const fn class_id(&self) -> ModuleClassId {
        self.class
    }

    #[must_use]
    pub const fn base_class(&self) -> ModuleClassId {
        self.class.base_class()
    }

    #[must_use]
    pub fn is_of_class(&self, class: &ModuleClassId) -> bool {
        self.class.is_same_base_class(class)
    }
}

impl fmt::Display for ModuleSpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{URN_PREFIX}spec:{}:{}:{}",
            self.class.class, self.class.role, self.spec
        )
    }
}

impl FromStr for ModuleSpecId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_urn(s, "spec", 3)?;
        Ok(Self {
            class: ModuleClassId {
                class: parts[0],
                role: parts[1],
            },
            spec: parts[2],
        })
    }
}

string_serde!(ModuleSpecId);

// =============================================================================
// WELL-KNOWN IDS
// =============================================================================

/// Roles and reference specifications every process agrees on.
pub mod well_known {
    use super::{ModuleClassId, ModuleSpecId};

    pub const PEER_GROUP_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0001);
    pub const ENDPOINT_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0002);
    pub const RESOLVER_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0003);
    pub const DISCOVERY_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0004);
    pub const PIPE_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0005);
    pub const MEMBERSHIP_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0006);
    pub const RENDEZVOUS_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0007);
    pub const PEERINFO_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0008);
    pub const ACCESS_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_0009);
    pub const TCP_TRANSPORT_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_000a);
    pub const HTTP_TRANSPORT_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_000b);
    pub const RELAY_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_000c);
    pub const APPLICATION_CLASS: ModuleClassId = ModuleClassId::well_known(0x5047_0001_0000_4000_8000_0000_0000_000d);

    /// Services that must be running once a group finishes construction.
    pub const REQUIRED_SERVICES: [ModuleClassId; 4] =
        [ENDPOINT_CLASS, RESOLVER_CLASS, MEMBERSHIP_CLASS, ACCESS_CLASS];

    pub const STD_PEER_GROUP_SPEC: ModuleSpecId = ModuleSpecId::well_known(PEER_GROUP_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0001);
    pub const REF_ENDPOINT_SPEC: ModuleSpecId = ModuleSpecId::well_known(ENDPOINT_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0002);
    pub const REF_RESOLVER_SPEC: ModuleSpecId = ModuleSpecId::well_known(RESOLVER_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0003);
    pub const REF_DISCOVERY_SPEC: ModuleSpecId = ModuleSpecId::well_known(DISCOVERY_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0004);
    pub const REF_MEMBERSHIP_SPEC: ModuleSpecId = ModuleSpecId::well_known(MEMBERSHIP_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0006);
    pub const REF_ACCESS_SPEC: ModuleSpecId = ModuleSpecId::well_known(ACCESS_CLASS, 0x5047_0002_0000_4000_8000_0000_0000_0009);
}
