//! # Compatibility Statements
//!
//! A module advertises the minimal runtime it needs as an ordered list of
//! key/value pairs. The check is closed: a statement passes only if every
//! key is recognized, the runtime format is at least the required version
//! and the binding matches exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::CompatibilityError;

/// Key carrying the minimum runtime format, e.g. `RS1.0`.
pub const RUNTIME_FORMAT_KEY: &str = "Efmt";
/// Key carrying the binding protocol version.
pub const BINDING_KEY: &str = "Bind";

/// Runtime format family of this implementation.
pub const RUNTIME_FORMAT_FAMILY: &str = "RS";
/// Runtime format version of this implementation.
pub const RUNTIME_FORMAT_VERSION: [u32; 2] = [1, 1];
/// Binding protocol version of this implementation.
pub const BINDING_VERSION: &str = "V2.0 Ref Impl";

/// Ordered set of compatibility key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityStatement {
    entries: Vec<(String, String)>,
}

impl CompatibilityStatement {
    /// An empty statement. Rejected by [`check`](Self::check) until both keys are set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The statement every module built against this runtime carries.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(RUNTIME_FORMAT_KEY, format!("{RUNTIME_FORMAT_FAMILY}1.0"))
            .with(BINDING_KEY, BINDING_VERSION)
    }

    /// Append an entry, replacing any previous value for the key in place.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check this statement against the running implementation.
    pub fn check(&self) -> Result<(), CompatibilityError> {
        let mut saw_format = false;
        let mut saw_binding = false;

        for (key, value) in self.entries() {
            match key {
                RUNTIME_FORMAT_KEY => {
                    check_runtime_format(value)?;
                    saw_format = true;
                }
                BINDING_KEY => {
                    if value != BINDING_VERSION {
                        return Err(CompatibilityError::BindingMismatch {
                            required: value.to_string(),
                            available: BINDING_VERSION.to_string(),
                        });
                    }
                    saw_binding = true;
                }
                other => return Err(CompatibilityError::UnknownKey(other.to_string())),
            }
        }

        if !saw_format {
            return Err(CompatibilityError::MissingKey(RUNTIME_FORMAT_KEY));
        }
        if !saw_binding {
            return Err(CompatibilityError::MissingKey(BINDING_KEY));
        }
        Ok(())
    }
}

/// `true` when `statement` passes [`CompatibilityStatement::check`].
#[must_use]
pub fn compatible(statement: &CompatibilityStatement) -> bool {
    statement.check().is_ok()
}

fn check_runtime_format(value: &str) -> Result<(), CompatibilityError> {
    let split = value
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| CompatibilityError::MalformedFormat(value.to_string()))?;
    let (family, version) = value.split_at(split);

    if family != RUNTIME_FORMAT_FAMILY {
        return Err(CompatibilityError::FormatMismatch {
            required: family.to_string(),
            available: RUNTIME_FORMAT_FAMILY.to_string(),
        });
    }

    let required = version
        .split('.')
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| CompatibilityError::MalformedFormat(value.to_string()))?;

    // Missing trailing components compare as zero.
    let width = required.len().max(RUNTIME_FORMAT_VERSION.len());
    let component = |v: &[u32], i: usize| v.get(i).copied().unwrap_or(0);
    for i in 0..width {
        let need = component(&required, i);
        let have = component(&RUNTIME_FORMAT_VERSION, i);
        if have > need {
            return Ok(());
        }
        if have < need {
            return Err(CompatibilityError::RuntimeTooOld {
                required: value.to_string(),
                available: runtime_format(),
            });
        }
    }
    Ok(())
}

/// The runtime format string of this implementation, e.g. `RS1.1`.
#[must_use]
pub fn runtime_format() -> String {
    let version = RUNTIME_FORMAT_VERSION
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".");
    format!("{RUNTIME_FORMAT_FAMILY}{version}")
}

impl fmt::Display for CompatibilityStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .entries()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{rendered}]")
    }
}
