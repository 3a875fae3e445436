//! # Error Types
//!
//! Errors raised while parsing identifiers, checking compatibility
//! statements and interpreting advertisements.

use thiserror::Error;

/// An identifier URN could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("expected a `urn:pg:{expected}:` identifier, got {input:?}")]
    WrongKind { expected: &'static str, input: String },

    #[error("expected {expected} uuid component(s) in {input:?}, found {found}")]
    WrongArity {
        expected: usize,
        found: usize,
        input: String,
    },

    #[error("malformed uuid component {component:?} in {input:?}")]
    MalformedComponent { component: String, input: String },
}

/// A module's compatibility statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompatibilityError {
    /// Statements are closed: any key this runtime does not know rejects the module.
    #[error("unrecognized compatibility key {0:?}")]
    UnknownKey(String),

    #[error("compatibility statement is missing the {0:?} key")]
    MissingKey(&'static str),

    #[error("malformed runtime format {0:?}")]
    MalformedFormat(String),

    #[error("runtime format family {required:?} does not match {available:?}")]
    FormatMismatch { required: String, available: String },

    #[error("module requires runtime format {required} but this runtime provides {available}")]
    RuntimeTooOld { required: String, available: String },

    #[error("binding {required:?} does not match {available:?}")]
    BindingMismatch { required: String, available: String },
}

/// An advertisement could not be interpreted.
#[derive(Debug, Clone, Error)]
pub enum AdvertisementError {
    #[error("implementation advertisement for {0} carries no parameter section")]
    MissingParams(String),

    #[error("malformed parameter section: {0}")]
    MalformedParams(String),
}
