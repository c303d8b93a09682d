//! Error types for the read/write core.

use crate::types::{ObjectIdentifier, ObjectType, PropertyIdentifier};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while turning a command into a request descriptor.
///
/// These are raised before anything is submitted and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Missing arguments: expected at least {expected}, got {found}")]
    MissingArguments { expected: usize, found: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown object type: {0}")]
    InvalidObjectType(String),

    #[error("Invalid object instance: {0}")]
    InvalidInstance(String),

    #[error("Invalid property for object type: {object_type} | {property}")]
    UnsupportedProperty { object_type: String, property: String },

    #[error("Invalid array index: {0}")]
    InvalidArrayIndex(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Cannot convert {token:?} to {expected}")]
    InvalidValue { token: String, expected: String },

    #[error("Invalid value datatype, expecting {expected}")]
    TypeMismatch { expected: String },

    #[error("Provide at least one property for {0}")]
    MissingPropertyList(ObjectIdentifier),

    #[error("At least one read access specification required")]
    MissingReadSpec,
}

/// Errors raised by the application-tag codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unexpected end of data")]
    Truncated,

    #[error("Expected {expected}, found {found}")]
    TagMismatch { expected: String, found: String },

    #[error("Invalid tag at offset {0}")]
    InvalidTag(usize),

    #[error("Unbalanced constructed tag {0}")]
    UnbalancedTag(u8),

    #[error("Constructed tags nested deeper than {0}")]
    NestingTooDeep(usize),

    #[error("Trailing data after value ({0} bytes)")]
    TrailingData(usize),

    #[error("Invalid encoding for {0}")]
    InvalidEncoding(&'static str),

    #[error("Unsupported character set {0}")]
    UnsupportedCharset(u8),
}

/// Errors surfaced to callers of a session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("BACnet stack not running - start the session first")]
    ApplicationNotStarted,

    #[error("Unrecognized service")]
    UnrecognizedService,

    #[error("Segmentation not supported")]
    SegmentationNotSupported,

    #[error("No response from controller: {reason}")]
    NoResponseFromController { reason: String },

    #[error("Write access denied")]
    WriteAccessDenied,

    #[error("Unknown datatype for {object_type} {property}")]
    UnknownDatatype {
        object_type: ObjectType,
        property: PropertyIdentifier,
    },

    #[error("Invalid array length: {0}")]
    InvalidArrayLength(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}
