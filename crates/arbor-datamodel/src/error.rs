//! Error taxonomy for attribute access, endpoint registration, and table
//! validation

use arbor_schema::{AttributeId, AttributePath, ClusterId, EndpointId, HookError};
use thiserror::Error;

/// Failure of an attribute read or write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("endpoint {0} is not present or not enabled")]
    UnsupportedEndpoint(EndpointId),
    #[error("no server cluster {cluster} on endpoint {endpoint}")]
    UnsupportedCluster {
        endpoint: EndpointId,
        cluster: ClusterId,
    },
    #[error("no attribute {0}")]
    UnsupportedAttribute(AttributePath),
    #[error("access to {0} denied")]
    UnsupportedAccess(AttributePath),
    #[error("attribute {0} is not writable")]
    UnsupportedWrite(AttributePath),
    #[error("buffer too small: need {needed} bytes, have {have}")]
    ResourceExhausted { needed: usize, have: usize },
    #[error("value for {0} is outside the declared bounds")]
    OutOfRange(AttributePath),
    #[error("write to {path} vetoed: {reason}")]
    ChangeRejected {
        path: AttributePath,
        reason: &'static str,
    },
    #[error("dynamic endpoint {0} has no fixed-region attribute storage")]
    DynamicEndpointStorage(EndpointId),
    #[error("no external-store handler registered for {0}")]
    NoExternalHandler(AttributePath),
}

/// Failure of a dynamic endpoint registration; the registry is untouched on
/// every variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("no capacity at slot {slot}: {reason}")]
    NoMemory { slot: usize, reason: &'static str },
    #[error("invalid dynamic endpoint registration: {0}")]
    InvalidArgument(&'static str),
    #[error("endpoint {0} is already registered")]
    EndpointExists(EndpointId),
}

/// Failure while validating the generated tables at engine construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("endpoint {0} appears more than once in the fixed tables")]
    DuplicateEndpoint(EndpointId),
    #[error(transparent)]
    Hooks(#[from] HookError),
    #[error("singleton {cluster}/{attribute} declared with sizes {first} and {second}")]
    SingletonSizeMismatch {
        cluster: ClusterId,
        attribute: AttributeId,
        first: u16,
        second: u16,
    },
    #[error("bounds declared on {cluster}/{attribute}, which is not a narrow scalar")]
    InvalidBounds {
        cluster: ClusterId,
        attribute: AttributeId,
    },
}
