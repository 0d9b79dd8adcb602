//! Collaborator traits at the engine boundary
//!
//! The engine never performs I/O of its own: durable storage, change
//! reporting, access control, and externally-stored attribute values are all
//! reached through these seams. Every call is synchronous and bounded; none
//! may block the caller meaningfully.

use arbor_schema::{AttributeDescriptor, AttributePath, EndpointId};
use thiserror::Error;

use crate::error::AccessError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("no stored value")]
    NotFound,
    #[error("storage i/o failed: {0}")]
    Io(String),
}

/// Durable storage for nonvolatile attribute values, keyed by attribute path
pub trait PersistenceStore {
    fn read_value(&mut self, path: &AttributePath) -> Result<Vec<u8>, PersistError>;
    fn write_value(&mut self, path: &AttributePath, value: &[u8]) -> Result<(), PersistError>;
}

/// Dirty-path sink for the reporting/subscription layer
///
/// Fire-and-forget: the engine calls these after every mutation and never
/// inspects an outcome.
pub trait ReportSink {
    /// One attribute changed
    fn mark_dirty(&mut self, path: &AttributePath);
    /// Endpoint topology or parts list changed; everything under the
    /// endpoint is suspect
    fn mark_endpoint_dirty(&mut self, endpoint: EndpointId);
}

/// Read/write permission checks consulted before any copy
pub trait AccessControl {
    fn can_read(&self, path: &AttributePath) -> bool;
    fn can_write(&self, path: &AttributePath) -> bool;
}

/// Access-control policy that permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_read(&self, _path: &AttributePath) -> bool {
        true
    }

    fn can_write(&self, _path: &AttributePath) -> bool {
        true
    }
}

/// Backing store for externally-stored attributes
pub trait ExternalStore {
    /// Fill `buf` with the current value; returns the logical byte count
    fn read(
        &mut self,
        path: &AttributePath,
        descriptor: &AttributeDescriptor,
        buf: &mut [u8],
    ) -> Result<usize, AccessError>;

    fn write(
        &mut self,
        path: &AttributePath,
        descriptor: &AttributeDescriptor,
        value: &[u8],
    ) -> Result<(), AccessError>;
}

/// Collaborators handed to the engine at construction
///
/// All fields are optional; a missing persistence store is fatal only when
/// the tables actually declare nonvolatile attributes.
#[derive(Default)]
pub struct Providers {
    pub persistence: Option<Box<dyn PersistenceStore>>,
    pub reporter: Option<Box<dyn ReportSink>>,
    pub access: Option<Box<dyn AccessControl>>,
    pub external: Option<Box<dyn ExternalStore>>,
}
