//! Descriptor types for the generated endpoint/cluster/attribute tables

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::hooks::ClusterHooks;
use crate::ids::{AttributeId, ClusterId, DeviceType, EndpointId};

/// Size/encoding class of an attribute value
///
/// The class decides how the copy engine moves bytes: fixed scalars copy
/// whole, strings carry a length prefix and truncate, lists are stored as a
/// two-byte element-count header only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    /// Fixed-width value, width given by the descriptor size
    Scalar,
    /// String with a 1-byte length prefix
    ShortString,
    /// String with a 2-byte length prefix
    LongString,
    /// List; only the 2-byte element-count header lives in attribute storage
    List,
}

impl ElementType {
    /// Length-prefix width in bytes, zero for scalars
    pub fn prefix_len(&self) -> usize {
        match self {
            ElementType::Scalar => 0,
            ElementType::ShortString => 1,
            ElementType::LongString | ElementType::List => 2,
        }
    }
}

bitflags! {
    /// Capability mask of a single attribute
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttributeFlags: u16 {
        /// Storage is shared across every endpoint that declares the attribute
        const SINGLETON = 1 << 0;
        /// Value lives outside the engine, behind the external-store collaborator
        const EXTERNAL = 1 << 1;
        /// Descriptor carries a min/max bound pair
        const MIN_MAX = 1 << 2;
        /// Value is automatically persisted across reboots
        const NONVOLATILE = 1 << 3;
        /// Value accepts external writes
        const WRITABLE = 1 << 4;
        /// Value is list-typed
        const LIST = 1 << 5;
    }
}

bitflags! {
    /// Direction mask of a cluster instance
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClusterFlags: u8 {
        /// Cluster acts as a server and holds attribute storage
        const SERVER = 1 << 0;
        /// Cluster acts as a client; no attribute storage
        const CLIENT = 1 << 1;
    }
}

/// Generated default for an attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// No generated default; storage is zero-filled
    Empty,
    /// Narrow numeric default packed into a 32-bit slot; decoded with an
    /// explicit byte order for sizes up to four bytes
    Inline(u32),
    /// Out-of-line default bytes for strings and wide scalars
    Bytes(Vec<u8>),
}

/// Min/max bound pair for narrow scalar attributes
///
/// Compared as unsigned 32-bit values after byte-order decode. Wider
/// constraints belong to cluster logic, not the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBounds {
    pub min: u32,
    pub max: u32,
}

/// Immutable description of one attribute, from the generated tables
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub id: AttributeId,
    pub element_type: ElementType,
    /// Declared storage size in bytes, length prefix included
    pub size: u16,
    pub flags: AttributeFlags,
    pub default: DefaultValue,
    /// Present only when `MIN_MAX` is set
    pub bounds: Option<ValueBounds>,
}

impl AttributeDescriptor {
    pub fn is_singleton(&self) -> bool {
        self.flags.contains(AttributeFlags::SINGLETON)
    }

    pub fn is_external(&self) -> bool {
        self.flags.contains(AttributeFlags::EXTERNAL)
    }

    pub fn is_nonvolatile(&self) -> bool {
        self.flags.contains(AttributeFlags::NONVOLATILE)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(AttributeFlags::WRITABLE)
    }

    /// Whether this attribute occupies a range of the per-endpoint fixed
    /// storage region (neither singleton nor externally stored)
    pub fn occupies_endpoint_storage(&self) -> bool {
        !self.is_singleton() && !self.is_external()
    }

    /// Logical length of a stored value: prefix plus payload for strings,
    /// header width for lists, declared size for scalars
    pub fn logical_len(&self, stored: &[u8]) -> usize {
        match self.element_type {
            ElementType::Scalar => self.size as usize,
            ElementType::ShortString => {
                let payload = stored.first().copied().unwrap_or(0) as usize;
                (1 + payload).min(stored.len())
            }
            ElementType::LongString => {
                if stored.len() < 2 {
                    return stored.len();
                }
                let payload = u16::from_le_bytes([stored[0], stored[1]]) as usize;
                (2 + payload).min(stored.len())
            }
            ElementType::List => 2.min(stored.len()),
        }
    }
}

/// Immutable description of one cluster instance on an endpoint type
#[derive(Debug, Clone)]
pub struct ClusterDescriptor {
    pub id: ClusterId,
    pub flags: ClusterFlags,
    /// Attributes in declaration order; order defines storage layout
    pub attributes: Vec<AttributeDescriptor>,
    /// Lifecycle hook table for this cluster
    pub hooks: ClusterHooks,
}

impl ClusterDescriptor {
    pub fn is_server(&self) -> bool {
        self.flags.contains(ClusterFlags::SERVER)
    }

    /// Total packed size of this cluster's endpoint-storage attributes
    pub fn storage_size(&self) -> usize {
        self.attributes
            .iter()
            .filter(|a| a.occupies_endpoint_storage())
            .map(|a| a.size as usize)
            .sum()
    }

    pub fn find_attribute(&self, id: AttributeId) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

/// Ordered cluster list describing one endpoint type
#[derive(Debug, Clone, Default)]
pub struct EndpointType {
    /// Clusters in declaration order; order defines storage layout
    pub clusters: Vec<ClusterDescriptor>,
}

impl EndpointType {
    /// Total packed size of this endpoint's fixed-region storage
    pub fn storage_size(&self) -> usize {
        self.clusters.iter().map(|c| c.storage_size()).sum()
    }

    /// Number of server clusters; each gets a data-version slot
    pub fn server_cluster_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_server()).count()
    }

    /// Server cluster ids in declaration order
    pub fn server_cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.clusters
            .iter()
            .filter(|c| c.is_server())
            .map(|c| c.id)
    }

    pub fn find_server_cluster(&self, id: ClusterId) -> Option<&ClusterDescriptor> {
        self.clusters.iter().find(|c| c.id == id && c.is_server())
    }
}

/// Composition kind of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Composition {
    /// Children listed directly in the parent's parts list
    Flat,
    /// Children form a subtree under the parent
    Tree,
}

impl Default for Composition {
    fn default() -> Self {
        Self::Flat
    }
}

/// One build-time-fixed endpoint in table order
#[derive(Debug, Clone)]
pub struct FixedEndpoint {
    pub id: EndpointId,
    pub endpoint_type: Arc<EndpointType>,
    pub device_types: Vec<DeviceType>,
    pub parent: Option<EndpointId>,
    pub composition: Composition,
}

/// The generated metadata tables consumed by the engine
///
/// Table order is load-bearing: fixed-region offsets, singleton offsets, and
/// data-version slot ranges are all accumulated by walking these tables in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct DeviceTables {
    pub endpoints: Vec<FixedEndpoint>,
}

impl DeviceTables {
    /// Total fixed-region size over all fixed endpoints
    pub fn fixed_storage_size(&self) -> usize {
        self.endpoints
            .iter()
            .map(|e| e.endpoint_type.storage_size())
            .sum()
    }

    /// Whether any attribute anywhere in the tables is flagged nonvolatile
    pub fn requires_persistence(&self) -> bool {
        self.endpoints.iter().any(|e| {
            e.endpoint_type
                .clusters
                .iter()
                .any(|c| c.attributes.iter().any(|a| a.is_nonvolatile()))
        })
    }
}
