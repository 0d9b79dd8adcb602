//! Attribute offset resolution
//!
//! Walks the registry and the matched endpoint's type in declaration order,
//! accumulating byte offsets for every entry that precedes the requested
//! attribute in the fixed region. The accumulator only ever advances past
//! entries that actually occupy fixed storage: dynamic endpoints, singleton
//! attributes, and external attributes contribute nothing. The resulting
//! location is the only way to obtain a storage slice, so the walk below is
//! the single place where layout arithmetic happens.

use arbor_schema::{AttributeDescriptor, AttributePath, ClusterDescriptor};

use crate::error::AccessError;
use crate::registry::EndpointRegistry;
use crate::store::{AttributeLocation, AttributeStore};

/// A resolved attribute: its descriptor, owning cluster, and storage slot
#[derive(Debug)]
pub struct Located<'a> {
    /// Registry slot index of the endpoint
    pub slot: usize,
    /// Index among the endpoint's server clusters; selects the data-version
    /// counter
    pub server_cluster_index: usize,
    pub cluster: &'a ClusterDescriptor,
    pub descriptor: &'a AttributeDescriptor,
    pub location: AttributeLocation,
}

/// Resolve a path to a descriptor and storage location
///
/// Only enabled endpoints match; a present-but-disabled endpoint resolves
/// like an absent one. Disabled fixed endpoints still contribute their
/// declared sizes to the accumulator, since the fixed region's layout is
/// decided by the tables, not by enable state.
pub fn locate<'a>(
    registry: &'a EndpointRegistry,
    store: &AttributeStore,
    path: &AttributePath,
) -> Result<Located<'a>, AccessError> {
    let mut offset = 0usize;
    let mut matched = None;

    for (index, slot) in registry.slots() {
        if let Some(record) = slot {
            if record.id == path.endpoint && record.enabled {
                matched = Some((index, record));
                break;
            }
            if !registry.is_dynamic_slot(index) {
                offset += record.endpoint_type.storage_size();
            }
        }
    }
    let (slot, record) =
        matched.ok_or(AccessError::UnsupportedEndpoint(path.endpoint))?;

    let mut server_cluster_index = 0usize;
    let mut found = None;
    for cluster in &record.endpoint_type.clusters {
        if cluster.id == path.cluster && cluster.is_server() {
            found = Some(cluster);
            break;
        }
        offset += cluster.storage_size();
        if cluster.is_server() {
            server_cluster_index += 1;
        }
    }
    let cluster = found.ok_or(AccessError::UnsupportedCluster {
        endpoint: path.endpoint,
        cluster: path.cluster,
    })?;

    for attr in &cluster.attributes {
        if attr.id == path.attribute {
            let location = if attr.is_external() {
                AttributeLocation::External
            } else if attr.is_singleton() {
                let (offset, len) = store
                    .singleton_slot(cluster.id, attr.id)
                    .ok_or(AccessError::DynamicEndpointStorage(path.endpoint))?;
                AttributeLocation::Singleton {
                    offset,
                    len: len as usize,
                }
            } else if registry.is_dynamic_slot(slot) {
                // Dynamic endpoints never own fixed-region storage.
                return Err(AccessError::DynamicEndpointStorage(path.endpoint));
            } else {
                AttributeLocation::Fixed {
                    offset,
                    len: attr.size as usize,
                }
            };
            return Ok(Located {
                slot,
                server_cluster_index,
                cluster,
                descriptor: attr,
                location,
            });
        }
        if attr.occupies_endpoint_storage() {
            offset += attr.size as usize;
        }
    }

    Err(AccessError::UnsupportedAttribute(*path))
}
