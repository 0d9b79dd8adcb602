//! Attribute storage regions
//!
//! Two owned byte regions back every internally-stored attribute: a fixed
//! region laid out per fixed endpoint in table order, and a singleton region
//! holding one copy of each singleton attribute for the whole table. Region
//! sizes are computed and checked when the tables are registered; afterwards
//! every access goes through the two accessors below against locations the
//! resolver produced from the same tables.

use arbor_schema::{AttributeId, ClusterId, DeviceTables};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::TableError;

/// Where an attribute's bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLocation {
    /// Range of the per-endpoint fixed region
    Fixed { offset: usize, len: usize },
    /// Range of the table-wide singleton region
    Singleton { offset: usize, len: usize },
    /// Value lives behind the external-store collaborator
    External,
}

/// The engine's attribute byte storage
#[derive(Debug)]
pub struct AttributeStore {
    fixed: Box<[u8]>,
    singleton: Box<[u8]>,
    /// Singleton slot per unique (cluster, attribute), in table order
    singleton_index: HashMap<(ClusterId, AttributeId), (usize, u16)>,
}

impl AttributeStore {
    /// Size and allocate both regions from the generated tables
    ///
    /// The singleton scan walks the entire table in declaration order and
    /// allocates one slot per unique (cluster, attribute) pair; later
    /// declarations of the same pair resolve to the first slot and must
    /// agree on the declared size.
    pub fn build(tables: &DeviceTables) -> Result<Self, TableError> {
        let mut singleton_index = HashMap::new();
        let mut singleton_size = 0usize;

        for endpoint in &tables.endpoints {
            for cluster in &endpoint.endpoint_type.clusters {
                for attr in &cluster.attributes {
                    if !attr.is_singleton() || attr.is_external() {
                        continue;
                    }
                    match singleton_index.entry((cluster.id, attr.id)) {
                        Entry::Vacant(slot) => {
                            slot.insert((singleton_size, attr.size));
                            singleton_size += attr.size as usize;
                        }
                        Entry::Occupied(slot) => {
                            let (_, first) = *slot.get();
                            if first != attr.size {
                                return Err(TableError::SingletonSizeMismatch {
                                    cluster: cluster.id,
                                    attribute: attr.id,
                                    first,
                                    second: attr.size,
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(Self {
            fixed: vec![0u8; tables.fixed_storage_size()].into_boxed_slice(),
            singleton: vec![0u8; singleton_size].into_boxed_slice(),
            singleton_index,
        })
    }

    /// Slot of a singleton attribute, if any endpoint in the tables declared
    /// it
    pub fn singleton_slot(&self, cluster: ClusterId, attribute: AttributeId) -> Option<(usize, u16)> {
        self.singleton_index.get(&(cluster, attribute)).copied()
    }

    /// Read access to an internal location
    ///
    /// Panics on `External` or an out-of-range location; both indicate a bug
    /// in the resolver, not a runtime condition.
    pub fn read(&self, location: &AttributeLocation) -> &[u8] {
        match *location {
            AttributeLocation::Fixed { offset, len } => &self.fixed[offset..offset + len],
            AttributeLocation::Singleton { offset, len } => &self.singleton[offset..offset + len],
            AttributeLocation::External => panic!("external attribute has no storage slice"),
        }
    }

    /// Write access to an internal location; same contract as [`read`]
    ///
    /// [`read`]: AttributeStore::read
    pub fn write(&mut self, location: &AttributeLocation) -> &mut [u8] {
        match *location {
            AttributeLocation::Fixed { offset, len } => &mut self.fixed[offset..offset + len],
            AttributeLocation::Singleton { offset, len } => {
                &mut self.singleton[offset..offset + len]
            }
            AttributeLocation::External => panic!("external attribute has no storage slice"),
        }
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn singleton_len(&self) -> usize {
        self.singleton.len()
    }
}
