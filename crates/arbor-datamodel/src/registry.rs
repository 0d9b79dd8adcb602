//! Endpoint registry: fixed and dynamic slots, enable state, and the
//! structure generation counter

use arbor_schema::{
    AttributeFlags, Composition, DeviceTables, DeviceType, ElementType, EndpointId, EndpointType,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AttachError, TableError};
use crate::notify;

/// One live endpoint in the registry
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub id: EndpointId,
    pub endpoint_type: Arc<EndpointType>,
    pub device_types: Vec<DeviceType>,
    /// One 32-bit counter per server cluster, in declaration order
    pub data_versions: Vec<u32>,
    pub parent: Option<EndpointId>,
    pub composition: Composition,
    pub enabled: bool,
}

/// Registration request for a runtime-dynamic endpoint
#[derive(Debug, Clone)]
pub struct DynamicEndpoint {
    pub id: EndpointId,
    pub endpoint_type: Arc<EndpointType>,
    pub device_types: Vec<DeviceType>,
    /// Caller-supplied version storage; must cover every server cluster of
    /// the endpoint type. Seeded on attach.
    pub data_versions: Vec<u32>,
    pub parent: Option<EndpointId>,
    pub composition: Composition,
}

/// Fixed-capacity endpoint table
///
/// Fixed endpoints occupy slots `[0, fixed_count)` in generated-table order;
/// dynamic endpoints occupy `[fixed_count, capacity)`. An unused dynamic
/// slot is `None`.
#[derive(Debug)]
pub struct EndpointRegistry {
    records: Vec<Option<EndpointRecord>>,
    fixed_count: usize,
    generation: u64,
}

impl EndpointRegistry {
    /// Populate all fixed slots from the generated tables
    ///
    /// Validates the tables (duplicate endpoint ids, duplicate lifecycle
    /// hooks, malformed bound declarations) before building any record.
    /// Fixed endpoints start disabled; the engine enables them through the
    /// ordinary enable path so persistence loads and init hooks run.
    pub fn configure(tables: &DeviceTables, max_dynamic: usize) -> Result<Self, TableError> {
        validate_tables(tables)?;

        let mut records: Vec<Option<EndpointRecord>> = Vec::new();
        for endpoint in &tables.endpoints {
            let mut data_versions = vec![0u32; endpoint.endpoint_type.server_cluster_count()];
            notify::seed_data_versions(&mut data_versions);
            records.push(Some(EndpointRecord {
                id: endpoint.id,
                endpoint_type: endpoint.endpoint_type.clone(),
                device_types: endpoint.device_types.clone(),
                data_versions,
                parent: endpoint.parent,
                composition: endpoint.composition,
                enabled: false,
            }));
        }
        let fixed_count = records.len();
        records.resize_with(fixed_count + max_dynamic, || None);

        debug!(
            fixed = fixed_count,
            dynamic_slots = max_dynamic,
            "Configured endpoint registry"
        );
        Ok(Self {
            records,
            fixed_count,
            generation: 0,
        })
    }

    pub fn fixed_count(&self) -> usize {
        self.fixed_count
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Monotonic counter bumped on every topology mutation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn is_dynamic_slot(&self, index: usize) -> bool {
        index >= self.fixed_count
    }

    /// Slot index of the endpoint with this id, enabled or not
    pub fn find(&self, id: EndpointId) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.id == id))
    }

    pub fn record(&self, index: usize) -> Option<&EndpointRecord> {
        self.records.get(index).and_then(|r| r.as_ref())
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut EndpointRecord> {
        self.records.get_mut(index).and_then(|r| r.as_mut())
    }

    /// All slots in table order, occupied or not
    pub fn slots(&self) -> impl Iterator<Item = (usize, Option<&EndpointRecord>)> {
        self.records.iter().enumerate().map(|(i, r)| (i, r.as_ref()))
    }

    /// Register a dynamic endpoint into the given dynamic slot
    ///
    /// Every validation completes before any registry state changes; a
    /// failed attach is never observable. The endpoint starts disabled.
    pub fn attach_dynamic(
        &mut self,
        slot: usize,
        mut registration: DynamicEndpoint,
        transfer_buffer_size: usize,
    ) -> Result<(), AttachError> {
        if slot >= self.capacity() - self.fixed_count {
            return Err(AttachError::NoMemory {
                slot,
                reason: "dynamic slot index out of range",
            });
        }
        let index = self.fixed_count + slot;
        if self.records[index].is_some() {
            return Err(AttachError::InvalidArgument("dynamic slot already occupied"));
        }
        if !registration.id.is_valid() {
            return Err(AttachError::InvalidArgument(
                "endpoint id is the unused sentinel",
            ));
        }
        if self.find(registration.id).is_some() {
            return Err(AttachError::EndpointExists(registration.id));
        }
        for cluster in &registration.endpoint_type.clusters {
            for attr in &cluster.attributes {
                if attr.size as usize > transfer_buffer_size {
                    return Err(AttachError::NoMemory {
                        slot,
                        reason: "attribute larger than the transfer buffer",
                    });
                }
            }
        }
        if registration.data_versions.len() < registration.endpoint_type.server_cluster_count() {
            return Err(AttachError::InvalidArgument(
                "version storage shorter than the server cluster count",
            ));
        }

        notify::seed_data_versions(&mut registration.data_versions);
        let id = registration.id;
        self.records[index] = Some(EndpointRecord {
            id,
            endpoint_type: registration.endpoint_type,
            device_types: registration.device_types,
            data_versions: registration.data_versions,
            parent: registration.parent,
            composition: registration.composition,
            enabled: false,
        });
        self.bump_generation();
        info!(endpoint = %id, slot, "Attached dynamic endpoint");
        Ok(())
    }

    /// Clear a dynamic slot; the caller has already disabled the endpoint
    pub fn clear_dynamic(&mut self, slot: usize) -> Option<EndpointId> {
        let index = self.fixed_count + slot;
        let removed = self.records.get_mut(index)?.take()?;
        self.bump_generation();
        info!(endpoint = %removed.id, slot, "Detached dynamic endpoint");
        Some(removed.id)
    }
}

fn validate_tables(tables: &DeviceTables) -> Result<(), TableError> {
    for (i, endpoint) in tables.endpoints.iter().enumerate() {
        if tables.endpoints[..i].iter().any(|e| e.id == endpoint.id) {
            return Err(TableError::DuplicateEndpoint(endpoint.id));
        }
        for cluster in &endpoint.endpoint_type.clusters {
            cluster.hooks.validate(cluster.id)?;
            for attr in &cluster.attributes {
                let narrow_scalar =
                    attr.element_type == ElementType::Scalar && attr.size <= 4;
                let flagged = attr.flags.contains(AttributeFlags::MIN_MAX);
                if flagged != attr.bounds.is_some() || (flagged && !narrow_scalar) {
                    return Err(TableError::InvalidBounds {
                        cluster: cluster.id,
                        attribute: attr.id,
                    });
                }
            }
        }
    }
    Ok(())
}
