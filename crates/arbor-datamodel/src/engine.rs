//! The data-model engine
//!
//! One owned [`DataModel`] value holds the registry, both storage regions,
//! and every collaborator. All mutation goes through `&mut self`, so the
//! single-logical-owner rule of the surrounding stack is a borrow the
//! compiler checks rather than a lock convention the caller must remember.

use arbor_schema::{
    AttributePath, ClusterId, Composition, DeviceTables, DeviceType, EndpointId,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::copy::copy_attribute;
use crate::error::{AccessError, AttachError, TableError};
use crate::locate::locate;
use crate::notify::ChangeNotifier;
use crate::persist::{self, NATIVE_ORDER};
use crate::provider::{AccessControl, AllowAll, ExternalStore, PersistenceStore, Providers};
use crate::registry::{DynamicEndpoint, EndpointRegistry};
use crate::store::{AttributeLocation, AttributeStore};

/// The in-device data-model engine
pub struct DataModel {
    config: EngineConfig,
    registry: EndpointRegistry,
    store: AttributeStore,
    notifier: ChangeNotifier,
    persistence: Option<Box<dyn PersistenceStore>>,
    access: Box<dyn AccessControl>,
    external: Option<Box<dyn ExternalStore>>,
}

impl DataModel {
    /// Build the engine from the generated tables
    ///
    /// Validates the tables, allocates both storage regions, then enables
    /// every fixed endpoint through the ordinary enable path so persisted
    /// values load and init hooks run.
    ///
    /// # Panics
    ///
    /// Panics when the tables declare nonvolatile attributes but no
    /// persistence collaborator was supplied; that is a wiring error in the
    /// surrounding stack, not a runtime condition.
    pub fn new(
        tables: DeviceTables,
        config: EngineConfig,
        providers: Providers,
    ) -> Result<Self, TableError> {
        if tables.requires_persistence() && providers.persistence.is_none() {
            panic!("tables declare nonvolatile attributes but no persistence store was provided");
        }

        let store = AttributeStore::build(&tables)?;
        let registry = EndpointRegistry::configure(&tables, config.max_dynamic_endpoints)?;
        let mut engine = Self {
            config,
            registry,
            store,
            notifier: ChangeNotifier::new(providers.reporter),
            persistence: providers.persistence,
            access: providers.access.unwrap_or_else(|| Box::new(AllowAll)),
            external: providers.external,
        };

        let fixed_ids: Vec<EndpointId> = (0..engine.registry.fixed_count())
            .filter_map(|i| engine.registry.record(i).map(|r| r.id))
            .collect();
        for id in fixed_ids {
            engine.set_endpoint_enabled(id, true);
        }
        info!(
            endpoints = engine.registry.fixed_count(),
            fixed_bytes = engine.store.fixed_len(),
            singleton_bytes = engine.store.singleton_len(),
            "Data model ready"
        );
        Ok(engine)
    }

    /// Read an attribute value into `buf`; returns the logical byte count
    pub fn read_attribute(
        &mut self,
        path: &AttributePath,
        buf: &mut [u8],
    ) -> Result<usize, AccessError> {
        let located = locate(&self.registry, &self.store, path)?;
        if !self.access.can_read(path) {
            return Err(AccessError::UnsupportedAccess(*path));
        }
        match located.location {
            AttributeLocation::External => match self.external.as_mut() {
                Some(external) => external.read(path, located.descriptor, buf),
                None => Err(AccessError::NoExternalHandler(*path)),
            },
            location => {
                let src = self.store.read(&location);
                copy_attribute(buf, Some(src), located.descriptor)
            }
        }
    }

    /// Write an attribute value through the full external-write pipeline:
    /// access control, writability, bounds, pre-change veto, copy,
    /// persistence, changed hook, version bump and dirty mark
    pub fn write_attribute(
        &mut self,
        path: &AttributePath,
        value: &[u8],
    ) -> Result<(), AccessError> {
        self.write_impl(path, value, true)
    }

    /// Write from local cluster logic: skips access control and the
    /// writability flag, keeps every other step of the pipeline
    pub fn write_attribute_internal(
        &mut self,
        path: &AttributePath,
        value: &[u8],
    ) -> Result<(), AccessError> {
        self.write_impl(path, value, false)
    }

    fn write_impl(
        &mut self,
        path: &AttributePath,
        value: &[u8],
        enforce_access: bool,
    ) -> Result<(), AccessError> {
        let located = locate(&self.registry, &self.store, path)?;
        let descriptor = located.descriptor;

        if enforce_access {
            if !self.access.can_write(path) {
                return Err(AccessError::UnsupportedAccess(*path));
            }
            if !descriptor.is_writable() {
                return Err(AccessError::UnsupportedWrite(*path));
            }
        }

        if let Some(bounds) = descriptor.bounds {
            let size = descriptor.size as usize;
            if value.len() < size {
                return Err(AccessError::ResourceExhausted {
                    needed: size,
                    have: value.len(),
                });
            }
            let numeric = persist::decode_narrow(&value[..size], NATIVE_ORDER);
            if numeric < bounds.min || numeric > bounds.max {
                return Err(AccessError::OutOfRange(*path));
            }
        }

        if let Some(pre_change) = located.cluster.hooks.pre_change() {
            pre_change(path, descriptor, value).map_err(|veto| AccessError::ChangeRejected {
                path: *path,
                reason: veto.reason,
            })?;
        }

        let changed_hook = located.cluster.hooks.changed();
        let persist_bytes = match located.location {
            AttributeLocation::External => {
                match self.external.as_mut() {
                    Some(external) => external.write(path, descriptor, value)?,
                    None => return Err(AccessError::NoExternalHandler(*path)),
                }
                // External values never pass through the persistence bridge.
                None
            }
            location => {
                let dest = self.store.write(&location);
                copy_attribute(dest, Some(value), descriptor)?;
                if descriptor.is_nonvolatile() {
                    let stored = self.store.read(&location);
                    let len = persist::persisted_len(descriptor, stored);
                    Some(stored[..len].to_vec())
                } else {
                    None
                }
            }
        };

        if let Some(bytes) = persist_bytes {
            match self.persistence.as_mut() {
                Some(persistence) => {
                    if let Err(e) = persistence.write_value(path, &bytes) {
                        warn!(path = %path, error = %e, "Failed to persist attribute");
                    }
                }
                None => {
                    panic!("nonvolatile attribute written with no persistence store attached")
                }
            }
        }

        if let Some(changed) = changed_hook {
            changed(path);
        }
        self.notifier.bump_and_notify(&mut self.registry, path);
        Ok(())
    }

    /// Register a dynamic endpoint; it starts disabled
    pub fn attach_dynamic_endpoint(
        &mut self,
        slot: usize,
        registration: DynamicEndpoint,
    ) -> Result<(), AttachError> {
        self.registry
            .attach_dynamic(slot, registration, self.config.transfer_buffer_size)
    }

    /// Remove the dynamic endpoint in `slot`, disabling it first
    ///
    /// Only an enabled, occupied slot is cleared; anything else leaves the
    /// registry untouched and returns `None`.
    pub fn detach_dynamic_endpoint(&mut self, slot: usize) -> Option<EndpointId> {
        let index = self.registry.fixed_count() + slot;
        let record = self.registry.record(index)?;
        if !record.enabled {
            return None;
        }
        let id = record.id;
        self.set_endpoint_enabled(id, false);
        self.registry.clear_dynamic(slot)
    }

    /// Enable or disable an endpoint; returns false for an unknown id
    ///
    /// Enabling loads persisted and default values, then runs init hooks
    /// for every cluster in declaration order. Disabling runs shutdown
    /// hooks. Both directions bump the structure generation and raise a
    /// children-changed notification at every ancestor and the root.
    pub fn set_endpoint_enabled(&mut self, id: EndpointId, enabled: bool) -> bool {
        let Some(index) = self.registry.find(id) else {
            warn!(endpoint = %id, "Enable request for unknown endpoint");
            return false;
        };
        if self.registry.record(index).map(|r| r.enabled) == Some(enabled) {
            return true;
        }

        if enabled {
            if let Some(record) = self.registry.record_mut(index) {
                record.enabled = true;
            }
            self.load_endpoint_values(index, false);
            self.run_lifecycle(index, true);
        } else {
            self.run_lifecycle(index, false);
            if let Some(record) = self.registry.record_mut(index) {
                record.enabled = false;
            }
        }
        debug!(endpoint = %id, enabled, "Endpoint state changed");
        self.registry.bump_generation();
        self.notify_children_changed(id);
        true
    }

    /// Re-run the persisted-value load for every enabled endpoint
    pub fn reload_persisted_values(&mut self) {
        let indices: Vec<usize> = self
            .registry
            .slots()
            .filter(|(_, r)| r.is_some_and(|r| r.enabled))
            .map(|(i, _)| i)
            .collect();
        for index in indices {
            self.load_endpoint_values(index, true);
        }
    }

    /// Current data version of an (endpoint, server cluster) pair
    pub fn data_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<u32> {
        let record = self.registry.record(self.registry.find(endpoint)?)?;
        let slot = record
            .endpoint_type
            .server_cluster_ids()
            .position(|id| id == cluster)?;
        record.data_versions.get(slot).copied()
    }

    /// Structure generation; bumped on every attach/detach/enable/disable
    pub fn generation(&self) -> u64 {
        self.registry.generation()
    }

    /// Serializable registry view for the dispatch and reporting layers
    ///
    /// Consumers cache the snapshot and compare `generation` after
    /// re-acquiring the engine instead of holding it across turns.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let endpoints = self
            .registry
            .slots()
            .filter_map(|(slot, record)| {
                record.map(|record| EndpointSummary {
                    id: record.id,
                    slot,
                    dynamic: self.registry.is_dynamic_slot(slot),
                    enabled: record.enabled,
                    parent: record.parent,
                    composition: record.composition,
                    device_types: record.device_types.clone(),
                    server_clusters: record.endpoint_type.server_cluster_ids().collect(),
                })
            })
            .collect();
        RegistrySnapshot {
            generation: self.registry.generation(),
            endpoints,
        }
    }

    /// Load values for every internal attribute of one endpoint
    ///
    /// Nonvolatile attributes try the persistence store first and fall back
    /// to the generated default, then zero. Volatile attributes take their
    /// default directly unless `only_nonvolatile` limits the pass.
    fn load_endpoint_values(&mut self, index: usize, only_nonvolatile: bool) {
        let Some(record) = self.registry.record(index) else {
            return;
        };
        let endpoint_id = record.id;
        let endpoint_type = record.endpoint_type.clone();

        for cluster in &endpoint_type.clusters {
            if !cluster.is_server() {
                continue;
            }
            for attr in &cluster.attributes {
                if attr.is_external() || (only_nonvolatile && !attr.is_nonvolatile()) {
                    continue;
                }
                let path = AttributePath::new(endpoint_id, cluster.id, attr.id);
                let location = match locate(&self.registry, &self.store, &path) {
                    Ok(located) => located.location,
                    Err(e) => {
                        // Dynamic endpoints have no fixed-region storage to
                        // initialize.
                        debug!(path = %path, error = %e, "Skipping value load");
                        continue;
                    }
                };

                if attr.is_nonvolatile() {
                    let persisted = self
                        .persistence
                        .as_mut()
                        .expect("nonvolatile attribute without a persistence store")
                        .read_value(&path);
                    match persisted {
                        Ok(bytes) => {
                            let dest = self.store.write(&location);
                            match copy_attribute(dest, Some(&bytes), attr) {
                                Ok(_) => continue,
                                Err(e) => {
                                    warn!(path = %path, error = %e, "Stored value unusable, using default")
                                }
                            }
                        }
                        Err(e) => {
                            debug!(path = %path, error = %e, "No persisted value, using default")
                        }
                    }
                }

                let default = persist::default_bytes(attr, NATIVE_ORDER);
                let dest = self.store.write(&location);
                if let Err(e) = copy_attribute(dest, default.as_deref(), attr) {
                    warn!(path = %path, error = %e, "Default unusable, zero-filling");
                    self.store.write(&location).fill(0);
                }
            }
        }
    }

    /// Run init or shutdown hooks for every cluster of one endpoint, in
    /// declaration order
    fn run_lifecycle(&mut self, index: usize, init: bool) {
        let Some(record) = self.registry.record(index) else {
            return;
        };
        let endpoint_id = record.id;
        let hooks: Vec<_> = record
            .endpoint_type
            .clusters
            .iter()
            .filter_map(|c| {
                if init {
                    c.hooks.init()
                } else {
                    c.hooks.shutdown()
                }
            })
            .collect();
        for hook in hooks {
            hook(endpoint_id);
        }
    }

    /// Bump every ancestor's parts list, then the synthetic root
    fn notify_children_changed(&mut self, id: EndpointId) {
        let mut chain = Vec::new();
        let mut cursor = self
            .registry
            .find(id)
            .and_then(|i| self.registry.record(i))
            .and_then(|r| r.parent);
        while let Some(parent) = cursor {
            if chain.contains(&parent) {
                warn!(endpoint = %parent, "Parent chain loops, stopping ripple");
                break;
            }
            chain.push(parent);
            cursor = self
                .registry
                .find(parent)
                .and_then(|i| self.registry.record(i))
                .and_then(|r| r.parent);
        }
        if !chain.contains(&EndpointId::ROOT) {
            chain.push(EndpointId::ROOT);
        }
        for ancestor in chain {
            self.notifier.bump_endpoint(&mut self.registry, ancestor);
        }
    }
}

/// Point-in-time registry view plus the structure generation it was taken at
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub endpoints: Vec<EndpointSummary>,
}

/// One registry slot in a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub id: EndpointId,
    pub slot: usize,
    pub dynamic: bool,
    pub enabled: bool,
    pub parent: Option<EndpointId>,
    pub composition: Composition,
    pub device_types: Vec<DeviceType>,
    pub server_clusters: Vec<ClusterId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{PersistError, ReportSink};
    use arbor_schema::{
        AttributeDescriptor, AttributeFlags, AttributeId, ChangeVeto, ClusterDescriptor,
        ClusterFlags, ClusterHooks, ElementType, EndpointType, FixedEndpoint, ValueBounds,
    };
    use arbor_schema::DefaultValue;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const CLUSTER_A: ClusterId = ClusterId(0x10);
    const CLUSTER_B: ClusterId = ClusterId(0x20);

    #[derive(Default, Clone)]
    struct MemoryStore {
        values: Arc<Mutex<HashMap<AttributePath, Vec<u8>>>>,
    }

    impl crate::provider::PersistenceStore for MemoryStore {
        fn read_value(&mut self, path: &AttributePath) -> Result<Vec<u8>, PersistError> {
            self.values
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or(PersistError::NotFound)
        }

        fn write_value(&mut self, path: &AttributePath, value: &[u8]) -> Result<(), PersistError> {
            self.values.lock().unwrap().insert(*path, value.to_vec());
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        dirty: Arc<Mutex<Vec<AttributePath>>>,
        endpoints: Arc<Mutex<Vec<EndpointId>>>,
    }

    impl Recorder {
        fn clear(&self) {
            self.dirty.lock().unwrap().clear();
            self.endpoints.lock().unwrap().clear();
        }

        fn dirty_paths(&self) -> Vec<AttributePath> {
            self.dirty.lock().unwrap().clone()
        }

        fn dirty_endpoints(&self) -> Vec<EndpointId> {
            self.endpoints.lock().unwrap().clone()
        }
    }

    impl ReportSink for Recorder {
        fn mark_dirty(&mut self, path: &AttributePath) {
            self.dirty.lock().unwrap().push(*path);
        }

        fn mark_endpoint_dirty(&mut self, endpoint: EndpointId) {
            self.endpoints.lock().unwrap().push(endpoint);
        }
    }

    struct DenyWrites;

    impl AccessControl for DenyWrites {
        fn can_read(&self, _path: &AttributePath) -> bool {
            true
        }

        fn can_write(&self, _path: &AttributePath) -> bool {
            false
        }
    }

    #[derive(Default, Clone)]
    struct ExternalDouble {
        value: Arc<Mutex<Vec<u8>>>,
    }

    impl ExternalStore for ExternalDouble {
        fn read(
            &mut self,
            _path: &AttributePath,
            descriptor: &AttributeDescriptor,
            buf: &mut [u8],
        ) -> Result<usize, AccessError> {
            let value = self.value.lock().unwrap();
            copy_attribute(buf, Some(value.as_slice()), descriptor)
        }

        fn write(
            &mut self,
            _path: &AttributePath,
            _descriptor: &AttributeDescriptor,
            value: &[u8],
        ) -> Result<(), AccessError> {
            *self.value.lock().unwrap() = value.to_vec();
            Ok(())
        }
    }

    fn attr(
        id: u32,
        element_type: ElementType,
        size: u16,
        flags: AttributeFlags,
        default: DefaultValue,
    ) -> AttributeDescriptor {
        AttributeDescriptor {
            id: AttributeId(id),
            element_type,
            size,
            flags,
            default,
            bounds: None,
        }
    }

    /// Two fixed endpoints (1 and 2, child of 1) sharing one endpoint type:
    /// cluster A carries a scalar, a nonvolatile string, a bounded scalar,
    /// a singleton, and an external attribute; cluster B carries a
    /// read-only scalar and a list.
    fn base_tables(hooks_a: ClusterHooks, hooks_b: ClusterHooks) -> DeviceTables {
        let w = AttributeFlags::WRITABLE;
        let mut bounded = attr(
            2,
            ElementType::Scalar,
            1,
            w | AttributeFlags::MIN_MAX,
            DefaultValue::Inline(5),
        );
        bounded.bounds = Some(ValueBounds { min: 1, max: 10 });

        let endpoint_type = Arc::new(EndpointType {
            clusters: vec![
                ClusterDescriptor {
                    id: CLUSTER_A,
                    flags: ClusterFlags::SERVER,
                    attributes: vec![
                        attr(0, ElementType::Scalar, 2, w, DefaultValue::Inline(7)),
                        attr(
                            1,
                            ElementType::ShortString,
                            8,
                            w | AttributeFlags::NONVOLATILE,
                            DefaultValue::Empty,
                        ),
                        bounded,
                        attr(
                            3,
                            ElementType::Scalar,
                            4,
                            w | AttributeFlags::SINGLETON,
                            DefaultValue::Empty,
                        ),
                        attr(
                            4,
                            ElementType::Scalar,
                            2,
                            w | AttributeFlags::EXTERNAL,
                            DefaultValue::Empty,
                        ),
                    ],
                    hooks: hooks_a,
                },
                ClusterDescriptor {
                    id: CLUSTER_B,
                    flags: ClusterFlags::SERVER,
                    attributes: vec![
                        attr(
                            0,
                            ElementType::Scalar,
                            2,
                            AttributeFlags::empty(),
                            DefaultValue::Inline(3),
                        ),
                        attr(
                            1,
                            ElementType::List,
                            2,
                            w | AttributeFlags::LIST,
                            DefaultValue::Empty,
                        ),
                    ],
                    hooks: hooks_b,
                },
            ],
        });

        DeviceTables {
            endpoints: vec![
                FixedEndpoint {
                    id: EndpointId(1),
                    endpoint_type: endpoint_type.clone(),
                    device_types: vec![DeviceType { id: 0x0016, revision: 1 }],
                    parent: None,
                    composition: Composition::Flat,
                },
                FixedEndpoint {
                    id: EndpointId(2),
                    endpoint_type,
                    device_types: vec![DeviceType { id: 0x0100, revision: 2 }],
                    parent: Some(EndpointId(1)),
                    composition: Composition::Tree,
                },
            ],
        }
    }

    struct Harness {
        engine: DataModel,
        persistence: MemoryStore,
        recorder: Recorder,
        external: ExternalDouble,
    }

    fn harness() -> Harness {
        harness_with(base_tables(ClusterHooks::default(), ClusterHooks::default()), None)
    }

    fn harness_with(tables: DeviceTables, access: Option<Box<dyn AccessControl>>) -> Harness {
        let persistence = MemoryStore::default();
        let recorder = Recorder::default();
        let external = ExternalDouble::default();
        let engine = DataModel::new(
            tables,
            EngineConfig::default(),
            Providers {
                persistence: Some(Box::new(persistence.clone())),
                reporter: Some(Box::new(recorder.clone())),
                access,
                external: Some(Box::new(external.clone())),
            },
        )
        .unwrap();
        recorder.clear();
        Harness {
            engine,
            persistence,
            recorder,
            external,
        }
    }

    fn p(e: u16, c: ClusterId, a: u32) -> AttributePath {
        AttributePath::new(EndpointId(e), c, AttributeId(a))
    }

    fn dynamic_external_only(id: u16, parent: Option<EndpointId>) -> DynamicEndpoint {
        DynamicEndpoint {
            id: EndpointId(id),
            endpoint_type: Arc::new(EndpointType {
                clusters: vec![ClusterDescriptor {
                    id: ClusterId(0x40),
                    flags: ClusterFlags::SERVER,
                    attributes: vec![attr(
                        0,
                        ElementType::Scalar,
                        2,
                        AttributeFlags::WRITABLE | AttributeFlags::EXTERNAL,
                        DefaultValue::Empty,
                    )],
                    hooks: ClusterHooks::default(),
                }],
            }),
            device_types: Vec::new(),
            data_versions: vec![0],
            parent,
            composition: Composition::Flat,
        }
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut h = harness();
        let path = p(1, CLUSTER_A, 0);

        let mut buf = [0u8; 2];
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, 7u16.to_ne_bytes());

        h.engine.write_attribute(&path, &[0x34, 0x12]).unwrap();
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn test_string_write_truncates_and_round_trips() {
        let mut h = harness();
        let path = p(1, CLUSTER_A, 1);

        // Fits: round-trips unchanged.
        h.engine.write_attribute(&path, &[2, b'h', b'i']).unwrap();
        let mut buf = [0u8; 8];
        let n = h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[2, b'h', b'i']);

        // Ten payload bytes into eight bytes of storage: seven survive.
        let long = [10, b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9'];
        h.engine.write_attribute(&path, &long).unwrap();
        let n = h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[7, b'0', b'1', b'2', b'3', b'4', b'5', b'6']);
    }

    #[test]
    fn test_singleton_shared_across_endpoints() {
        let mut h = harness();
        h.engine
            .write_attribute(&p(1, CLUSTER_A, 3), &[1, 2, 3, 4])
            .unwrap();

        let mut buf = [0u8; 4];
        h.engine.read_attribute(&p(2, CLUSTER_A, 3), &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_write_bumps_version_and_marks_dirty_once() {
        let mut h = harness();
        let path = p(1, CLUSTER_A, 0);

        let before = h.engine.data_version(EndpointId(1), CLUSTER_A).unwrap();
        let sibling = h.engine.data_version(EndpointId(1), CLUSTER_B).unwrap();
        h.engine.write_attribute(&path, &[1, 0]).unwrap();

        assert_eq!(
            h.engine.data_version(EndpointId(1), CLUSTER_A),
            Some(before.wrapping_add(1))
        );
        assert_eq!(h.recorder.dirty_paths(), vec![path]);
        // The sibling cluster's version is untouched.
        assert_eq!(h.engine.data_version(EndpointId(1), CLUSTER_B), Some(sibling));
    }

    #[test]
    fn test_access_denial_short_circuits() {
        let mut h = harness_with(
            base_tables(ClusterHooks::default(), ClusterHooks::default()),
            Some(Box::new(DenyWrites)),
        );
        let path = p(1, CLUSTER_A, 0);

        assert_eq!(
            h.engine.write_attribute(&path, &[9, 9]).unwrap_err(),
            AccessError::UnsupportedAccess(path)
        );
        // No byte changed, no dirty mark.
        let mut buf = [0u8; 2];
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, 7u16.to_ne_bytes());
        assert!(h.recorder.dirty_paths().is_empty());
    }

    #[test]
    fn test_unwritable_attribute_accepts_internal_writes_only() {
        let mut h = harness();
        let path = p(1, CLUSTER_B, 0);

        assert_eq!(
            h.engine.write_attribute(&path, &[1, 1]).unwrap_err(),
            AccessError::UnsupportedWrite(path)
        );
        h.engine.write_attribute_internal(&path, &[1, 1]).unwrap();

        let mut buf = [0u8; 2];
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, [1, 1]);
    }

    #[test]
    fn test_pre_change_veto_blocks_write() {
        fn veto(
            _path: &AttributePath,
            _descriptor: &AttributeDescriptor,
            _value: &[u8],
        ) -> Result<(), ChangeVeto> {
            Err(ChangeVeto { reason: "locked" })
        }

        let tables = base_tables(
            ClusterHooks::new().with_pre_change(veto),
            ClusterHooks::default(),
        );
        let mut h = harness_with(tables, None);
        let path = p(1, CLUSTER_A, 0);

        assert_eq!(
            h.engine.write_attribute(&path, &[9, 9]).unwrap_err(),
            AccessError::ChangeRejected {
                path,
                reason: "locked"
            }
        );
        let mut buf = [0u8; 2];
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, 7u16.to_ne_bytes());
        assert!(h.recorder.dirty_paths().is_empty());
    }

    #[test]
    fn test_bounded_write_rejected_out_of_range() {
        let mut h = harness();
        let path = p(1, CLUSTER_A, 2);

        assert_eq!(
            h.engine.write_attribute(&path, &[0]).unwrap_err(),
            AccessError::OutOfRange(path)
        );
        assert_eq!(
            h.engine.write_attribute(&path, &[11]).unwrap_err(),
            AccessError::OutOfRange(path)
        );
        h.engine.write_attribute(&path, &[10]).unwrap();
    }

    #[test]
    fn test_scalar_read_into_short_buffer_fails() {
        let mut h = harness();
        let mut buf = [0u8; 1];
        assert_eq!(
            h.engine
                .read_attribute(&p(1, CLUSTER_A, 0), &mut buf)
                .unwrap_err(),
            AccessError::ResourceExhausted { needed: 2, have: 1 }
        );
    }

    #[test]
    fn test_persisted_value_loaded_on_enable() {
        let persistence = MemoryStore::default();
        persistence
            .values
            .lock()
            .unwrap()
            .insert(p(1, CLUSTER_A, 1), vec![3, b'a', b'b', b'c']);

        let mut engine = DataModel::new(
            base_tables(ClusterHooks::default(), ClusterHooks::default()),
            EngineConfig::default(),
            Providers {
                persistence: Some(Box::new(persistence)),
                ..Providers::default()
            },
        )
        .unwrap();

        let mut buf = [0u8; 8];
        let n = engine.read_attribute(&p(1, CLUSTER_A, 1), &mut buf).unwrap();
        assert_eq!(&buf[..n], &[3, b'a', b'b', b'c']);
        // Endpoint 2 had nothing persisted and fell back to the empty
        // default.
        let n = engine.read_attribute(&p(2, CLUSTER_A, 1), &mut buf).unwrap();
        assert_eq!(&buf[..n], &[0]);
    }

    #[test]
    fn test_write_persists_logical_length() {
        let mut h = harness();
        h.engine
            .write_attribute(&p(1, CLUSTER_A, 1), &[2, b'o', b'k'])
            .unwrap();
        assert_eq!(
            h.persistence.values.lock().unwrap()[&p(1, CLUSTER_A, 1)],
            vec![2, b'o', b'k']
        );
    }

    #[test]
    fn test_reload_persisted_values_applies_updates() {
        let mut h = harness();
        h.persistence
            .values
            .lock()
            .unwrap()
            .insert(p(1, CLUSTER_A, 1), vec![1, b'z']);

        h.engine.reload_persisted_values();
        let mut buf = [0u8; 8];
        let n = h.engine.read_attribute(&p(1, CLUSTER_A, 1), &mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, b'z']);
    }

    static LIFECYCLE_LOG: Mutex<Vec<(&'static str, u16)>> = Mutex::new(Vec::new());

    #[test]
    fn test_enable_disable_symmetry() {
        fn log_init_a(ep: EndpointId) {
            LIFECYCLE_LOG.lock().unwrap().push(("init-a", ep.0));
        }
        fn log_shutdown_a(ep: EndpointId) {
            LIFECYCLE_LOG.lock().unwrap().push(("shutdown-a", ep.0));
        }
        fn log_init_b(ep: EndpointId) {
            LIFECYCLE_LOG.lock().unwrap().push(("init-b", ep.0));
        }
        fn log_shutdown_b(ep: EndpointId) {
            LIFECYCLE_LOG.lock().unwrap().push(("shutdown-b", ep.0));
        }

        let tables = base_tables(
            ClusterHooks::new().with_init(log_init_a).with_shutdown(log_shutdown_a),
            ClusterHooks::new().with_init(log_init_b).with_shutdown(log_shutdown_b),
        );
        let mut h = harness_with(tables, None);
        LIFECYCLE_LOG.lock().unwrap().clear();

        // Dirty the volatile scalar and the persisted string.
        h.engine.write_attribute(&p(1, CLUSTER_A, 0), &[0x42, 0]).unwrap();
        h.engine
            .write_attribute(&p(1, CLUSTER_A, 1), &[2, b'h', b'i'])
            .unwrap();

        assert!(h.engine.set_endpoint_enabled(EndpointId(1), false));
        assert_eq!(
            LIFECYCLE_LOG.lock().unwrap().as_slice(),
            &[("shutdown-a", 1), ("shutdown-b", 1)]
        );
        assert_eq!(
            h.engine
                .read_attribute(&p(1, CLUSTER_A, 0), &mut [0u8; 2])
                .unwrap_err(),
            AccessError::UnsupportedEndpoint(EndpointId(1))
        );

        LIFECYCLE_LOG.lock().unwrap().clear();
        assert!(h.engine.set_endpoint_enabled(EndpointId(1), true));
        assert_eq!(
            LIFECYCLE_LOG.lock().unwrap().as_slice(),
            &[("init-a", 1), ("init-b", 1)]
        );

        // The volatile scalar is back at its default; the persisted string
        // survived the cycle.
        let mut buf = [0u8; 8];
        h.engine.read_attribute(&p(1, CLUSTER_A, 0), &mut buf[..2]).unwrap();
        assert_eq!(&buf[..2], &7u16.to_ne_bytes());
        let n = h.engine.read_attribute(&p(1, CLUSTER_A, 1), &mut buf).unwrap();
        assert_eq!(&buf[..n], &[2, b'h', b'i']);

        // Re-enabling an already-enabled endpoint is a no-op.
        LIFECYCLE_LOG.lock().unwrap().clear();
        assert!(h.engine.set_endpoint_enabled(EndpointId(1), true));
        assert!(LIFECYCLE_LOG.lock().unwrap().is_empty());
    }

    #[test]
    fn test_children_changed_ripples_to_root() {
        let mut h = harness();
        h.engine
            .attach_dynamic_endpoint(0, dynamic_external_only(30, Some(EndpointId(2))))
            .unwrap();
        h.recorder.clear();

        let generation = h.engine.generation();
        assert!(h.engine.set_endpoint_enabled(EndpointId(30), true));

        // Endpoint 2's parent is 1, whose parent is the synthetic root.
        assert_eq!(
            h.recorder.dirty_endpoints(),
            vec![EndpointId(2), EndpointId(1), EndpointId::ROOT]
        );
        assert!(h.engine.generation() > generation);
    }

    #[test]
    fn test_attach_oversized_attribute_is_no_memory() {
        let mut h = harness();
        let mut registration = dynamic_external_only(31, None);
        registration.endpoint_type = Arc::new(EndpointType {
            clusters: vec![ClusterDescriptor {
                id: ClusterId(0x41),
                flags: ClusterFlags::SERVER,
                attributes: vec![attr(
                    0,
                    ElementType::LongString,
                    1024,
                    AttributeFlags::WRITABLE,
                    DefaultValue::Empty,
                )],
                hooks: ClusterHooks::default(),
            }],
        });

        assert!(matches!(
            h.engine.attach_dynamic_endpoint(0, registration),
            Err(AttachError::NoMemory { slot: 0, .. })
        ));
        assert!(h.engine.snapshot().endpoints.iter().all(|e| !e.dynamic));
    }

    #[test]
    fn test_detach_clears_only_enabled_endpoints() {
        let mut h = harness();
        h.engine
            .attach_dynamic_endpoint(0, dynamic_external_only(32, None))
            .unwrap();

        // Attached but never enabled: left in place.
        assert_eq!(h.engine.detach_dynamic_endpoint(0), None);
        assert!(h
            .engine
            .snapshot()
            .endpoints
            .iter()
            .any(|e| e.id == EndpointId(32)));

        h.engine.set_endpoint_enabled(EndpointId(32), true);
        assert_eq!(h.engine.detach_dynamic_endpoint(0), Some(EndpointId(32)));
        assert_eq!(h.engine.detach_dynamic_endpoint(0), None);
    }

    #[test]
    fn test_external_attribute_routed_to_handler() {
        let mut h = harness();
        let path = p(1, CLUSTER_A, 4);

        h.engine.write_attribute(&path, &[0xAB, 0xCD]).unwrap();
        assert_eq!(*h.external.value.lock().unwrap(), vec![0xAB, 0xCD]);
        // External writes still bump and notify.
        assert_eq!(h.recorder.dirty_paths(), vec![path]);

        let mut buf = [0u8; 2];
        h.engine.read_attribute(&path, &mut buf).unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);
        // Nothing external reaches the persistence store.
        assert!(!h.persistence.values.lock().unwrap().contains_key(&path));
    }

    #[test]
    fn test_external_attribute_without_handler_fails() {
        let tables = base_tables(ClusterHooks::default(), ClusterHooks::default());
        let mut engine = DataModel::new(
            tables,
            EngineConfig::default(),
            Providers {
                persistence: Some(Box::new(MemoryStore::default())),
                ..Providers::default()
            },
        )
        .unwrap();

        let path = p(1, CLUSTER_A, 4);
        assert_eq!(
            engine.read_attribute(&path, &mut [0u8; 2]).unwrap_err(),
            AccessError::NoExternalHandler(path)
        );
    }

    #[test]
    fn test_snapshot_serializes_with_generation() {
        let mut h = harness();
        h.engine
            .attach_dynamic_endpoint(1, dynamic_external_only(40, Some(EndpointId(1))))
            .unwrap();

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.generation, h.engine.generation());
        assert_eq!(snapshot.endpoints.len(), 3);
        let dynamic = snapshot
            .endpoints
            .iter()
            .find(|e| e.id == EndpointId(40))
            .unwrap();
        assert!(dynamic.dynamic);
        assert!(!dynamic.enabled);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["generation"], snapshot.generation);
        assert_eq!(json["endpoints"][0]["id"], 1);
        assert_eq!(json["endpoints"][0]["composition"], "flat");
    }

    #[test]
    #[should_panic(expected = "persistence")]
    fn test_missing_persistence_store_is_fatal() {
        let _ = DataModel::new(
            base_tables(ClusterHooks::default(), ClusterHooks::default()),
            EngineConfig::default(),
            Providers::default(),
        );
    }
}
