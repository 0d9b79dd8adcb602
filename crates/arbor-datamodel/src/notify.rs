//! Data-version bumping and dirty-path notification

use arbor_schema::{AttributePath, EndpointId};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{trace, warn};

use crate::provider::ReportSink;
use crate::registry::EndpointRegistry;

/// Seed data-version counters from OS randomness
///
/// Subscription-priming logic elsewhere in the stack must not be able to
/// assume version continuity across reboots. When no entropy source is
/// available the counters stay zero.
pub fn seed_data_versions(versions: &mut [u32]) {
    let mut bytes = vec![0u8; versions.len() * 4];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => {
            for (version, chunk) in versions.iter_mut().zip(bytes.chunks_exact(4)) {
                *version = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        Err(e) => {
            warn!(error = %e, "No entropy for data-version seed, starting from zero");
            versions.fill(0);
        }
    }
}

/// Forwards change signals to the reporting collaborator
pub struct ChangeNotifier {
    reporter: Option<Box<dyn ReportSink>>,
}

impl ChangeNotifier {
    pub fn new(reporter: Option<Box<dyn ReportSink>>) -> Self {
        Self { reporter }
    }

    /// Bump the (endpoint, cluster) data version and mark the path dirty
    ///
    /// A missing version slot is logged and skipped; the dirty mark is sent
    /// regardless, so the reporting layer never misses a mutation.
    pub fn bump_and_notify(&mut self, registry: &mut EndpointRegistry, path: &AttributePath) {
        match version_slot(registry, path) {
            Some(version) => *version = version.wrapping_add(1),
            None => warn!(path = %path, "No data-version slot for changed path"),
        }
        if let Some(reporter) = &mut self.reporter {
            reporter.mark_dirty(path);
        } else {
            trace!(path = %path, "Attribute changed with no reporter attached");
        }
    }

    /// Endpoint-level variant for structural changes such as parts-list
    /// updates: every server cluster of the endpoint is bumped
    pub fn bump_endpoint(&mut self, registry: &mut EndpointRegistry, endpoint: EndpointId) {
        if let Some(index) = registry.find(endpoint) {
            if let Some(record) = registry.record_mut(index) {
                for version in &mut record.data_versions {
                    *version = version.wrapping_add(1);
                }
            }
        }
        if let Some(reporter) = &mut self.reporter {
            reporter.mark_endpoint_dirty(endpoint);
        }
    }
}

fn version_slot<'a>(
    registry: &'a mut EndpointRegistry,
    path: &AttributePath,
) -> Option<&'a mut u32> {
    let index = registry.find(path.endpoint)?;
    let record = registry.record_mut(index)?;
    let slot = record
        .endpoint_type
        .server_cluster_ids()
        .position(|id| id == path.cluster)?;
    record.data_versions.get_mut(slot)
}
