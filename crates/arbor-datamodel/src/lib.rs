//! Arbor Data Model - Endpoint registry, attribute storage, and change
//! propagation
//!
//! This crate is the in-device data-model engine of the Arbor stack. It
//! presents a device's capabilities as a fixed hierarchy of endpoints,
//! clusters, and attributes backed by compact, statically-sized storage
//! regions, and exposes a uniform read/write/notify contract over that
//! hierarchy:
//! - Endpoint registry with build-time-fixed and runtime-dynamic slots
//! - Attribute offset resolution over the packed storage regions
//! - Typed copy engine for scalars, strings, and list headers
//! - Persistence bridge for nonvolatile attribute values
//! - Data-version counters and dirty-path notification for the reporting
//!   layer
//! - Per-cluster lifecycle hook dispatch
//!
//! The engine performs no I/O of its own; durable storage, reporting,
//! access control, and externally-stored values are collaborator traits in
//! [`provider`].

pub mod config;
pub mod copy;
pub mod engine;
pub mod error;
pub mod locate;
pub mod notify;
pub mod persist;
pub mod provider;
pub mod registry;
pub mod store;

pub use config::{load_config, ConfigError, EngineConfig};
pub use copy::copy_attribute;
pub use engine::{DataModel, EndpointSummary, RegistrySnapshot};
pub use error::{AccessError, AttachError, TableError};
pub use locate::{locate, Located};
pub use notify::ChangeNotifier;
pub use persist::{
    decode_narrow, default_bytes, narrow_default_bytes, ByteOrder, NATIVE_ORDER,
};
pub use provider::{
    AccessControl, AllowAll, ExternalStore, PersistError, PersistenceStore, Providers,
    ReportSink,
};
pub use registry::{DynamicEndpoint, EndpointRecord, EndpointRegistry};
pub use store::{AttributeLocation, AttributeStore};
