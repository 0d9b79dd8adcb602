//! Arbor Schema - Metadata vocabulary for the Arbor data model
//!
//! This crate provides the generated-table vocabulary consumed by the
//! data-model engine:
//! - Endpoint/cluster/attribute identifiers and attribute paths
//! - Attribute descriptors with element-type classes and capability masks
//! - Cluster and endpoint-type descriptors
//! - Per-cluster lifecycle hook tables
//!
//! Instances of these types are produced by build-time code generation and
//! treated as immutable input by the engine; this crate defines the shapes,
//! never the contents.

pub mod descriptor;
pub mod hooks;
pub mod ids;

pub use descriptor::{
    AttributeDescriptor, AttributeFlags, ClusterDescriptor, ClusterFlags, Composition,
    DefaultValue, DeviceTables, ElementType, EndpointType, FixedEndpoint, ValueBounds,
};
pub use hooks::{
    ChangeVeto, ChangedHook, ClusterHooks, HookError, InitHook, LifecycleEvent, LifecycleHook,
    PreChangeHook, ShutdownHook,
};
pub use ids::{AttributeId, AttributePath, ClusterId, DeviceType, EndpointId};
