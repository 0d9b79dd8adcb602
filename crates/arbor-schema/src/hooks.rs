//! Per-cluster lifecycle hook tables
//!
//! Each cluster declares at most one hook per lifecycle event. The table is a
//! small tagged association list resolved by event kind at call time, and
//! validated for duplicates when the owning tables are registered.

use thiserror::Error;

use crate::descriptor::AttributeDescriptor;
use crate::ids::{AttributePath, ClusterId, EndpointId};

/// Called when a cluster's endpoint transitions to enabled
pub type InitHook = fn(EndpointId);

/// Called when a cluster's endpoint transitions to disabled
pub type ShutdownHook = fn(EndpointId);

/// Called after an attribute value has been stored
pub type ChangedHook = fn(&AttributePath);

/// Called before an attribute value is stored; an `Err` vetoes the write
/// before any byte is copied
pub type PreChangeHook = fn(&AttributePath, &AttributeDescriptor, &[u8]) -> Result<(), ChangeVeto>;

/// Veto returned by a pre-change hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeVeto {
    pub reason: &'static str,
}

/// Lifecycle event kinds a cluster can hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Init,
    Shutdown,
    Changed,
    PreChange,
}

/// One hook entry, tagged by the event it handles
#[derive(Debug, Clone, Copy)]
pub enum LifecycleHook {
    Init(InitHook),
    Shutdown(ShutdownHook),
    Changed(ChangedHook),
    PreChange(PreChangeHook),
}

impl LifecycleHook {
    pub fn event(&self) -> LifecycleEvent {
        match self {
            LifecycleHook::Init(_) => LifecycleEvent::Init,
            LifecycleHook::Shutdown(_) => LifecycleEvent::Shutdown,
            LifecycleHook::Changed(_) => LifecycleEvent::Changed,
            LifecycleHook::PreChange(_) => LifecycleEvent::PreChange,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    #[error("cluster {cluster} declares more than one {event:?} hook")]
    Duplicate {
        cluster: ClusterId,
        event: LifecycleEvent,
    },
}

/// A cluster's hook table
#[derive(Debug, Clone, Default)]
pub struct ClusterHooks {
    entries: Vec<LifecycleHook>,
}

impl ClusterHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(mut self, hook: InitHook) -> Self {
        self.entries.push(LifecycleHook::Init(hook));
        self
    }

    pub fn with_shutdown(mut self, hook: ShutdownHook) -> Self {
        self.entries.push(LifecycleHook::Shutdown(hook));
        self
    }

    pub fn with_changed(mut self, hook: ChangedHook) -> Self {
        self.entries.push(LifecycleHook::Changed(hook));
        self
    }

    pub fn with_pre_change(mut self, hook: PreChangeHook) -> Self {
        self.entries.push(LifecycleHook::PreChange(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject tables declaring more than one hook for the same event
    pub fn validate(&self, cluster: ClusterId) -> Result<(), HookError> {
        for (i, entry) in self.entries.iter().enumerate() {
            let event = entry.event();
            if self.entries[..i].iter().any(|e| e.event() == event) {
                return Err(HookError::Duplicate { cluster, event });
            }
        }
        Ok(())
    }

    pub fn init(&self) -> Option<InitHook> {
        self.entries.iter().find_map(|e| match e {
            LifecycleHook::Init(f) => Some(*f),
            _ => None,
        })
    }

    pub fn shutdown(&self) -> Option<ShutdownHook> {
        self.entries.iter().find_map(|e| match e {
            LifecycleHook::Shutdown(f) => Some(*f),
            _ => None,
        })
    }

    pub fn changed(&self) -> Option<ChangedHook> {
        self.entries.iter().find_map(|e| match e {
            LifecycleHook::Changed(f) => Some(*f),
            _ => None,
        })
    }

    pub fn pre_change(&self) -> Option<PreChangeHook> {
        self.entries.iter().find_map(|e| match e {
            LifecycleHook::PreChange(f) => Some(*f),
            _ => None,
        })
    }
}
