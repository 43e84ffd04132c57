//! Persistence and notification plugin interfaces
//!
//! Provides a unified interface for the storage backends module data flows
//! through. Every module carries one plugin binding per datastore kind; the
//! registry itself is always persisted through the fixed internal
//! [`FilePlugin`], independent of per-module bindings, so metadata stays
//! readable before any module-specific binding is known.

pub mod file;

pub use file::FilePlugin;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Datastore kinds a module binds a storage plugin for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreKind {
    Startup,
    Running,
    Candidate,
    Operational,
    /// Stored notifications (replay log)
    Notification,
}

impl DatastoreKind {
    /// All kinds, in binding order
    pub const ALL: [DatastoreKind; 5] = [
        DatastoreKind::Startup,
        DatastoreKind::Running,
        DatastoreKind::Candidate,
        DatastoreKind::Operational,
        DatastoreKind::Notification,
    ];

    /// Stable textual name
    pub fn as_str(self) -> &'static str {
        match self {
            DatastoreKind::Startup => "startup",
            DatastoreKind::Running => "running",
            DatastoreKind::Candidate => "candidate",
            DatastoreKind::Operational => "operational",
            DatastoreKind::Notification => "notification",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for DatastoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage plugin abstraction
///
/// Trees cross the boundary in their encoded form; callers never observe a
/// partially stored tree — atomic visibility of persisted state is part of
/// this contract.
pub trait DatastorePlugin: Send + Sync {
    /// Plugin name, as referenced by module plugin bindings
    fn name(&self) -> &'static str;

    /// Store a module's tree for one datastore kind
    fn store(&self, module: &str, ds: DatastoreKind, tree: &[u8]) -> Result<()>;

    /// Load a module's tree for one datastore kind, `None` when no tree was
    /// ever stored
    fn load(&self, module: &str, ds: DatastoreKind) -> Result<Option<Vec<u8>>>;
}

/// Notification log interface, consumed by the replay-support toggle only
pub trait NotificationLog: Send + Sync {
    /// Timestamp of the earliest retained notification for a module, `None`
    /// when nothing is retained
    fn earliest(&self, module: &str) -> Result<Option<SystemTime>>;
}

/// One storage plugin name per datastore kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBindings {
    names: [String; 5],
}

impl DsBindings {
    /// Bind the same plugin to every datastore kind
    pub fn uniform(plugin: &str) -> Self {
        Self {
            names: std::array::from_fn(|_| plugin.to_string()),
        }
    }

    /// Override the binding for one kind
    pub fn set(&mut self, ds: DatastoreKind, plugin: &str) {
        self.names[ds.index()] = plugin.to_string();
    }

    /// Plugin bound to a kind
    pub fn get(&self, ds: DatastoreKind) -> &str {
        &self.names[ds.index()]
    }
}

impl Default for DsBindings {
    fn default() -> Self {
        Self::uniform(FilePlugin::NAME)
    }
}
