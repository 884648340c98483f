//! Plugin Cache: staged, isolated plugin trees for agent task runs
//!
//! Keeps a local cache of remotely synced plugin trees keyed by environment
//! name. Concurrent task invocations share the cache root under one exclusive
//! lock, each gets a disposable copy of the plugin tree, and each carries its
//! own explicit runtime context instead of process-wide settings.

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod tooling;
pub mod types;

pub use cache::{CacheRoot, EnvironmentStager, EphemeralWorkdir, EphemeralWorkdirProvisioner};
pub use error::{SyncError, SyncStage};
pub use runtime::{AgentRuntime, NetworkPool, SessionContext};
pub use session::{IsolatedSyncSession, PluginCache, SessionSettings, SessionState};
pub use types::{EnvironmentHandle, EnvironmentName, Identity};
