//! Agent Runtime
//!
//! Interfaces consumed from the agent runtime: environment resolution,
//! plugin download, and network pool creation. Configuration assignment and
//! module search path mutation live on [`SessionContext`], which a session
//! owns outright, so no runtime state is process-global.

pub mod context;
pub mod mirror;
pub mod pool;

pub use context::{ActiveConfig, SessionContext};
pub use mirror::MirrorRuntime;
pub use pool::HttpPool;

use crate::error::SyncError;
use crate::types::{EnvironmentHandle, EnvironmentName};
use std::time::Duration;

/// Connection pool installed as the active pool of one session
pub trait NetworkPool: Send {
    fn keep_alive(&self) -> Duration;

    /// Release every pooled connection. Calling it twice is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Agent runtime collaborator driven by a sync session
pub trait AgentRuntime: Send + Sync {
    /// Resolve `name` as a remote environment
    fn resolve_remote_environment(
        &self,
        name: &EnvironmentName,
    ) -> Result<EnvironmentHandle, SyncError>;

    /// Download the environment's plugins into the context's plugin
    /// destination. Retry policy, if any, belongs to the implementation.
    fn download_plugins(
        &self,
        context: &SessionContext,
        environment: &EnvironmentHandle,
    ) -> Result<(), SyncError>;

    fn create_network_pool(&self, keep_alive: Duration) -> Result<Box<dyn NetworkPool>, SyncError> {
        Ok(Box::new(HttpPool::new(keep_alive)?))
    }
}
