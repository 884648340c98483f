//! Isolated Sync Session
//!
//! Runs one task invocation end to end: enters an isolated context, resolves
//! and stages the environment, downloads plugins, provisions an ephemeral
//! workdir, and runs the caller's unit of work against it.
//!
//! Teardown runs exactly once on every exit path, including a panicking unit
//! of work. Resources are held as `Option`s and only the ones actually
//! allocated are released.

pub mod facade;

pub use facade::{PluginCache, SessionSettings};

use crate::cache::{
    EnvironmentPaths, EnvironmentStager, EphemeralWorkdir, EphemeralWorkdirProvisioner,
};
use crate::error::{SyncError, SyncStage};
use crate::runtime::{AgentRuntime, SessionContext};
use crate::types::{EnvironmentName, Identity};
use tracing::{debug, info, warn};

/// Lifecycle of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    ContextEntered,
    EnvironmentStaged,
    PluginsDownloaded,
    WorkdirProvisioned,
    CallbackRunning,
    TornDown,
}

pub struct IsolatedSyncSession<'a> {
    runtime: &'a dyn AgentRuntime,
    stager: &'a EnvironmentStager,
    provisioner: &'a EphemeralWorkdirProvisioner,
    settings: &'a SessionSettings,
    environment: EnvironmentName,
    identity: Identity,
    state: SessionState,
    context: Option<SessionContext>,
    workdir: Option<EphemeralWorkdir>,
}

impl<'a> IsolatedSyncSession<'a> {
    pub fn new(
        runtime: &'a dyn AgentRuntime,
        stager: &'a EnvironmentStager,
        provisioner: &'a EphemeralWorkdirProvisioner,
        settings: &'a SessionSettings,
        environment: EnvironmentName,
        identity: Identity,
    ) -> Self {
        Self {
            runtime,
            stager,
            provisioner,
            settings,
            environment,
            identity,
            state: SessionState::Created,
            context: None,
            workdir: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session and return what the unit of work returns.
    ///
    /// The first error aborts the remaining stages; teardown has already run
    /// when this returns.
    pub fn run<T, F>(mut self, unit_of_work: F) -> Result<T, SyncError>
    where
        F: FnOnce(&SessionContext) -> anyhow::Result<T>,
    {
        info!(
            environment = %self.environment,
            identity = %self.identity,
            "Starting sync session"
        );

        let result = self.drive(unit_of_work);
        if let Err(e) = &result {
            warn!(
                environment = %self.environment,
                identity = %self.identity,
                state = ?self.state,
                stage = %e.stage(),
                "Sync session failed: {}",
                e
            );
        }

        self.teardown();
        if result.is_ok() {
            info!(
                environment = %self.environment,
                identity = %self.identity,
                "Sync session finished"
            );
        }
        result
    }

    fn drive<T, F>(&mut self, unit_of_work: F) -> Result<T, SyncError>
    where
        F: FnOnce(&SessionContext) -> anyhow::Result<T>,
    {
        let label = format!("{}@{}", self.identity, self.environment);

        let pool = self.runtime.create_network_pool(self.settings.keep_alive)?;
        let context = self.context.insert(SessionContext::push_isolated(
            self.environment.clone(),
            self.identity.clone(),
            pool,
            label,
        ));
        advance(&mut self.state, SessionState::ContextEntered);

        let handle = self.runtime.resolve_remote_environment(&self.environment)?;
        let environment_dir = self
            .stager
            .stage(&self.environment)
            .map_err(|e| e.at_stage(SyncStage::StageEnvironment))?;
        let paths = EnvironmentPaths::new(&environment_dir);
        let plugin_dest = paths.plugin_dest_dir.clone();
        context.set_active_config(paths);
        advance(&mut self.state, SessionState::EnvironmentStaged);

        self.runtime
            .download_plugins(context, &handle)
            .map_err(|e| e.at_stage(SyncStage::DownloadPlugins))?;
        advance(&mut self.state, SessionState::PluginsDownloaded);

        let provisioned = self
            .provisioner
            .provision(&plugin_dest, &self.settings.label)
            .map_err(|e| e.at_stage(SyncStage::ProvisionWorkdir))?;
        let workdir = self.workdir.insert(provisioned);
        context.set_lib_dir(workdir.path());
        context.append_to_module_search_path(workdir.path());
        advance(&mut self.state, SessionState::WorkdirProvisioned);

        advance(&mut self.state, SessionState::CallbackRunning);
        unit_of_work(&*context).map_err(SyncError::Callback)
    }

    /// Release whatever was allocated. Never fails; problems are logged.
    fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }

        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().to_path_buf();
            match workdir.close() {
                Ok(()) => debug!(workdir = %path.display(), "Removed ephemeral workdir"),
                Err(e) => warn!(
                    workdir = %path.display(),
                    "Failed to remove ephemeral workdir: {}",
                    e
                ),
            }
        }

        if let Some(mut pool) = self.context.as_mut().and_then(|c| c.take_network_pool()) {
            pool.close();
        }

        advance(&mut self.state, SessionState::TornDown);
    }
}

impl Drop for IsolatedSyncSession<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn advance(state: &mut SessionState, next: SessionState) {
    debug!(from = ?*state, to = ?next, "Session transition");
    *state = next;
}
