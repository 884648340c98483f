//! Validated identifiers shared across the cache and session layers.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const MAX_ENVIRONMENT_NAME_LEN: usize = 255;

/// Name of a remote environment.
///
/// Used verbatim as one path component under the cache root, so it never
/// contains separators and never starts with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentName(String);

impl EnvironmentName {
    pub fn new(name: impl Into<String>) -> Result<Self, SyncError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SyncError::Config("Environment name is empty".to_string()));
        }
        if name.len() > MAX_ENVIRONMENT_NAME_LEN {
            return Err(SyncError::Config(format!(
                "Environment name exceeds {} bytes",
                MAX_ENVIRONMENT_NAME_LEN
            )));
        }
        if name.starts_with('.') {
            return Err(SyncError::Config(format!(
                "Environment name must not start with '.': {}",
                name
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(SyncError::Config(format!(
                "Environment name {:?} contains invalid character {:?}",
                name, bad
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EnvironmentName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EnvironmentName> for String {
    fn from(value: EnvironmentName) -> Self {
        value.0
    }
}

/// Target identity (certname) a session runs work against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(identity: impl Into<String>) -> Result<Self, SyncError> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(SyncError::Config("Identity is empty".to_string()));
        }
        if identity
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(SyncError::Config(format!(
                "Identity {:?} contains whitespace or a path separator",
                identity
            )));
        }
        Ok(Self(identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote environment as resolved by the agent runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    pub name: EnvironmentName,
    /// Runtime-private location of the environment's plugin source
    pub source: Option<PathBuf>,
}

impl EnvironmentHandle {
    pub fn remote(name: EnvironmentName) -> Self {
        Self { name, source: None }
    }
}
