//! Integration tests for the plugin cache

mod cli_contracts;
mod concurrent_sessions;
mod session_lifecycle;
