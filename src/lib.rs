// ABOUTME: Root library module for the Slack adapter binary
// ABOUTME: Slack transport, built-in handler and logging setup over slink-core

pub mod handler;
pub mod logging;
pub mod platform;

// Re-export platform-agnostic modules from slink-core
pub use slink_core::config;
pub use slink_core::metrics;
pub use slink_core::traits;
