//! DevTerm Plugin - minimal tool plugin host
//!
//! Discovers tool plugins from a directory, loads them on demand, exposes a
//! uniform execute/schema contract and contains failures per plugin.

pub mod config;
pub mod error;
pub mod plugins;

pub use config::Config;
pub use error::{PluginError, Result};
pub use plugins::{PluginManager, PluginResult, PluginSchema, ToolPlugin};
