//! Plugin system for DevTerm
//!
//! This module discovers tool plugins from a directory, loads them on demand
//! and dispatches calls to them with per-plugin failure containment.
//!
//! # Architecture
//!
//! - **types**: The plugin contract (`ToolPlugin`) and the values crossing it
//! - **manager**: Discovery, lazy loading, lifecycle and dispatch
//! - **loader**: Candidate scanning and the JSON manifest loader
//! - **command**: Command plugins declared by manifests
//! - **native**: Plugins compiled as dynamic libraries (feature `native`)
//! - **builtin**: The built-in text plugins
//!
//! # Plugin Directory Structure
//!
//! ```text
//! plugins/
//! ├── shout.json          # one command plugin
//! ├── text-pack.json      # {"plugins": [...]}
//! ├── libextra.so         # native library exporting devterm_register_plugins
//! └── _draft.json         # ignored (leading underscore)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use devterm_plugin::plugins::{builtin, PluginManager};
//! use serde_json::json;
//!
//! let manager = PluginManager::new("plugins");
//! let discovered = manager.discover().unwrap();
//! println!("Found {} external plugins", discovered.len());
//!
//! for plugin in builtin::builtin_plugins() {
//!     manager.register_instance(plugin.into());
//! }
//!
//! let input = json!({"text": "hello world"}).as_object().cloned().unwrap();
//! if let Some(result) = manager.execute("uppercase", &input) {
//!     println!("{}", result);
//! }
//! ```

pub mod builtin;
pub mod command;
pub mod loader;
pub mod manager;
#[cfg(feature = "native")]
pub mod native;
pub mod types;

pub use loader::{default_loaders, CandidateLoader, ManifestLoader};
pub use manager::{install_panic_hook, PluginManager, DEFAULT_PLUGIN_DIR};
pub use types::{
    PluginDescriptor, PluginInfo, PluginInput, PluginOrigin, PluginResult, PluginSchema,
    SchemaInput, SchemaOutput, ToolPlugin,
};
