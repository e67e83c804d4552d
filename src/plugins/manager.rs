//! Plugin manager for DevTerm
//!
//! The manager owns two tables keyed by plugin name:
//!
//! - `definitions`: discovered (or registered) plugins that have not
//!   necessarily been constructed yet
//! - `live`: constructed instances, in insertion order
//!
//! `execute` and `get_plugin_schema` only ever talk to live instances and
//! load them from `definitions` on first use.
//!
//! # Failure signalling
//!
//! | Situation | `execute` | `get_plugin_schema` |
//! |---|---|---|
//! | name unknown or construction failed | `None` | `Ok(None)` |
//! | plugin returned `Err` or panicked | `Some` failure result | `Err` / panic propagates |
//!
//! Discovery, construction and execution are contained: errors and panics are
//! logged and turned into `false` / skipped candidates / failure results.
//! Schema retrieval is not.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::PluginConfig;
use crate::error::{PluginError, Result};

use super::loader::{default_loaders, scan_candidates, CandidateLoader};
use super::types::{
    PluginDescriptor, PluginInfo, PluginInput, PluginOrigin, PluginResult, PluginSchema,
    ToolPlugin,
};

/// Default discovery root, relative to the working directory.
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

#[derive(Default)]
struct Registry {
    definitions: HashMap<String, PluginDescriptor>,
    live: IndexMap<String, Arc<dyn ToolPlugin>>,
}

/// Discovery, lifecycle and dispatch for tool plugins.
///
/// All operations take `&self`; share a manager across threads with `Arc`.
/// Loading and unloading are serialized by one lock. Executions run outside
/// the lock, so different plugins run in parallel.
///
/// # Example
///
/// ```rust
/// use devterm_plugin::plugins::{builtin::UppercasePlugin, PluginManager};
/// use serde_json::json;
///
/// let manager = PluginManager::new("plugins");
/// manager.register_builtin(UppercasePlugin);
///
/// let input = json!({"text": "hello world"}).as_object().cloned().unwrap();
/// let result = manager.execute("uppercase", &input).unwrap();
/// assert_eq!(result.output_text(), Some("HELLO WORLD"));
///
/// assert!(manager.execute("missing", &input).is_none());
/// ```
pub struct PluginManager {
    config: PluginConfig,
    loaders: Vec<Box<dyn CandidateLoader>>,
    registry: Mutex<Registry>,
}

impl PluginManager {
    /// Create a manager bound to `plugin_dir` with the default loaders.
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self::with_loaders(plugin_dir, default_loaders())
    }

    /// Create a manager with an explicit set of candidate loaders.
    ///
    /// When several loaders accept the same file, the first one wins.
    pub fn with_loaders(
        plugin_dir: impl Into<PathBuf>,
        loaders: Vec<Box<dyn CandidateLoader>>,
    ) -> Self {
        Self {
            config: PluginConfig::with_plugin_dir(plugin_dir),
            loaders,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create a manager from plugin configuration.
    ///
    /// Discovery honours the configured allow and block lists.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            config: config.clone(),
            loaders: default_loaders(),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// The discovery root.
    pub fn plugin_dir(&self) -> &Path {
        &self.config.plugin_dir
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Plugin code never runs while the lock is held without containment,
        // so a poisoned lock still guards consistent tables.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scan the discovery root and record every plugin definition found.
    ///
    /// Creates the root (and returns an empty list) when it does not exist.
    /// A root that exists but is not a directory yields an empty list.
    /// Candidates that fail to load are logged and skipped. A definition whose
    /// name is already known replaces the earlier one. The returned list holds
    /// every discovered name in scan order, repeats included.
    ///
    /// # Errors
    /// `PluginError::Io` if the root cannot be created or read.
    pub fn discover(&self) -> Result<Vec<String>> {
        let mut discovered = Vec::new();

        let dir = self.plugin_dir();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            info!(dir = %dir.display(), "Created plugin directory");
            return Ok(discovered);
        }
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Plugin path is not a directory, skipping");
            return Ok(discovered);
        }

        let mut found = Vec::new();
        for candidate in scan_candidates(dir, &self.loaders)? {
            let loader = &self.loaders[candidate.loader];
            match contain(|| loader.load(&candidate.path)) {
                Ok(descriptors) => {
                    debug!(
                        path = %candidate.path.display(),
                        loader = loader.kind(),
                        plugins = descriptors.len(),
                        "Loaded plugin candidate"
                    );
                    found.extend(descriptors.into_iter().map(|d| {
                        d.with_origin(PluginOrigin::File(candidate.path.clone()))
                    }));
                }
                Err(error) => {
                    warn!(
                        path = %candidate.path.display(),
                        loader = loader.kind(),
                        %error,
                        "Failed to load plugin candidate, skipping"
                    );
                }
            }
        }

        let mut registry = self.registry();
        for descriptor in found {
            let name = descriptor.name().to_string();
            if !self.config.is_plugin_permitted(&name) {
                info!(plugin = %name, "Plugin not permitted by configuration, skipping");
                continue;
            }
            if let Some(previous) = registry.definitions.get(&name) {
                debug!(
                    plugin = %name,
                    previous = %previous.origin(),
                    replacement = %descriptor.origin(),
                    "Plugin definition replaced"
                );
            }
            info!(plugin = %name, origin = %descriptor.origin(), "Discovered plugin");
            registry.definitions.insert(name.clone(), descriptor);
            discovered.push(name);
        }

        Ok(discovered)
    }

    /// Add a definition from code, as if it had been discovered.
    pub fn register_definition(&self, descriptor: PluginDescriptor) {
        let name = descriptor.name().to_string();
        self.registry().definitions.insert(name, descriptor);
    }

    /// Insert a built-in plugin straight into the live table.
    ///
    /// Built-ins have no definition, so once unloaded they stay unloaded.
    pub fn register_builtin<P>(&self, plugin: P)
    where
        P: ToolPlugin + 'static,
    {
        self.register_instance(Arc::new(plugin));
    }

    /// Insert an already constructed plugin into the live table.
    ///
    /// Replaces any live instance with the same name.
    pub fn register_instance(&self, plugin: Arc<dyn ToolPlugin>) {
        let name = plugin.name().to_string();
        debug!(plugin = %name, "Registered built-in plugin");
        self.registry().live.insert(name, plugin);
    }

    /// Construct `name` from its definition.
    ///
    /// Returns `true` if the plugin is live afterwards: already live, or
    /// constructed now. Returns `false` when the name has no definition or
    /// construction fails; failures are logged, never propagated.
    pub fn load(&self, name: &str) -> bool {
        let mut registry = self.registry();
        Self::load_locked(&mut registry, name).is_some()
    }

    fn load_locked(registry: &mut Registry, name: &str) -> Option<Arc<dyn ToolPlugin>> {
        if let Some(plugin) = registry.live.get(name) {
            return Some(Arc::clone(plugin));
        }

        let descriptor = registry.definitions.get(name)?;

        let built = contain(|| {
            let plugin = descriptor.instantiate()?;
            if plugin.name() != name {
                return Err(PluginError::Instantiation(format!(
                    "definition '{}' built a plugin named '{}'",
                    name,
                    plugin.name()
                )));
            }
            Ok(plugin)
        });

        match built {
            Ok(plugin) => {
                let plugin: Arc<dyn ToolPlugin> = Arc::from(plugin);
                info!(plugin = %name, origin = %descriptor.origin(), "Loaded plugin");
                registry.live.insert(name.to_string(), Arc::clone(&plugin));
                Some(plugin)
            }
            Err(error) => {
                warn!(plugin = %name, %error, "Failed to load plugin");
                None
            }
        }
    }

    /// Drop the live instance of `name`. Returns whether one existed.
    ///
    /// The definition is kept, so the plugin can be loaded again.
    pub fn unload(&self, name: &str) -> bool {
        let removed = self.registry().live.shift_remove(name).is_some();
        if removed {
            info!(plugin = %name, "Unloaded plugin");
        }
        removed
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn ToolPlugin>> {
        let mut registry = self.registry();
        Self::load_locked(&mut registry, name)
    }

    /// Run `name` against `input`, loading it first if needed.
    ///
    /// Returns `None` if the plugin cannot be resolved. Otherwise always
    /// returns a result: errors and panics raised by the plugin become
    /// `{"success": false, "error": ...}`.
    pub fn execute(&self, name: &str, input: &PluginInput) -> Option<PluginResult> {
        let plugin = self.resolve(name)?;
        Some(run_contained(plugin.as_ref(), input))
    }

    /// Like [`execute`](Self::execute), but gives up after `timeout`.
    ///
    /// The call runs on tokio's blocking pool. A timeout is reported as a
    /// failure result; the plugin call itself keeps running to completion in
    /// the background.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        input: PluginInput,
        timeout: Duration,
    ) -> Option<PluginResult> {
        let plugin = self.resolve(name)?;
        let task = tokio::task::spawn_blocking(move || run_contained(plugin.as_ref(), &input));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => PluginResult::failure(join_error.to_string()),
            Err(_) => {
                let error = PluginError::Timeout(format!(
                    "plugin '{}' timed out after {:?}",
                    name, timeout
                ));
                warn!(plugin = %name, %error, "Plugin execution timed out");
                PluginResult::failure(error.to_string())
            }
        };
        Some(result)
    }

    /// Schema of `name`, loading it first if needed.
    ///
    /// Returns `Ok(None)` if the plugin cannot be resolved. Errors from the
    /// plugin are returned as-is and panics are not caught.
    pub fn get_plugin_schema(&self, name: &str) -> Result<Option<PluginSchema>> {
        match self.resolve(name) {
            Some(plugin) => plugin.schema().map(Some),
            None => Ok(None),
        }
    }

    /// Identity of every live plugin, in load order.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry().live.values().map(|p| p.info()).collect()
    }

    /// Whether `name` is live.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry().live.contains_key(name)
    }

    /// Whether `name` has a definition.
    pub fn is_defined(&self, name: &str) -> bool {
        self.registry().definitions.contains_key(name)
    }

    /// Where the definition of `name` came from.
    pub fn definition_origin(&self, name: &str) -> Option<PluginOrigin> {
        self.registry()
            .definitions
            .get(name)
            .map(|d| d.origin().clone())
    }

    /// Number of live plugins.
    pub fn plugin_count(&self) -> usize {
        self.registry().live.len()
    }

    /// Number of known definitions.
    pub fn definition_count(&self) -> usize {
        self.registry().definitions.len()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(DEFAULT_PLUGIN_DIR)
    }
}

fn run_contained(plugin: &dyn ToolPlugin, input: &PluginInput) -> PluginResult {
    match contain(|| plugin.execute(input)) {
        Ok(result) => result,
        Err(error) => {
            warn!(plugin = %plugin.name(), %error, "Plugin execution failed");
            PluginResult::failure(error)
        }
    }
}

thread_local! {
    static CONTAINING: Cell<usize> = const { Cell::new(0) };
}

/// Install a panic hook that keeps contained plugin panics off stderr.
///
/// A panic caught by the manager is already reported by a `warn!` record, so
/// the hook only logs it at `debug!`. Every other panic goes to the hook that
/// was installed before.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if CONTAINING.with(Cell::get) > 0 {
            debug!(panic = %info, "Contained plugin panic");
        } else {
            previous(info);
        }
    }));
}

/// Run `f`, turning both its error and any panic into a message.
fn contain<T>(f: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    CONTAINING.with(|depth| depth.set(depth.get() + 1));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINING.with(|depth| depth.set(depth.get() - 1));

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("plugin panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("plugin panicked: {}", message)
    } else {
        "plugin panicked".to_string()
    }
}
