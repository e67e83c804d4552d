//! Native plugins loaded from dynamic libraries.
//!
//! A native plugin library exports one registration function named
//! [`REGISTER_SYMBOL`] that receives a [`PluginRegistrar`] and registers each
//! plugin type it provides. The [`export_plugins!`](crate::export_plugins)
//! macro generates that function:
//!
//! ```rust,ignore
//! use devterm_plugin::export_plugins;
//!
//! export_plugins! {
//!     "rot13" => Rot13Plugin,
//!     "slug" => SlugPlugin,
//! }
//! ```
//!
//! The registration function is called with the Rust ABI, so the library
//! must be built with the same compiler and the same version of this crate
//! as the host.

use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::error::{PluginError, Result};

use super::loader::CandidateLoader;
use super::types::{
    PluginDescriptor, PluginFactory, PluginInfo, PluginInput, PluginOrigin, PluginResult,
    PluginSchema, ToolPlugin,
};

/// Name of the function every native plugin library exports.
pub const REGISTER_SYMBOL: &str = "devterm_register_plugins";

/// Signature of the exported registration function.
pub type RegisterPlugins = fn(&mut PluginRegistrar);

/// Collects the definitions a library registers.
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one definition.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn into_descriptors(self) -> Vec<PluginDescriptor> {
        self.descriptors
    }
}

/// Generate the registration function for a native plugin library.
///
/// Each entry binds a registry name to a type implementing
/// `ToolPlugin + Default`.
#[macro_export]
macro_rules! export_plugins {
    ($($name:literal => $plugin:ty),+ $(,)?) => {
        #[no_mangle]
        pub fn devterm_register_plugins(
            registrar: &mut $crate::plugins::native::PluginRegistrar,
        ) {
            $(
                registrar.register($crate::plugins::PluginDescriptor::of::<$plugin>($name));
            )+
        }
    };
}

/// Loads plugin libraries with the platform's dynamic library extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl CandidateLoader for NativeLoader {
    fn kind(&self) -> &str {
        "native"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
    }

    fn load(&self, path: &Path) -> Result<Vec<PluginDescriptor>> {
        // Safety: loading a library runs its initializers. Plugins are
        // trusted code; there is no isolation between them and the host.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            PluginError::Load(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let register: RegisterPlugins = unsafe {
            let symbol: Symbol<'_, RegisterPlugins> =
                library.get(REGISTER_SYMBOL.as_bytes()).map_err(|e| {
                    PluginError::Load(format!(
                        "{} does not export {}: {}",
                        path.display(),
                        REGISTER_SYMBOL,
                        e
                    ))
                })?;
            *symbol
        };

        let mut registrar = PluginRegistrar::new();
        register(&mut registrar);

        let library = Arc::new(library);
        Ok(registrar
            .into_descriptors()
            .into_iter()
            .map(|descriptor| bind_to_library(descriptor, &library, path))
            .collect())
    }
}

/// Factory that keeps its library mapped. Field order matters: the factory,
/// whose code lives in the library, drops first.
struct BoundFactory {
    factory: PluginFactory,
    library: Arc<Library>,
}

/// Instance that keeps its library mapped. Field order matters as above.
struct LibraryBound {
    plugin: Box<dyn ToolPlugin>,
    _library: Arc<Library>,
}

fn bind_to_library(
    descriptor: PluginDescriptor,
    library: &Arc<Library>,
    path: &Path,
) -> PluginDescriptor {
    let bound = BoundFactory {
        factory: descriptor.factory(),
        library: Arc::clone(library),
    };

    PluginDescriptor::new(descriptor.name().to_string(), move || {
        let plugin = (bound.factory)()?;
        Ok(Box::new(LibraryBound {
            plugin,
            _library: Arc::clone(&bound.library),
        }) as Box<dyn ToolPlugin>)
    })
    .with_origin(PluginOrigin::File(path.to_path_buf()))
}

impl ToolPlugin for LibraryBound {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn description(&self) -> &str {
        self.plugin.description()
    }

    fn category(&self) -> &str {
        self.plugin.category()
    }

    fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
        self.plugin.execute(input)
    }

    fn schema(&self) -> Result<PluginSchema> {
        self.plugin.schema()
    }

    fn info(&self) -> PluginInfo {
        self.plugin.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin::{ReversePlugin, UppercasePlugin};
    use tempfile::TempDir;

    crate::export_plugins! {
        "uppercase" => UppercasePlugin,
        "reverse" => ReversePlugin,
    }

    #[test]
    fn test_export_plugins_registers_in_order() {
        let mut registrar = PluginRegistrar::new();
        let register: RegisterPlugins = devterm_register_plugins;
        register(&mut registrar);

        assert_eq!(registrar.len(), 2);
        let names: Vec<String> = registrar
            .into_descriptors()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["uppercase", "reverse"]);
    }

    #[test]
    fn test_registered_descriptor_is_lazy_and_builds() {
        let mut registrar = PluginRegistrar::new();
        assert!(registrar.is_empty());
        devterm_register_plugins(&mut registrar);

        let descriptors = registrar.into_descriptors();
        let plugin = descriptors[1].instantiate().unwrap();
        assert_eq!(plugin.name(), "reverse");
    }

    #[test]
    fn test_native_loader_accepts_platform_extension() {
        let ext = std::env::consts::DLL_EXTENSION;
        assert!(NativeLoader.accepts(Path::new(&format!("plugins/libthing.{}", ext))));
        assert!(!NativeLoader.accepts(Path::new("plugins/thing.json")));
    }

    #[test]
    fn test_native_loader_rejects_garbage_library() {
        let tmp = TempDir::new().unwrap();
        let path = tmp
            .path()
            .join(format!("broken.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"definitely not a shared object").unwrap();

        let err = NativeLoader.load(&path).unwrap_err();
        assert!(matches!(err, PluginError::Load(_)));
        assert!(err.to_string().contains("Failed to open"));
    }
}
