//! Per-plugin class resolution.
//!
//! Each top-level plugin gets its own [`PluginClassLoader`], rooted at the
//! host catalog. A child plugin (`parent_plugin` in its manifest) chains to
//! its parent's loader, so classes the parent resolved are shared rather
//! than instantiated from a second copy.
//!
//! Resolution is parent-first: the parent loader (or, at the root, the host
//! catalog) is asked before the loader's own native libraries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::catalog::{Factory, PluginCatalog};
use crate::error::{PluginError, PluginResult};

/// Directory of a plugin's own classes.
pub const CLASSES_DIR: &str = "classes";
/// Directory of a plugin's bundled libraries.
pub const LIB_DIR: &str = "lib";

/// Class loader of one plugin directory (plus any child directories sharing it).
pub struct PluginClassLoader {
    name: String,
    parent: Option<Arc<PluginClassLoader>>,
    catalog: Arc<PluginCatalog>,
    search_path: RwLock<Vec<PathBuf>>,
    #[cfg(feature = "native-plugins")]
    libraries: RwLock<Vec<native::NativeLibrary>>,
    destroyed: AtomicBool,
}

impl PluginClassLoader {
    /// Top-level loader resolving through the host catalog.
    pub fn new(name: impl Into<String>, catalog: Arc<PluginCatalog>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            catalog,
            search_path: RwLock::new(Vec::new()),
            #[cfg(feature = "native-plugins")]
            libraries: RwLock::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Loader that asks `parent` first.
    pub fn with_parent(name: impl Into<String>, parent: Arc<PluginClassLoader>) -> Self {
        let catalog = parent.catalog.clone();
        Self {
            parent: Some(parent),
            ..Self::new(name, catalog)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<PluginClassLoader>> {
        self.parent.as_ref()
    }

    /// Adds `<dir>/classes` and every file in `<dir>/lib` to the search path.
    ///
    /// With the `native-plugins` feature, dynamic libraries found in `lib/`
    /// are opened and their class tables become resolvable.
    pub fn add_directory(&self, dir: &Path) -> PluginResult<()> {
        let mut added = Vec::new();

        let classes = dir.join(CLASSES_DIR);
        if classes.is_dir() {
            added.push(classes);
        }

        let lib = dir.join(LIB_DIR);
        if lib.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(&lib)? {
                let path = entry?.path();
                if path.is_file() {
                    entries.push(path);
                }
            }
            entries.sort();
            added.extend(entries);
        }

        #[cfg(feature = "native-plugins")]
        for path in added.iter().filter(|p| native::is_library(p)) {
            let library = native::NativeLibrary::open(path)?;
            debug!(
                loader = %self.name,
                library = %path.display(),
                classes = library.class_count(),
                "Opened native plugin library"
            );
            self.libraries.write().push(library);
        }

        trace!(loader = %self.name, dir = %dir.display(), entries = added.len(), "Extended search path");
        self.search_path.write().extend(added);
        Ok(())
    }

    /// Current search path, in insertion order.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path.read().clone()
    }

    /// Resolves `class` through the chain.
    pub fn load_class(&self, class: &str) -> PluginResult<Factory> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PluginError::MissingClass(class.to_string()));
        }
        self.find(class)
            .ok_or_else(|| PluginError::MissingClass(class.to_string()))
    }

    fn find(&self, class: &str) -> Option<Factory> {
        let inherited = match &self.parent {
            Some(parent) => parent.find(class),
            None => self.catalog.factory(class),
        };
        inherited.or_else(|| self.find_own(class))
    }

    #[cfg(feature = "native-plugins")]
    fn find_own(&self, class: &str) -> Option<Factory> {
        self.libraries.read().iter().find_map(|lib| lib.factory(class))
    }

    #[cfg(not(feature = "native-plugins"))]
    fn find_own(&self, _class: &str) -> Option<Factory> {
        None
    }

    /// Releases the loader's libraries. Loading fails afterwards.
    ///
    /// Instances created from a native library keep it mapped until their
    /// last clone is dropped.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "native-plugins")]
        self.libraries.write().clear();
        self.search_path.write().clear();
        debug!(loader = %self.name, "Destroyed class loader");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PluginClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClassLoader")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("search_path", &*self.search_path.read())
            .finish()
    }
}

#[cfg(feature = "native-plugins")]
pub mod native {
    //! Plugin classes exported from dynamic libraries.
    //!
    //! A library exports [`ENTRY_SYMBOL`] returning a [`NativeClassTable`].
    //! Host and plugin must be built with the same compiler and the same
    //! `switchboard` version; the table's `api_version` guards the latter.

    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use libloading::{Library, Symbol};

    use crate::catalog::{Factory, PluginClass};
    use crate::error::{PluginError, PluginResult};

    /// Bumped whenever `PluginClass`, `Module` or `Plugin` change shape.
    pub const NATIVE_API_VERSION: u32 = 1;

    /// Symbol every native plugin library exports.
    pub const ENTRY_SYMBOL: &[u8] = b"switchboard_plugin_classes\0";

    /// What the entry symbol returns.
    #[repr(C)]
    pub struct NativeClassTable {
        pub api_version: u32,
        pub classes: &'static [PluginClass],
    }

    pub type EntryFn = unsafe extern "C" fn() -> *const NativeClassTable;

    pub(crate) fn is_library(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == std::env::consts::DLL_EXTENSION)
    }

    pub(crate) struct NativeLibrary {
        path: PathBuf,
        library: Arc<Library>,
        classes: &'static [PluginClass],
    }

    impl NativeLibrary {
        pub(crate) fn open(path: &Path) -> PluginResult<Self> {
            let library_error = |reason: String| PluginError::Library {
                path: path.to_path_buf(),
                reason,
            };

            // SAFETY: loading a plugin library runs its initializers; plugin
            // libraries are trusted code installed by the operator.
            let library = unsafe { Library::new(path) }.map_err(|e| library_error(e.to_string()))?;

            // SAFETY: symbol type matches the entry contract above.
            let entry: Symbol<EntryFn> = unsafe { library.get(ENTRY_SYMBOL) }
                .map_err(|e| library_error(format!("missing entry symbol: {e}")))?;

            // SAFETY: entrypoint is trusted by contract; null and version checked below.
            let table = unsafe { entry() };
            if table.is_null() {
                return Err(library_error("entry returned a null class table".into()));
            }
            // SAFETY: the table is static data inside the library, valid while it stays loaded.
            let table = unsafe { &*table };
            if table.api_version != NATIVE_API_VERSION {
                return Err(library_error(format!(
                    "api_version mismatch: library={}, host={NATIVE_API_VERSION}",
                    table.api_version
                )));
            }
            let classes = table.classes;

            Ok(Self {
                path: path.to_path_buf(),
                library: Arc::new(library),
                classes,
            })
        }

        pub(crate) fn class_count(&self) -> usize {
            self.classes.len()
        }

        pub(crate) fn factory(&self, class: &str) -> Option<Factory> {
            let found = self.classes.iter().find(|c| c.name == class)?;
            let create = found.create;
            let library = self.library.clone();
            Some(Arc::new(move || create().pinned(library.clone())))
        }
    }

    impl std::fmt::Debug for NativeLibrary {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("NativeLibrary").field("path", &self.path).finish()
        }
    }
}
