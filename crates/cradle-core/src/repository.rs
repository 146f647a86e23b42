//! Component repository.
//!
//! The repository indexes factories for every component category the runtime
//! knows about, keyed by `(category, type name)`. Built-in components are
//! registered directly; plugins contribute theirs from shared objects loaded
//! at startup.
//!
//! # Plugin ABI
//!
//! A plugin is a shared object with the `.cradle-plugin` extension exporting:
//!
//! - `validation() -> Preconditions` (optional) - the highest host version
//!   the plugin supports; a plugin requiring more than [`HOST_VERSION`] is
//!   rejected.
//! - `initialize(*mut ComponentMap) -> c_int` (required) - registers the
//!   plugin's factories; a nonzero return aborts the plugin's adoption and
//!   none of its registrations become visible.
//!
//! Plugins are compiled against this crate and loaded with global symbol
//! visibility so that they may share each other's exported types.

use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version of the component ABI exposed to plugins.
pub const HOST_VERSION: u32 = 1;

/// File extension of plugin shared objects.
pub const PLUGIN_EXTENSION: &str = "cradle-plugin";

/// Preconditions a plugin may declare through its `validation` symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Preconditions {
    /// Host version the plugin was built for.
    pub version: u32,
}

/// Type of the optional `validation` plugin symbol.
pub type ValidationFn = unsafe extern "C" fn() -> Preconditions;

/// Type of the required `initialize` plugin symbol.
pub type InitializeFn = unsafe extern "C" fn(*mut ComponentMap) -> c_int;

/// Errors raised while loading plugins or constructing components.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The shared object could not be loaded.
    #[error("unable to load plugin '{path}': {reason}")]
    PluginLoad { path: PathBuf, reason: String },

    /// The plugin requires a newer host.
    #[error("plugin '{path}' requires host version {required}, this host is version {host}")]
    VersionMismatch {
        path: PathBuf,
        required: u32,
        host: u32,
    },

    /// The plugin does not export `initialize`.
    #[error("unable to initialize plugin '{path}': initialize() is missing")]
    MissingEntryPoint { path: PathBuf },

    /// The plugin's `initialize` reported failure, or its registrations
    /// conflict with components already present.
    #[error("unable to initialize plugin '{path}': {reason}")]
    InitFailed { path: PathBuf, reason: String },

    /// A factory is already registered under this `(category, type)` pair.
    #[error("component '{type_name}' is already registered in category '{category}'")]
    DuplicateComponent {
        category: &'static str,
        type_name: String,
    },

    /// No factory is registered under this `(category, type)` pair.
    #[error("component '{type_name}' not found in category '{category}'")]
    ComponentNotFound {
        category: &'static str,
        type_name: String,
    },

    /// The factory was found but failed to construct the component.
    #[error("unable to construct component '{type_name}': {reason}")]
    Construction { type_name: String, reason: String },
}

/// A component category: a compile-time identity tying a family of
/// interchangeable components to their construction arguments.
pub trait Category: 'static {
    /// Category name used in diagnostics and error messages.
    const NAME: &'static str;

    /// Concrete object produced by factories of this category.
    type Instance;

    /// Arguments consumed by factories of this category.
    type Args;
}

/// A factory constructing one component type of category `C`.
pub type Factory<C> =
    Box<dyn Fn(&<C as Category>::Args) -> anyhow::Result<<C as Category>::Instance>>;

struct CategoryTable {
    // Category NAME, kept for diagnostics once the TypeId has erased it.
    name: &'static str,
    factories: HashMap<String, Box<dyn Any>>,
}

/// Type-indexed map of category factory tables.
///
/// This is the registration surface handed to plugin `initialize` functions;
/// the [`Repository`] owns the authoritative one.
#[derive(Default)]
pub struct ComponentMap {
    categories: HashMap<TypeId, CategoryTable>,
}

impl ComponentMap {
    /// Create an empty component map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for category `C` under `type_name`.
    pub fn insert<C: Category>(
        &mut self,
        type_name: &str,
        factory: Factory<C>,
    ) -> Result<(), RepositoryError> {
        let table = self
            .categories
            .entry(TypeId::of::<C>())
            .or_insert_with(|| CategoryTable {
                name: C::NAME,
                factories: HashMap::new(),
            });

        match table.factories.entry(type_name.to_string()) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateComponent {
                category: C::NAME,
                type_name: type_name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(factory));
                Ok(())
            }
        }
    }

    /// Construct a component of category `C` by type name.
    pub fn get<C: Category>(
        &self,
        type_name: &str,
        args: &C::Args,
    ) -> Result<C::Instance, RepositoryError> {
        let not_found = || RepositoryError::ComponentNotFound {
            category: C::NAME,
            type_name: type_name.to_string(),
        };

        let factory = self
            .categories
            .get(&TypeId::of::<C>())
            .ok_or_else(not_found)?
            .factories
            .get(type_name)
            .ok_or_else(not_found)?
            .downcast_ref::<Factory<C>>()
            .expect("factory entries are keyed by their category TypeId");

        factory(args).map_err(|e| RepositoryError::Construction {
            type_name: type_name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fold another map into this one, rejecting the merge wholesale if any
    /// `(category, type)` pair is already taken.
    fn merge(&mut self, other: ComponentMap) -> Result<(), RepositoryError> {
        for (type_id, table) in &other.categories {
            if let Some(existing) = self.categories.get(type_id) {
                for type_name in table.factories.keys() {
                    if existing.factories.contains_key(type_name) {
                        return Err(RepositoryError::DuplicateComponent {
                            category: table.name,
                            type_name: type_name.clone(),
                        });
                    }
                }
            }
        }

        for (type_id, table) in other.categories {
            match self.categories.entry(type_id) {
                Entry::Occupied(mut slot) => {
                    slot.get_mut().factories.extend(table.factories);
                }
                Entry::Vacant(slot) => {
                    slot.insert(table);
                }
            }
        }

        Ok(())
    }
}

/// Process-wide registry of component factories and the plugins that
/// supplied them.
#[derive(Default)]
pub struct Repository {
    // Field order is load-bearing: the factory closures in `components` are
    // backed by code inside `plugins`, so the component map must be dropped
    // before the libraries are closed.
    components: ComponentMap,
    plugins: Vec<Library>,
}

impl Repository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for category `C` under `type_name`.
    ///
    /// Used by built-in components and, indirectly, by plugin `initialize`
    /// functions.
    pub fn insert<C: Category>(
        &mut self,
        type_name: &str,
        factory: Factory<C>,
    ) -> Result<(), RepositoryError> {
        self.components.insert::<C>(type_name, factory)
    }

    /// Construct a component of category `C` by type name.
    pub fn get<C: Category>(
        &self,
        type_name: &str,
        args: &C::Args,
    ) -> Result<C::Instance, RepositoryError> {
        self.components.get::<C>(type_name, args)
    }

    /// Load every plugin found in `dir`.
    ///
    /// Failures are per-plugin: a plugin that cannot be loaded or
    /// initialized is logged and skipped, and enumeration continues.
    pub fn load(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "unable to enumerate plugins");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();

            let is_plugin = path.is_file()
                && path
                    .extension()
                    .map_or(false, |ext| ext == PLUGIN_EXTENSION);
            if !is_plugin {
                continue;
            }

            if let Err(e) = self.open(&path) {
                tracing::error!(plugin = %path.display(), error = %e, "unable to load plugin");
            }
        }
    }

    /// Load and initialize a single plugin shared object.
    pub fn open(&mut self, path: &Path) -> Result<(), RepositoryError> {
        tracing::info!(plugin = %path.display(), "loading plugin");

        let library = unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map_err(|e| {
            RepositoryError::PluginLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if let Ok(validation) = unsafe { library.get::<ValidationFn>(b"validation") } {
            let preconditions = unsafe { validation() };
            check_preconditions(path, preconditions)?;
        }

        let initialize = unsafe { library.get::<InitializeFn>(b"initialize") }.map_err(|_| {
            RepositoryError::MissingEntryPoint {
                path: path.to_path_buf(),
            }
        })?;

        tracing::info!(plugin = %path.display(), "initializing plugin");

        // The plugin registers into a staging map that is merged only after
        // initialize() reports success, so a failed plugin leaves nothing
        // observable behind.
        let mut staging = ComponentMap::new();
        let rv = unsafe { initialize(&mut staging) };

        if rv != 0 {
            return Err(RepositoryError::InitFailed {
                path: path.to_path_buf(),
                reason: format!("initialize() returned {rv}"),
            });
        }

        self.components
            .merge(staging)
            .map_err(|e| RepositoryError::InitFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        self.plugins.push(library);
        Ok(())
    }
}

fn check_preconditions(path: &Path, preconditions: Preconditions) -> Result<(), RepositoryError> {
    if preconditions.version > HOST_VERSION {
        return Err(RepositoryError::VersionMismatch {
            path: path.to_path_buf(),
            required: preconditions.version,
            host: HOST_VERSION,
        });
    }

    Ok(())
}
