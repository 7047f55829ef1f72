//! Process scoped holder of the loaded configuration document
//!
//! A [`ConfigStore`] is an explicit object, created by the application and
//! passed to whatever needs configuration. Every load builds a complete
//! [`LoadedConfig`] first and only then swaps it in, so readers see either
//! the old document or the new one, never a mix. A failed load leaves the
//! previous state untouched.
//!
//! The store keeps the loaded base document apart from the overlays of open
//! configuration contexts. The snapshot readers see is the base with every
//! open overlay merged on top, in the order the contexts were entered.
//! Closing a context removes its own overlay and rebuilds the snapshot, so
//! contexts may end in any order, and a load or [`set_option`] made while a
//! context is open replaces the base and survives the context.
//!
//! Readers take an `Arc` snapshot and work from it without holding the lock.
//!
//! [`set_option`]: ConfigStore::set_option

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::document::{ConfigNode, Mapping, Scalar};
use crate::error::{Error, Result};
use crate::loader::as_root_mapping;
use crate::merge::MergeEngine;
use crate::path::{KeyPath, parse_path};
use crate::resolver::{ConfigResolver, ResolvedConfig};
use crate::schema::{FieldSchema, MergeSchema};

/// Path of the processing strategy sections inside a document
pub const PROCESSING_STRATEGIES: &str = "processing_strategies";

/// Key of the rule list of a processing strategy section
pub const MODEL_SPECIFIC_KEY: &str = "model_specific";

/// A validated document together with its resolvers
#[derive(Debug)]
pub struct LoadedConfig {
    root: Arc<ConfigNode>,
    resolver: ConfigResolver,
    processing: Vec<(String, ConfigResolver)>,
}

impl LoadedConfig {
    /// Validate a parsed document and build its resolvers.
    ///
    /// A null document is treated as an empty mapping.
    pub fn from_document(root: ConfigNode) -> Result<Self> {
        let root = match root {
            ConfigNode::Scalar(Scalar::Null) => ConfigNode::Mapping(Mapping::new()),
            ConfigNode::Mapping(mapping) => ConfigNode::Mapping(mapping),
            other => return Err(Error::type_mismatch(&KeyPath::root(), "mapping", other.kind())),
        };

        check_kind(&root, "components_location", "string", |n| n.as_str().is_some())?;
        check_kind(&root, "batch_fitting", "mapping", |n| n.as_mapping().is_some())?;
        check_kind(&root, "logging", "mapping", |n| n.as_mapping().is_some())?;
        check_kind(&root, "logging.info_dict", "mapping", |n| n.as_mapping().is_some())?;

        let resolver = ConfigResolver::from_root(&root)?;
        let processing = processing_resolvers(&root)?;
        Ok(Self {
            root: Arc::new(root),
            resolver,
            processing,
        })
    }

    pub fn parse(source_name: &str, raw_text: &str) -> Result<Self> {
        Self::from_document(ConfigNode::parse(source_name, raw_text)?)
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn resolve(&self, model_name: &str) -> Result<ResolvedConfig> {
        self.resolver.resolve(model_name)
    }

    /// Names of the configured processing types, in document order
    pub fn processing_types(&self) -> impl Iterator<Item = &str> {
        self.processing.iter().map(|(name, _)| name.as_str())
    }

    pub fn processing_resolver(&self, processing_type: &str) -> Option<&ConfigResolver> {
        self.processing
            .iter()
            .find(|(name, _)| name == processing_type)
            .map(|(_, resolver)| resolver)
    }

    /// Resolve `processing_strategies.<processing_type>` for a model.
    ///
    /// Use [`ResolvedConfig::processing_strategy`] on the result for the
    /// strategy name and options.
    pub fn resolve_processing_strategy(
        &self,
        processing_type: &str,
        model_name: &str,
    ) -> Result<ResolvedConfig> {
        match self.processing_resolver(processing_type) {
            Some(resolver) => resolver.resolve(model_name),
            None => Err(Error::structure(
                &parse_path(PROCESSING_STRATEGIES).key(processing_type),
                "unknown processing type",
            )),
        }
    }

    /// Read a single option by dotted path, e.g. `batch_fitting.output_subdir`
    pub fn get_option(&self, path: &str) -> Option<&ConfigNode> {
        self.root.lookup(path)
    }

    /// Location of the user components
    pub fn components_location(&self) -> Option<&str> {
        self.root.get("components_location").and_then(|n| n.as_str())
    }

    pub fn batch_fitting(&self) -> Option<&Mapping> {
        self.root.get("batch_fitting").and_then(|n| n.as_mapping())
    }

    /// The `logging.info_dict` mapping, untouched, for the logging backend
    pub fn logging_info_dict(&self) -> Option<&Mapping> {
        self.root.lookup("logging.info_dict").and_then(|n| n.as_mapping())
    }
}

fn check_kind(
    root: &ConfigNode,
    path: &str,
    expected: &str,
    accepts: impl Fn(&ConfigNode) -> bool,
) -> Result<()> {
    match root.lookup(path) {
        Some(node) if !node.is_null() && !accepts(node) => Err(Error::type_mismatch(
            &parse_path(path),
            expected,
            node.kind(),
        )),
        _ => Ok(()),
    }
}

fn processing_resolvers(root: &ConfigNode) -> Result<Vec<(String, ConfigResolver)>> {
    let section = parse_path(PROCESSING_STRATEGIES);
    let strategies = match root.get_path(&section) {
        Some(ConfigNode::Mapping(strategies)) => strategies,
        Some(ConfigNode::Scalar(Scalar::Null)) | None => return Ok(Vec::new()),
        Some(other) => return Err(Error::type_mismatch(&section, "mapping", other.kind())),
    };

    strategies
        .keys()
        .map(|processing_type| {
            let resolver = ConfigResolver::for_section(
                root,
                &section.key(processing_type),
                MODEL_SPECIFIC_KEY,
                MergeSchema::processing_strategy(),
                FieldSchema::processing_strategy(),
            )?;
            Ok((processing_type.to_string(), resolver))
        })
        .collect()
}

#[derive(Debug, Default)]
struct StoreState {
    /// The loaded document, without any context overlay
    base: Option<Arc<LoadedConfig>>,

    /// Overlays of the open contexts, in the order they were entered
    scopes: Vec<(u64, Mapping)>,

    /// `base` with every overlay of `scopes` merged on top
    current: Option<Arc<LoadedConfig>>,

    next_scope: u64,
}

impl StoreState {
    /// Install a new base, keeping the open overlays on top of it.
    ///
    /// Nothing changes if the overlays no longer merge onto the new base.
    fn replace_base(&mut self, base: Arc<LoadedConfig>) -> Result<()> {
        let current = layer_scopes(&base, &self.scopes)?;
        self.base = Some(base);
        self.current = Some(current);
        Ok(())
    }
}

fn layer_scopes(base: &Arc<LoadedConfig>, scopes: &[(u64, Mapping)]) -> Result<Arc<LoadedConfig>> {
    if scopes.is_empty() {
        return Ok(Arc::clone(base));
    }

    let schema = MergeSchema::document();
    let engine = MergeEngine::new(&schema);
    let mut merged = base.root().as_mapping().cloned().unwrap_or_default();
    for (_, overlay) in scopes {
        merged = engine.merge(&merged, overlay)?;
    }
    Ok(Arc::new(LoadedConfig::from_document(ConfigNode::Mapping(merged))?))
}

/// Holds the current configuration snapshot
#[derive(Debug, Default)]
pub struct ConfigStore {
    state: RwLock<StoreState>,
}

impl ConfigStore {
    /// Create an empty store; every query fails with [`Error::NotLoaded`]
    /// until a document is loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, validate and install a document.
    ///
    /// The document replaces the base; contexts that are open stay layered
    /// on top of it until they end.
    ///
    /// # Example
    ///
    /// ```
    /// use mdt_config::ConfigStore;
    ///
    /// let store = ConfigStore::new();
    /// store.load("optimization_settings:\n  general:\n    extra_optim_runs: 2\n").unwrap();
    ///
    /// let resolved = store.resolve("Noddi").unwrap();
    /// assert_eq!(resolved.lookup("extra_optim_runs").and_then(|n| n.as_i64()), Some(2));
    /// ```
    pub fn load(&self, raw_text: &str) -> Result<()> {
        self.load_named("<inline>", raw_text)
    }

    /// Like [`load`](Self::load), labelling errors with `source_name`
    pub fn load_named(&self, source_name: &str, raw_text: &str) -> Result<()> {
        let loaded = LoadedConfig::parse(source_name, raw_text)?;
        self.write_state().replace_base(Arc::new(loaded))?;
        tracing::debug!(source = source_name, "Loaded configuration document");
        Ok(())
    }

    /// Validate and install an already parsed document
    pub fn load_document(&self, root: ConfigNode) -> Result<()> {
        let loaded = LoadedConfig::from_document(root)?;
        self.write_state().replace_base(Arc::new(loaded))
    }

    /// Set a single option of the loaded document by dotted path.
    ///
    /// The edited document is validated like a freshly loaded one and swapped
    /// in whole; if validation fails the store is left unchanged. Missing
    /// mappings along the path are created. The edit applies to the base
    /// document, so it outlives any open context.
    ///
    /// # Example
    ///
    /// ```
    /// use mdt_config::{ConfigNode, ConfigStore};
    ///
    /// let store = ConfigStore::new();
    /// store.load("optimization_settings:\n  general:\n    extra_optim_runs: 0\n").unwrap();
    /// store.set_option("optimization_settings.general.extra_optim_runs", ConfigNode::from(4i64)).unwrap();
    ///
    /// let runs = store.resolve("Noddi").unwrap().lookup("extra_optim_runs").and_then(|n| n.as_i64());
    /// assert_eq!(runs, Some(4));
    /// ```
    pub fn set_option(&self, path: &str, value: ConfigNode) -> Result<()> {
        let key_path = parse_path(path);
        if key_path.is_root() {
            return Err(Error::structure(&key_path, "an option path is required"));
        }

        let mut state = self.write_state();
        let base = state.base.clone().ok_or(Error::NotLoaded)?;
        let mut root = base.root().clone();
        root.set_path(&key_path, value)?;
        let loaded = LoadedConfig::from_document(root)?;
        state.replace_base(Arc::new(loaded))?;
        tracing::debug!(path, "Set configuration option");
        Ok(())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .is_some()
    }

    /// The current snapshot. It stays valid even if the store is reloaded.
    pub fn snapshot(&self) -> Result<Arc<LoadedConfig>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
            .ok_or(Error::NotLoaded)
    }

    pub fn get_root(&self) -> Result<Arc<ConfigNode>> {
        Ok(Arc::clone(&self.snapshot()?.root))
    }

    pub fn resolve(&self, model_name: &str) -> Result<ResolvedConfig> {
        self.snapshot()?.resolve(model_name)
    }

    pub fn resolve_with_cascade(
        &self,
        model_name: &str,
        cascade_hint: Option<&ConfigNode>,
    ) -> Result<ResolvedConfig> {
        self.snapshot()?
            .resolver()
            .resolve_with_cascade(model_name, cascade_hint)
    }

    /// Resolve the processing strategy of `processing_type`, e.g.
    /// `optimization` or `sampling`, for a model
    pub fn resolve_processing_strategy(
        &self,
        processing_type: &str,
        model_name: &str,
    ) -> Result<ResolvedConfig> {
        self.snapshot()?
            .resolve_processing_strategy(processing_type, model_name)
    }

    /// Read a single option of the loaded document by dotted path
    pub fn get_option(&self, path: &str) -> Result<Option<ConfigNode>> {
        Ok(self.snapshot()?.get_option(path).cloned())
    }

    /// Temporarily layer `raw_overlay` on top of the loaded document.
    ///
    /// The overlay uses the same syntax as a configuration file and is merged
    /// the way a user configuration file is. The overlay is removed again
    /// when the returned guard is dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use mdt_config::ConfigStore;
    ///
    /// let store = ConfigStore::new();
    /// store.load("optimization_settings:\n  general:\n    extra_optim_runs: 0\n").unwrap();
    /// {
    ///     let _scope = store.scoped("optimization_settings:\n  general:\n    extra_optim_runs: 3\n").unwrap();
    ///     let runs = store.resolve("Noddi").unwrap().lookup("extra_optim_runs").and_then(|n| n.as_i64());
    ///     assert_eq!(runs, Some(3));
    /// }
    /// let runs = store.resolve("Noddi").unwrap().lookup("extra_optim_runs").and_then(|n| n.as_i64());
    /// assert_eq!(runs, Some(0));
    /// ```
    pub fn scoped(&self, raw_overlay: &str) -> Result<ScopedConfig<'_>> {
        let overlay = ConfigNode::parse("<config context>", raw_overlay)?;
        self.scoped_document(&overlay)
    }

    /// Like [`scoped`](Self::scoped) with an already parsed overlay
    pub fn scoped_document(&self, overlay: &ConfigNode) -> Result<ScopedConfig<'_>> {
        let overlay = as_root_mapping(overlay.clone())?;

        let mut state = self.write_state();
        let base = state.base.clone().ok_or(Error::NotLoaded)?;
        let id = state.next_scope;
        let mut scopes = state.scopes.clone();
        scopes.push((id, overlay));
        let current = layer_scopes(&base, &scopes)?;

        state.next_scope += 1;
        state.scopes = scopes;
        state.current = Some(current);
        tracing::debug!(scope = id, depth = state.scopes.len(), "Entering configuration context");
        Ok(ScopedConfig { store: self, id })
    }

    fn end_scope(&self, id: u64) {
        let mut state = self.write_state();
        let Some(position) = state.scopes.iter().position(|(scope, _)| *scope == id) else {
            return;
        };
        state.scopes.remove(position);
        tracing::debug!(scope = id, depth = state.scopes.len(), "Leaving configuration context");

        let Some(base) = state.base.clone() else {
            return;
        };
        match layer_scopes(&base, &state.scopes) {
            Ok(current) => state.current = Some(current),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "Remaining configuration contexts no longer merge, falling back to the loaded document"
                );
                state.scopes.clear();
                state.current = Some(base);
            }
        }
    }
}

/// Removes its overlay from a [`ConfigStore`] when dropped
#[derive(Debug)]
#[must_use = "the configuration context ends as soon as this guard is dropped"]
pub struct ScopedConfig<'a> {
    store: &'a ConfigStore,
    id: u64,
}

impl Drop for ScopedConfig<'_> {
    fn drop(&mut self) {
        self.store.end_scope(self.id);
    }
}
