//! Layered loading of configuration documents
//!
//! The document handed to a [`ConfigStore`] is built from up to three layers,
//! each merged on top of the previous one:
//!
//! 1. The built-in defaults ([`DEFAULT_CONFIG`])
//! 2. The user document (`<config_dir>/mdt/mdt.conf.yaml`)
//! 3. Documents given explicitly, in the order they were added
//!
//! Layers are merged with [`MergeSchema::document`], so single model rules
//! from later layers are appended after the built-in ones.
//!
//! A section header left with every entry commented out parses as null.
//! Such sections are dropped before merging, so
//!
//! ```yaml
//! optimization_settings:
//!   general:
//!     # extra_optim_runs: 2
//! ```
//!
//! adds nothing instead of conflicting with the built-in `general` mapping.

use std::fs;
use std::path::{Path, PathBuf};

use crate::document::{ConfigNode, Mapping, Scalar};
use crate::error::{Error, Result};
use crate::merge::MergeEngine;
use crate::path::KeyPath;
use crate::schema::MergeSchema;
use crate::store::ConfigStore;

/// The built-in default configuration document
pub const DEFAULT_CONFIG: &str = include_str!("../data/mdt.conf.yaml");

/// File name of a configuration document
pub const CONFIG_FILE_NAME: &str = "mdt.conf.yaml";

/// Sections that read as empty when null
const NULLABLE_SECTIONS: &[&str] = &[
    "optimization_settings",
    "optimization_settings.general",
    "optimization_settings.single_model",
    "batch_fitting",
    "logging",
    "logging.info_dict",
    "processing_strategies",
];

/// Builds the layered configuration document
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    include_defaults: bool,
    skip_user_config: bool,

    /// Override for the user config directory (used for testing).
    /// When `None`, `dirs::config_dir()/mdt` is used.
    user_config_dir_override: Option<PathBuf>,

    files: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader with the built-in defaults and the platform user document
    pub fn new() -> Self {
        Self {
            include_defaults: true,
            skip_user_config: false,
            user_config_dir_override: None,
            files: Vec::new(),
        }
    }

    /// Read the user document from `dir` instead of the platform location
    pub fn with_user_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_config_dir_override = Some(dir.into());
        self
    }

    pub fn without_user_config(mut self) -> Self {
        self.skip_user_config = true;
        self
    }

    pub fn without_defaults(mut self) -> Self {
        self.include_defaults = false;
        self
    }

    /// Add an explicit document, merged after every earlier layer
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    fn user_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.user_config_dir_override {
            return Some(dir.clone());
        }
        dirs::config_dir().map(|d| d.join("mdt"))
    }

    /// Location of the user document, if the platform has a config directory
    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.user_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Merge every layer into a single document.
    ///
    /// A missing user document is skipped. Explicit files must exist.
    pub fn load_document(&self) -> Result<ConfigNode> {
        let mut layers = Vec::new();

        if self.include_defaults {
            tracing::debug!("Loading built-in defaults");
            layers.push(as_root_mapping(ConfigNode::parse("<defaults>", DEFAULT_CONFIG)?)?);
        }

        if !self.skip_user_config {
            match self.user_config_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(?path, "Loading user config");
                    layers.push(read_layer(&path)?);
                }
                Some(path) => tracing::debug!(?path, "No user config found, skipping"),
                None => tracing::debug!("No user config directory on this platform, skipping"),
            }
        }

        for path in &self.files {
            tracing::debug!(?path, "Loading explicit config");
            layers.push(read_layer(path)?);
        }

        let schema = MergeSchema::document();
        let merged = MergeEngine::new(&schema).merge_layers(&layers)?;
        Ok(ConfigNode::Mapping(merged))
    }

    /// Build the layered document and install it in `store`
    pub fn load_into(&self, store: &ConfigStore) -> Result<()> {
        store.load_document(self.load_document()?)
    }
}

fn read_layer(path: &Path) -> Result<Mapping> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    as_root_mapping(ConfigNode::parse(&path.display().to_string(), &content)?)
}

pub(crate) fn as_root_mapping(node: ConfigNode) -> Result<Mapping> {
    match node {
        ConfigNode::Mapping(mapping) => Ok(prune_null_sections(mapping)),
        ConfigNode::Scalar(Scalar::Null) => Ok(Mapping::new()),
        other => Err(Error::type_mismatch(&KeyPath::root(), "mapping", other.kind())),
    }
}

/// Drop the known sections whose value is null, deepest first
fn prune_null_sections(mut layer: Mapping) -> Mapping {
    for section in NULLABLE_SECTIONS.iter().rev() {
        let (container, key) = match section.split_once('.') {
            Some((parent, key)) => (
                layer.get_mut(parent).and_then(ConfigNode::as_mapping_mut),
                key,
            ),
            None => (Some(&mut layer), *section),
        };
        if let Some(container) = container {
            if container.get(key).is_some_and(ConfigNode::is_null) {
                tracing::debug!(section, "Dropping empty section");
                container.remove(key);
            }
        }
    }
    layer
}
