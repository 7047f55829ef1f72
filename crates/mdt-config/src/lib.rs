//! Hierarchical configuration for MDT model fitting
//!
//! This crate loads the MDT configuration document and computes the
//! effective optimization settings and processing strategies for a model by
//! name:
//!
//! - **Document model**: an order-preserving tree of mappings, sequences and scalars
//! - **Match engine**: regex search of model names against override rule patterns
//! - **Merge engine**: non-mutating deep merge with per path list policies
//! - **Resolver**: a section's general settings, then its matching rules in
//!   declared order, then an optional cascade hint
//! - **Store**: the loaded document as an atomically swapped snapshot, with
//!   single option edits and scoped overrides
//!
//! # Architecture
//!
//! ```text
//!          ConfigLoader
//!               |
//!          ConfigStore
//!               |
//!        ConfigResolver ---- OptimizationSettings
//!          |         |
//!   MatchEngine   MergeEngine
//!          |         |
//!        DocumentModel
//! ```
//!
//! # Example
//!
//! ```
//! use mdt_config::{ConfigLoader, ConfigStore};
//!
//! let store = ConfigStore::new();
//! ConfigLoader::new().without_user_config().load_into(&store)?;
//!
//! let resolved = store.resolve("Noddi")?;
//! let settings = resolved.optimization_settings()?;
//! assert_eq!(settings.effective_optimizer().map(|o| o.name.as_str()), Some("NMSimplex"));
//! # Ok::<(), mdt_config::Error>(())
//! ```

pub mod document;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod merge;
pub mod path;
pub mod resolver;
pub mod schema;
pub mod settings;
pub mod store;

pub use document::{ConfigNode, Mapping, Scalar};
pub use error::{Error, Result};
pub use loader::{CONFIG_FILE_NAME, ConfigLoader, DEFAULT_CONFIG};
pub use matcher::{OverrideRule, OverrideRules, matches};
pub use merge::MergeEngine;
pub use path::{KeyPath, PathSegment, parse_path};
pub use resolver::{ConfigResolver, ResolvedConfig};
pub use schema::{Expected, FieldSchema, ListPolicy, MergeSchema};
pub use settings::{
    LoadBalancerSettings, OptimizationSettings, OptimizerSpec, ProcessingStrategy, SmoothingRoutine,
};
pub use store::{ConfigStore, LoadedConfig, MODEL_SPECIFIC_KEY, PROCESSING_STRATEGIES, ScopedConfig};
