//! Deep merge of configuration mappings
//!
//! Merge semantics, applied key by key:
//! - Key only in base or only in overlay: that value is kept
//! - Both scalars: overlay wins
//! - Both mappings: merged recursively
//! - Both sequences: appended or replaced, per the [`MergeSchema`]
//! - Anything else: a [`Error::Conflict`] naming the key path
//!
//! Merging never mutates its inputs; the result is a fresh tree, so
//! resolutions for different models never share nodes.

use crate::document::{ConfigNode, Mapping};
use crate::error::{Error, Result};
use crate::path::KeyPath;
use crate::schema::{ListPolicy, MergeSchema};

/// Merges mappings according to a list policy schema
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine<'a> {
    schema: &'a MergeSchema,
}

impl<'a> MergeEngine<'a> {
    pub fn new(schema: &'a MergeSchema) -> Self {
        Self { schema }
    }

    /// Merge `overlay` on top of `base`, returning a new mapping.
    ///
    /// # Example
    ///
    /// ```
    /// use mdt_config::{ConfigNode, MergeEngine, MergeSchema};
    ///
    /// let base = ConfigNode::parse("base", "optimizers: [{name: Powell}]\ncl_devices: [0]\n").unwrap();
    /// let overlay = ConfigNode::parse("overlay", "optimizers: [{name: NMSimplex}]\ncl_devices: [1]\n").unwrap();
    ///
    /// let schema = MergeSchema::optimization();
    /// let merged = MergeEngine::new(&schema)
    ///     .merge(base.as_mapping().unwrap(), overlay.as_mapping().unwrap())
    ///     .unwrap();
    ///
    /// let merged = ConfigNode::Mapping(merged);
    /// assert_eq!(merged.lookup("optimizers").unwrap().as_sequence().unwrap().len(), 2);
    /// assert_eq!(merged.lookup("cl_devices[0]").unwrap().as_i64(), Some(1));
    /// ```
    pub fn merge(&self, base: &Mapping, overlay: &Mapping) -> Result<Mapping> {
        self.merge_at(base, overlay, &mut KeyPath::root())
    }

    /// Merge like [`merge`](Self::merge), reporting paths below `prefix`.
    ///
    /// Useful when the mappings are fragments of a larger document: the
    /// schema is consulted with paths relative to the fragment, while
    /// conflict errors carry the full document path.
    pub fn merge_under(&self, prefix: &KeyPath, base: &Mapping, overlay: &Mapping) -> Result<Mapping> {
        self.merge_at(base, overlay, &mut KeyPath::root())
            .map_err(|err| match err {
                Error::Conflict {
                    path,
                    base,
                    overlay,
                } => Error::Conflict {
                    path: prefix.join(&path),
                    base,
                    overlay,
                },
                other => other,
            })
    }

    /// Fold a list of layers in order, the last layer having highest precedence
    pub fn merge_layers<'m, I>(&self, layers: I) -> Result<Mapping>
    where
        I: IntoIterator<Item = &'m Mapping>,
    {
        let mut merged = Mapping::new();
        for layer in layers {
            merged = self.merge(&merged, layer)?;
        }
        Ok(merged)
    }

    fn merge_at(&self, base: &Mapping, overlay: &Mapping, path: &mut KeyPath) -> Result<Mapping> {
        let mut merged = base.clone();

        for (key, overlay_value) in overlay.iter() {
            path.push_key(key);
            let value = match base.get(key) {
                Some(base_value) => self.merge_values(base_value, overlay_value, path)?,
                None => overlay_value.clone(),
            };
            path.pop();
            merged.insert(key, value);
        }

        Ok(merged)
    }

    fn merge_values(
        &self,
        base: &ConfigNode,
        overlay: &ConfigNode,
        path: &mut KeyPath,
    ) -> Result<ConfigNode> {
        match (base, overlay) {
            (ConfigNode::Mapping(base_map), ConfigNode::Mapping(overlay_map)) => {
                Ok(ConfigNode::Mapping(self.merge_at(base_map, overlay_map, path)?))
            }
            (ConfigNode::Sequence(base_items), ConfigNode::Sequence(overlay_items)) => {
                match self.schema.list_policy(path) {
                    ListPolicy::Accumulate => {
                        let mut items = Vec::with_capacity(base_items.len() + overlay_items.len());
                        items.extend(base_items.iter().cloned());
                        items.extend(overlay_items.iter().cloned());
                        Ok(ConfigNode::Sequence(items))
                    }
                    ListPolicy::Replace => Ok(overlay.clone()),
                }
            }
            (ConfigNode::Scalar(_), ConfigNode::Scalar(_)) => Ok(overlay.clone()),
            _ => Err(Error::Conflict {
                path: path.clone(),
                base: base.describe(),
                overlay: overlay.describe(),
            }),
        }
    }
}
