//! Schema tables for merging and validating optimization settings
//!
//! Whether a list accumulates or replaces under a merge cannot be read off
//! the document, so it is declared here per key path. The same goes for the
//! scalar types the optimization driver expects.

use crate::document::{ConfigNode, Scalar};
use crate::error::{Error, Result};
use crate::path::KeyPath;

/// How a sequence present in both merge sources is combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPolicy {
    /// Overlay items are appended after base items
    Accumulate,
    /// Overlay sequence replaces the base sequence
    Replace,
}

/// Per key path list policies, keyed by [`KeyPath::schema_key`]
#[derive(Debug, Clone)]
pub struct MergeSchema {
    lists: Vec<(String, ListPolicy)>,
    default: ListPolicy,
}

impl MergeSchema {
    /// A schema with no declared lists
    pub fn new(default: ListPolicy) -> Self {
        Self {
            lists: Vec::new(),
            default,
        }
    }

    /// Declare the policy for the sequence at `path`
    pub fn with_list(mut self, path: &str, policy: ListPolicy) -> Self {
        self.lists.retain(|(declared, _)| declared != path);
        self.lists.push((path.to_string(), policy));
        self
    }

    /// Policy for the sequence at `path`, falling back to the default
    pub fn list_policy(&self, path: &KeyPath) -> ListPolicy {
        let key = path.schema_key();
        self.lists
            .iter()
            .find(|(declared, _)| *declared == key)
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default)
    }

    pub fn declared(&self) -> impl Iterator<Item = (&str, ListPolicy)> {
        self.lists.iter().map(|(path, policy)| (path.as_str(), *policy))
    }

    /// Schema for merging optimization settings fragments.
    ///
    /// Paths are relative to the settings mapping. `optimizers` and
    /// `smoothing_routines` accumulate, so a model override adds its
    /// optimizer after the general one; `cl_devices` replaces.
    pub fn optimization() -> Self {
        Self::new(ListPolicy::Replace)
            .with_list("optimizers", ListPolicy::Accumulate)
            .with_list("smoothing_routines", ListPolicy::Accumulate)
            .with_list("cl_devices", ListPolicy::Replace)
    }

    /// Schema for layering whole documents (defaults, user file, contexts).
    ///
    /// Single model rules and the model specific rules of the built-in
    /// processing types from later layers are appended, so they apply after,
    /// and on top of, the rules of earlier layers.
    pub fn document() -> Self {
        Self::new(ListPolicy::Replace)
            .with_list("optimization_settings.single_model", ListPolicy::Accumulate)
            .with_list("processing_strategies.optimization.model_specific", ListPolicy::Accumulate)
            .with_list("processing_strategies.sampling.model_specific", ListPolicy::Accumulate)
    }

    /// Schema for merging processing strategy fragments; every list replaces
    pub fn processing_strategy() -> Self {
        Self::new(ListPolicy::Replace)
    }
}

/// Expected kind of a node at a schema path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Bool,
    Int,
    /// Integer from zero up to `u32::MAX`
    Count,
    /// Count or null
    OptionalCount,
    /// Float; integers are accepted and widened
    Float,
    String,
    Mapping,
    Sequence,
}

impl Expected {
    pub fn accepts(&self, node: &ConfigNode) -> bool {
        match (self, node) {
            (Expected::Bool, ConfigNode::Scalar(Scalar::Bool(_))) => true,
            (Expected::Int, ConfigNode::Scalar(Scalar::Int(_))) => true,
            (Expected::Count, ConfigNode::Scalar(Scalar::Int(i))) => is_count(*i),
            (Expected::OptionalCount, ConfigNode::Scalar(Scalar::Null)) => true,
            (Expected::OptionalCount, ConfigNode::Scalar(Scalar::Int(i))) => is_count(*i),
            (Expected::Float, ConfigNode::Scalar(Scalar::Float(_) | Scalar::Int(_))) => true,
            (Expected::String, ConfigNode::Scalar(Scalar::String(_))) => true,
            (Expected::Mapping, ConfigNode::Mapping(_)) => true,
            (Expected::Sequence, ConfigNode::Sequence(_)) => true,
            _ => false,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Expected::Bool => "bool",
            Expected::Int => "int",
            Expected::Count => "non-negative 32-bit int",
            Expected::OptionalCount => "non-negative 32-bit int or null",
            Expected::Float => "float",
            Expected::String => "string",
            Expected::Mapping => "mapping",
            Expected::Sequence => "sequence",
        }
    }
}

fn is_count(value: i64) -> bool {
    u32::try_from(value).is_ok()
}

/// Expected node kinds keyed by [`KeyPath::schema_key`]
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<(String, Expected)>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, path: &str, expected: Expected) -> Self {
        self.fields.push((path.to_string(), expected));
        self
    }

    pub fn expected(&self, path: &KeyPath) -> Option<Expected> {
        let key = path.schema_key();
        self.fields
            .iter()
            .find(|(declared, _)| *declared == key)
            .map(|(_, expected)| *expected)
    }

    /// Fields read by the optimization driver, relative to a settings mapping
    pub fn optimization() -> Self {
        Self::new()
            .with_field("optimizers", Expected::Sequence)
            .with_field("optimizers[]", Expected::Mapping)
            .with_field("optimizers[].name", Expected::String)
            .with_field("optimizers[].patience", Expected::OptionalCount)
            .with_field("load_balancer", Expected::Mapping)
            .with_field("load_balancer.name", Expected::String)
            .with_field("load_balancer.run_in_batches", Expected::Bool)
            .with_field("load_balancer.single_batch_length", Expected::Float)
            .with_field("smoothing_routines", Expected::Sequence)
            .with_field("smoothing_routines[]", Expected::Mapping)
            .with_field("smoothing_routines[].name", Expected::String)
            .with_field("cl_devices", Expected::Sequence)
            .with_field("cl_devices[]", Expected::Count)
            .with_field("enable_grid_search", Expected::Bool)
            .with_field("extra_optim_runs", Expected::Count)
            .with_field("extra_optim_runs_apply_smoothing", Expected::Bool)
            .with_field("extra_optim_runs_use_perturbation", Expected::Bool)
    }

    /// Fields of a `processing_strategies.<type>` section, relative to its
    /// `general` mapping or a rule fragment
    pub fn processing_strategy() -> Self {
        Self::new()
            .with_field("name", Expected::String)
            .with_field("options", Expected::Mapping)
    }

    /// Check every declared field present in `fragment`.
    ///
    /// Undeclared keys pass through unchecked. Errors name the full path,
    /// `base` joined with the path inside the fragment.
    pub fn validate(&self, fragment: &ConfigNode, base: &KeyPath) -> Result<()> {
        self.validate_at(fragment, &KeyPath::root(), base)
    }

    fn validate_at(&self, node: &ConfigNode, relative: &KeyPath, base: &KeyPath) -> Result<()> {
        if !relative.is_root() {
            if let Some(expected) = self.expected(relative) {
                if !expected.accepts(node) {
                    return Err(Error::type_mismatch(
                        &base.join(relative),
                        expected.describe(),
                        node.describe(),
                    ));
                }
            }
        }

        match node {
            ConfigNode::Mapping(mapping) => {
                for (key, child) in mapping.iter() {
                    self.validate_at(child, &relative.key(key), base)?;
                }
            }
            ConfigNode::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.validate_at(item, &relative.index(index), base)?;
                }
            }
            ConfigNode::Scalar(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;

    #[test]
    fn optimization_schema_declares_list_policies() {
        let schema = MergeSchema::optimization();
        assert_eq!(schema.list_policy(&parse_path("optimizers")), ListPolicy::Accumulate);
        assert_eq!(
            schema.list_policy(&parse_path("smoothing_routines")),
            ListPolicy::Accumulate
        );
        assert_eq!(schema.list_policy(&parse_path("cl_devices")), ListPolicy::Replace);
        assert_eq!(schema.list_policy(&parse_path("undeclared")), ListPolicy::Replace);
    }

    #[test]
    fn document_schema_accumulates_rules_only() {
        let schema = MergeSchema::document();
        assert_eq!(
            schema.list_policy(&parse_path("optimization_settings.single_model")),
            ListPolicy::Accumulate
        );
        assert_eq!(
            schema.list_policy(&parse_path("optimization_settings.general.optimizers")),
            ListPolicy::Replace
        );
        assert_eq!(
            schema.list_policy(&parse_path("processing_strategies.sampling.model_specific")),
            ListPolicy::Accumulate
        );
    }

    #[test]
    fn with_list_redeclaration_overrides() {
        let schema = MergeSchema::optimization().with_list("optimizers", ListPolicy::Replace);
        assert_eq!(schema.list_policy(&parse_path("optimizers")), ListPolicy::Replace);
        assert_eq!(schema.declared().count(), 3);
    }

    #[test]
    fn float_field_accepts_int() {
        let fragment = ConfigNode::parse("t", "load_balancer:\n  single_batch_length: 2000000\n").unwrap();
        FieldSchema::optimization()
            .validate(&fragment, &KeyPath::root())
            .unwrap();
    }

    #[test]
    fn float_field_rejects_string() {
        let fragment = ConfigNode::parse("t", "load_balancer:\n  single_batch_length: 'lots'\n").unwrap();
        let err = FieldSchema::optimization()
            .validate(&fragment, &parse_path("optimization_settings.general"))
            .unwrap_err();
        match err {
            Error::Type { path, expected, found } => {
                assert_eq!(
                    path.to_string(),
                    "optimization_settings.general.load_balancer.single_batch_length"
                );
                assert_eq!(expected, "float");
                assert_eq!(found, "string \"lots\"");
            }
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn patience_may_be_null() {
        let fragment =
            ConfigNode::parse("t", "optimizers:\n  - name: Powell\n    patience: null\n").unwrap();
        FieldSchema::optimization()
            .validate(&fragment, &KeyPath::root())
            .unwrap();
    }

    #[test]
    fn negative_device_index_is_rejected() {
        let fragment = ConfigNode::parse("t", "cl_devices: [0, -1]\n").unwrap();
        let err = FieldSchema::optimization()
            .validate(&fragment, &KeyPath::root())
            .unwrap_err();
        assert!(err.to_string().contains("cl_devices[1]"), "got: {err}");
    }

    #[test]
    fn counts_beyond_u32_are_rejected_at_validation() {
        let fragment = ConfigNode::parse(
            "t",
            "optimizers:\n  - name: Powell\n    patience: 5000000000\n",
        )
        .unwrap();
        let err = FieldSchema::optimization()
            .validate(&fragment, &KeyPath::root())
            .unwrap_err();
        match err {
            Error::Type { path, expected, .. } => {
                assert_eq!(path.to_string(), "optimizers[0].patience");
                assert_eq!(expected, "non-negative 32-bit int or null");
            }
            other => panic!("expected type error, got {other:?}"),
        }

        let largest = ConfigNode::parse("t", "extra_optim_runs: 4294967295\n").unwrap();
        FieldSchema::optimization()
            .validate(&largest, &KeyPath::root())
            .unwrap();
    }

    #[test]
    fn processing_strategy_fields() {
        let fragment = ConfigNode::parse("t", "name: VoxelRange\noptions: [1]\n").unwrap();
        let err = FieldSchema::processing_strategy()
            .validate(&fragment, &KeyPath::root())
            .unwrap_err();
        assert!(err.to_string().contains("options"), "got: {err}");
    }

    #[test]
    fn undeclared_keys_pass_through() {
        let fragment = ConfigNode::parse("t", "something_else: [1, 'two']\n").unwrap();
        FieldSchema::optimization()
            .validate(&fragment, &KeyPath::root())
            .unwrap();
    }
}
