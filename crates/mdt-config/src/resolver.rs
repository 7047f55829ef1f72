//! Per model resolution of optimization settings and processing strategies
//!
//! The effective configuration for a model is built in layers, each one
//! merged on top of the previous:
//!
//! 1. The section's `general` settings, e.g. `optimization_settings.general`
//! 2. Every rule of the section (`single_model` or `model_specific`) whose
//!    pattern matches the model name, in declared order
//! 3. An optional cascade hint supplied by the caller
//!
//! Later layers take precedence, so a cascade hint beats every rule and a
//! later rule beats an earlier one.

use serde::Serialize;

use crate::document::{ConfigNode, Mapping, Scalar};
use crate::error::{Error, Result};
use crate::matcher::{OverrideRule, OverrideRules};
use crate::merge::MergeEngine;
use crate::path::{KeyPath, PathSegment, parse_path};
use crate::schema::{FieldSchema, MergeSchema};
use crate::settings::{OptimizationSettings, ProcessingStrategy};

/// The effective configuration of one model
///
/// Besides the merged settings, this records which rule patterns
/// contributed, in the order they were applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    model_name: String,
    contributing_patterns: Vec<String>,
    cascade_applied: bool,
    config: Mapping,
}

impl ResolvedConfig {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Patterns of the rules that were merged, in application order
    pub fn contributing_patterns(&self) -> &[String] {
        &self.contributing_patterns
    }

    /// Whether a cascade hint was merged last
    pub fn cascade_applied(&self) -> bool {
        self.cascade_applied
    }

    pub fn config(&self) -> &Mapping {
        &self.config
    }

    pub fn into_config(self) -> Mapping {
        self.config
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.config.get(key)
    }

    /// Walk a dotted path inside the merged settings, e.g. `load_balancer.name`
    pub fn lookup(&self, path: &str) -> Option<&ConfigNode> {
        let path = parse_path(path);
        let (first, rest) = path.segments().split_first()?;
        let PathSegment::Key(key) = first else {
            return None;
        };
        let rest: KeyPath = rest.iter().cloned().collect();
        self.config.get(key)?.get_path(&rest)
    }

    /// Typed view of the settings read by the optimization driver
    pub fn optimization_settings(&self) -> Result<OptimizationSettings> {
        OptimizationSettings::from_mapping(&self.config)
    }

    /// Typed view of a resolved `processing_strategies` section
    pub fn processing_strategy(&self) -> Result<ProcessingStrategy> {
        ProcessingStrategy::from_mapping(&self.config)
    }
}

/// Resolves the effective settings of one document section for model names
///
/// A section is a mapping holding `general` settings and a sequence of
/// model rules. The optimization settings use `single_model` for the rules;
/// processing strategies use `model_specific`.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    section: KeyPath,
    rules_key: String,
    general: Mapping,
    rules: OverrideRules,
    schema: MergeSchema,
    fields: FieldSchema,
}

impl ConfigResolver {
    /// Path of the optimization settings inside a document
    pub const OPTIMIZATION_SECTION: &'static str = "optimization_settings";

    /// Key of the optimization rule list
    pub const SINGLE_MODEL_KEY: &'static str = "single_model";

    /// A resolver for the optimization settings
    pub fn new(general: Mapping, rules: OverrideRules) -> Self {
        Self {
            section: parse_path(Self::OPTIMIZATION_SECTION),
            rules_key: Self::SINGLE_MODEL_KEY.to_string(),
            general,
            rules,
            schema: MergeSchema::optimization(),
            fields: FieldSchema::optimization(),
        }
    }

    /// Build the optimization settings resolver from a whole document.
    ///
    /// Missing `optimization_settings`, `general` or `single_model` sections
    /// are treated as empty. Sections of the wrong shape, fields of the
    /// wrong type and invalid patterns are errors.
    pub fn from_root(root: &ConfigNode) -> Result<Self> {
        Self::for_section(
            root,
            &parse_path(Self::OPTIMIZATION_SECTION),
            Self::SINGLE_MODEL_KEY,
            MergeSchema::optimization(),
            FieldSchema::optimization(),
        )
    }

    /// Build a resolver for the `{general, <rules_key>}` section at `section`.
    ///
    /// `schema` drives merging and `fields` validates the general settings,
    /// every rule fragment and cascade hints.
    pub fn for_section(
        root: &ConfigNode,
        section: &KeyPath,
        rules_key: &str,
        schema: MergeSchema,
        fields: FieldSchema,
    ) -> Result<Self> {
        if root.as_mapping().is_none() {
            return Err(Error::type_mismatch(&KeyPath::root(), "mapping", root.kind()));
        }

        let settings = match root.get_path(section) {
            Some(ConfigNode::Mapping(settings)) => settings.clone(),
            Some(ConfigNode::Scalar(Scalar::Null)) | None => Mapping::new(),
            Some(other) => return Err(Error::type_mismatch(section, "mapping", other.kind())),
        };

        let general_path = section.key("general");
        let general = match settings.get("general") {
            Some(ConfigNode::Mapping(general)) => general.clone(),
            Some(ConfigNode::Scalar(Scalar::Null)) | None => Mapping::new(),
            Some(other) => return Err(Error::type_mismatch(&general_path, "mapping", other.kind())),
        };
        fields.validate(&ConfigNode::Mapping(general.clone()), &general_path)?;

        let rules_path = section.key(rules_key);
        let rules = match settings.get(rules_key) {
            Some(node) => OverrideRules::from_node(node, &rules_path, &fields)?,
            None => OverrideRules::default(),
        };

        tracing::debug!(
            section = %section,
            general_keys = general.len(),
            rules = rules.len(),
            "Built settings resolver"
        );
        Ok(Self {
            section: section.clone(),
            rules_key: rules_key.to_string(),
            general,
            rules,
            schema,
            fields,
        })
    }

    /// Path of the resolved section inside the document
    pub fn section(&self) -> &KeyPath {
        &self.section
    }

    pub fn general(&self) -> &Mapping {
        &self.general
    }

    pub fn rules(&self) -> &OverrideRules {
        &self.rules
    }

    pub fn schema(&self) -> &MergeSchema {
        &self.schema
    }

    /// Rules that apply to `model_name`, in declared order
    pub fn matching_rules<'a>(
        &'a self,
        model_name: &'a str,
    ) -> impl Iterator<Item = &'a OverrideRule> {
        self.rules.matching(model_name)
    }

    /// Resolve the effective settings for `model_name`.
    ///
    /// With no matching rule the result equals the general settings.
    pub fn resolve(&self, model_name: &str) -> Result<ResolvedConfig> {
        self.resolve_with_cascade(model_name, None)
    }

    /// Resolve the effective settings for `model_name`, merging
    /// `cascade_hint` last so it overrides every other layer.
    ///
    /// A null hint counts as no hint.
    pub fn resolve_with_cascade(
        &self,
        model_name: &str,
        cascade_hint: Option<&ConfigNode>,
    ) -> Result<ResolvedConfig> {
        let engine = MergeEngine::new(&self.schema);
        let mut effective = self.general.clone();
        let mut contributing_patterns = Vec::new();

        let rules_path = self.section.key(&self.rules_key);
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.matches(model_name) {
                continue;
            }
            tracing::debug!(model = model_name, pattern = rule.pattern(), "Applying model override");
            let prefix = rules_path.index(index).key("config");
            effective = engine.merge_under(&prefix, &effective, rule.config())?;
            contributing_patterns.push(rule.pattern().to_string());
        }

        let hint = match cascade_hint {
            Some(ConfigNode::Scalar(Scalar::Null)) | None => None,
            Some(ConfigNode::Mapping(hint)) => Some(hint),
            Some(other) => {
                return Err(Error::type_mismatch(
                    &KeyPath::root().key("cascade_hint"),
                    "mapping",
                    other.kind(),
                ));
            }
        };

        let cascade_applied = hint.is_some();
        if let Some(hint) = hint {
            let prefix = KeyPath::root().key("cascade_hint");
            self.fields.validate(&ConfigNode::Mapping(hint.clone()), &prefix)?;
            tracing::debug!(model = model_name, "Applying cascade hint");
            effective = engine.merge_under(&prefix, &effective, hint)?;
        }

        Ok(ResolvedConfig {
            model_name: model_name.to_string(),
            contributing_patterns,
            cascade_applied,
            config: effective,
        })
    }
}
