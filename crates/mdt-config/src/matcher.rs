//! Model name matching for single model override rules
//!
//! Patterns use `regex` search semantics: a pattern matches if it matches
//! anywhere in the model name. Anchors are never added implicitly, so
//! `Noddi` matches `XNoddi2` while `^Noddi$` only matches `Noddi`. There is
//! no case folding unless the pattern asks for it with `(?i)`.

use regex::Regex;

use crate::document::{ConfigNode, Mapping, Scalar};
use crate::error::{Error, Result};
use crate::path::KeyPath;
use crate::schema::FieldSchema;

/// Check a single pattern against a model name.
///
/// Compiles the pattern on every call; hold on to an [`OverrideRule`] when
/// the same pattern is evaluated repeatedly.
///
/// # Example
///
/// ```
/// use mdt_config::matcher::matches;
///
/// assert!(matches("^Noddi$", "Noddi").unwrap());
/// assert!(!matches("^Noddi$", "Noddi2").unwrap());
/// ```
pub fn matches(pattern: &str, name: &str) -> Result<bool> {
    Ok(compile(pattern)?.is_match(name))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// A `single_model` entry: a model name pattern and the settings it applies
#[derive(Debug, Clone)]
pub struct OverrideRule {
    pattern: String,
    regex: Regex,
    config: Mapping,
}

impl OverrideRule {
    /// Compile a rule, failing with [`Error::InvalidPattern`] on a bad regex
    pub fn new(pattern: impl Into<String>, config: Mapping) -> Result<Self> {
        let pattern = pattern.into();
        let regex = compile(&pattern)?;
        Ok(Self {
            pattern,
            regex,
            config,
        })
    }

    /// Parse a `{model_name, config}` entry found at `path`, checking the
    /// config fragment against `fields`
    pub fn from_node(node: &ConfigNode, path: &KeyPath, fields: &FieldSchema) -> Result<Self> {
        let entry = node
            .as_mapping()
            .ok_or_else(|| Error::type_mismatch(path, "mapping", node.kind()))?;

        let pattern_path = path.key("model_name");
        let pattern = match entry.get("model_name") {
            Some(ConfigNode::Scalar(Scalar::String(s))) => s.clone(),
            Some(other) => return Err(Error::type_mismatch(&pattern_path, "string", other.kind())),
            None => return Err(Error::structure(path, "missing 'model_name'")),
        };

        let config_path = path.key("config");
        let config = match entry.get("config") {
            Some(ConfigNode::Mapping(config)) => config.clone(),
            Some(ConfigNode::Scalar(Scalar::Null)) | None => Mapping::new(),
            Some(other) => return Err(Error::type_mismatch(&config_path, "mapping", other.kind())),
        };

        fields.validate(&ConfigNode::Mapping(config.clone()), &config_path)?;
        Self::new(pattern, config)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The settings fragment applied when this rule matches
    pub fn config(&self) -> &Mapping {
        &self.config
    }

    pub fn matches(&self, model_name: &str) -> bool {
        self.regex.is_match(model_name)
    }
}

/// The ordered `single_model` rule list
#[derive(Debug, Clone, Default)]
pub struct OverrideRules {
    rules: Vec<OverrideRule>,
}

impl OverrideRules {
    pub fn new(rules: Vec<OverrideRule>) -> Self {
        Self { rules }
    }

    /// Parse a rule sequence found at `path`. Null means no rules.
    pub fn from_node(node: &ConfigNode, path: &KeyPath, fields: &FieldSchema) -> Result<Self> {
        let items = match node {
            ConfigNode::Sequence(items) => items,
            ConfigNode::Scalar(Scalar::Null) => return Ok(Self::default()),
            other => return Err(Error::type_mismatch(path, "sequence", other.kind())),
        };

        let mut rules = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let rule = OverrideRule::from_node(item, &path.index(index), fields)?;
            if rules.iter().any(|r: &OverrideRule| r.pattern == rule.pattern) {
                tracing::warn!(pattern = %rule.pattern, "Duplicate single model pattern, both rules apply");
            }
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules in declared order
    pub fn iter(&self) -> impl Iterator<Item = &OverrideRule> {
        self.rules.iter()
    }

    /// Rules matching `model_name`, in declared order
    pub fn matching<'a>(&'a self, model_name: &'a str) -> impl Iterator<Item = &'a OverrideRule> {
        self.rules.iter().filter(move |rule| rule.matches(model_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;

    #[test]
    fn search_semantics_without_implicit_anchors() {
        assert!(matches("Noddi", "XNoddi2").unwrap());
        assert!(matches("(.*)-ExVivo", "BallStick-ExVivo").unwrap());
        assert!(!matches("noddi", "Noddi").unwrap());
        assert!(matches("(?i)noddi", "Noddi").unwrap());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = matches("^Ball(Stick", "BallStick").unwrap_err();
        match err {
            Error::InvalidPattern { pattern, .. } => assert_eq!(pattern, "^Ball(Stick"),
            other => panic!("expected invalid pattern, got {other:?}"),
        }
    }

    #[test]
    fn rule_from_node_requires_model_name() {
        let node = ConfigNode::parse("t", "config:\n  extra_optim_runs: 1\n").unwrap();
        let err = OverrideRule::from_node(&node, &parse_path("single_model[0]"), &FieldSchema::optimization()).unwrap_err();
        assert!(err.to_string().contains("model_name"), "got: {err}");
    }

    #[test]
    fn rule_from_node_validates_fragment_types() {
        let node = ConfigNode::parse(
            "t",
            "model_name: '^Noddi$'\nconfig:\n  extra_optim_runs: 'many'\n",
        )
        .unwrap();
        let err = OverrideRule::from_node(&node, &parse_path("single_model[0]"), &FieldSchema::optimization()).unwrap_err();
        match err {
            Error::Type { path, .. } => {
                assert_eq!(path.to_string(), "single_model[0].config.extra_optim_runs")
            }
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn rule_without_config_applies_nothing() {
        let node = ConfigNode::parse("t", "model_name: '^Noddi$'\n").unwrap();
        let rule = OverrideRule::from_node(&node, &KeyPath::root(), &FieldSchema::optimization()).unwrap();
        assert!(rule.config().is_empty());
        assert!(rule.matches("Noddi"));
    }

    #[test]
    fn matching_keeps_declared_order() {
        let rules = OverrideRules::new(vec![
            OverrideRule::new("-ExVivo$", Mapping::new()).unwrap(),
            OverrideRule::new("^BallStick", Mapping::new()).unwrap(),
            OverrideRule::new("^Noddi$", Mapping::new()).unwrap(),
        ]);
        let matched: Vec<&str> = rules
            .matching("BallStickStick-ExVivo")
            .map(|r| r.pattern())
            .collect();
        assert_eq!(matched, vec!["-ExVivo$", "^BallStick"]);
    }
}
