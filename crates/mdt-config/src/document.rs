//! In-memory representation of parsed configuration documents
//!
//! A [`ConfigNode`] is a tree of mappings, sequences and typed scalars.
//! Mapping keys keep their declaration order and sequences keep their item
//! order: both carry meaning for merging, since later keys and items are
//! applied after earlier ones.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_yaml::Value as YamlValue;

use crate::error::{Error, Result};
use crate::path::{KeyPath, PathSegment, parse_path};

/// A typed leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Short name of the scalar type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::String(_) => "string",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// An insertion-ordered mapping with unique string keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, ConfigNode)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigNode> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The value under `key`, inserting a null at the end if it is missing
    pub fn entry_or_null(&mut self, key: &str) -> &mut ConfigNode {
        let position = match self.entries.iter().position(|(k, _)| k == key) {
            Some(position) => position,
            None => {
                self.entries.push((key.to_string(), ConfigNode::null()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    /// Insert a value, keeping the position of an existing key.
    ///
    /// Returns the previous value if the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigNode) -> Option<ConfigNode> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, preserving the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<ConfigNode> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, ConfigNode)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, ConfigNode)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, ConfigNode);
    type IntoIter = std::vec::IntoIter<(String, ConfigNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A node of a configuration document
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Mapping(Mapping),
    Sequence(Vec<ConfigNode>),
    Scalar(Scalar),
}

impl ConfigNode {
    /// Parse YAML text into a configuration tree.
    ///
    /// `source_name` only labels error messages. A document that holds
    /// nothing but whitespace and comments parses as an empty mapping.
    ///
    /// # Example
    ///
    /// ```
    /// use mdt_config::ConfigNode;
    ///
    /// let node = ConfigNode::parse("inline", "load_balancer:\n  run_in_batches: true\n").unwrap();
    /// assert_eq!(node.lookup("load_balancer.run_in_batches").and_then(|n| n.as_bool()), Some(true));
    /// ```
    pub fn parse(source_name: &str, raw_text: &str) -> Result<Self> {
        if is_blank_document(raw_text) {
            return Ok(ConfigNode::Mapping(Mapping::new()));
        }
        let value: YamlValue = serde_yaml::from_str(raw_text).map_err(|e| Error::Syntax {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(value, &KeyPath::root())
    }

    /// Convert a parsed YAML value, reporting problems relative to `path`
    pub fn from_yaml(value: YamlValue, path: &KeyPath) -> Result<Self> {
        let node = match value {
            YamlValue::Null => ConfigNode::Scalar(Scalar::Null),
            YamlValue::Bool(b) => ConfigNode::Scalar(Scalar::Bool(b)),
            YamlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigNode::Scalar(Scalar::Int(i))
                } else if n.is_u64() {
                    return Err(Error::type_mismatch(
                        path,
                        "64-bit signed integer",
                        n.to_string(),
                    ));
                } else {
                    ConfigNode::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            YamlValue::String(s) => ConfigNode::Scalar(Scalar::String(s)),
            YamlValue::Sequence(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    nodes.push(Self::from_yaml(item, &path.index(index))?);
                }
                ConfigNode::Sequence(nodes)
            }
            YamlValue::Mapping(entries) => {
                let mut mapping = Mapping::new();
                for (key, item) in entries {
                    let key = mapping_key(&key, path)?;
                    let child_path = path.key(key.clone());
                    if mapping.contains_key(&key) {
                        return Err(Error::structure(&child_path, "duplicate mapping key"));
                    }
                    let child = Self::from_yaml(item, &child_path)?;
                    mapping.insert(key, child);
                }
                ConfigNode::Mapping(mapping)
            }
            YamlValue::Tagged(tagged) => {
                return Err(Error::type_mismatch(
                    path,
                    "untagged value",
                    format!("tag {}", tagged.tag),
                ));
            }
        };
        Ok(node)
    }

    /// Short name of the node kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigNode::Mapping(_) => "mapping",
            ConfigNode::Sequence(_) => "sequence",
            ConfigNode::Scalar(scalar) => scalar.type_name(),
        }
    }

    pub fn null() -> Self {
        ConfigNode::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigNode::Scalar(Scalar::Null))
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigNode::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            ConfigNode::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigNode::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigNode::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigNode::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of the node; integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigNode::Scalar(Scalar::Float(x)) => Some(*x),
            ConfigNode::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    /// Child of a mapping node
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.as_mapping()?.get(key)
    }

    /// Walk a path from this node. Returns `None` if any segment is missing.
    pub fn get_path(&self, path: &KeyPath) -> Option<&ConfigNode> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), ConfigNode::Mapping(mapping)) => mapping.get(key)?,
                (PathSegment::Index(index), ConfigNode::Sequence(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Replace the node at `path`, creating missing mappings on the way.
    ///
    /// Null intermediates become mappings. Walking through any other scalar,
    /// or keying into a sequence, is a type error at the parent path; an index
    /// past the end of a sequence is a structure error.
    pub fn set_path(&mut self, path: &KeyPath, value: ConfigNode) -> Result<()> {
        let mut current = self;
        let mut walked = KeyPath::root();
        for segment in path.segments() {
            current = match segment {
                PathSegment::Key(key) => {
                    if current.is_null() {
                        *current = ConfigNode::Mapping(Mapping::new());
                    }
                    match current {
                        ConfigNode::Mapping(mapping) => {
                            walked.push_key(key.as_str());
                            mapping.entry_or_null(key)
                        }
                        other => {
                            return Err(Error::type_mismatch(&walked, "mapping", other.kind()));
                        }
                    }
                }
                PathSegment::Index(index) => match current {
                    ConfigNode::Sequence(items) => {
                        let len = items.len();
                        match items.get_mut(*index) {
                            Some(item) => {
                                walked = walked.index(*index);
                                item
                            }
                            None => {
                                return Err(Error::structure(
                                    &walked,
                                    format!("index {index} is out of range for {len} items"),
                                ));
                            }
                        }
                    }
                    other => {
                        return Err(Error::type_mismatch(&walked, "sequence", other.kind()));
                    }
                },
            };
        }
        *current = value;
        Ok(())
    }

    /// Walk a dotted path string, e.g. `optimization_settings.general.cl_devices`
    pub fn lookup(&self, path: &str) -> Option<&ConfigNode> {
        self.get_path(&parse_path(path))
    }

    /// One-line rendering for diagnostics: scalars verbatim, collections summarized
    pub fn summary(&self) -> String {
        match self {
            ConfigNode::Scalar(scalar) => scalar.to_string(),
            ConfigNode::Sequence(items) => format!("sequence of {} item(s)", items.len()),
            ConfigNode::Mapping(mapping) => {
                let keys: Vec<&str> = mapping.keys().collect();
                format!("mapping {{{}}}", keys.join(", "))
            }
        }
    }

    /// Like [`summary`](Self::summary), with scalars prefixed by their type
    pub fn describe(&self) -> String {
        match self {
            ConfigNode::Scalar(scalar) => format!("{} {}", scalar.type_name(), scalar),
            other => other.summary(),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::Value::from(self)
    }
}

impl From<Mapping> for ConfigNode {
    fn from(mapping: Mapping) -> Self {
        ConfigNode::Mapping(mapping)
    }
}

impl From<Vec<ConfigNode>> for ConfigNode {
    fn from(items: Vec<ConfigNode>) -> Self {
        ConfigNode::Sequence(items)
    }
}

impl From<Scalar> for ConfigNode {
    fn from(scalar: Scalar) -> Self {
        ConfigNode::Scalar(scalar)
    }
}

impl From<bool> for ConfigNode {
    fn from(b: bool) -> Self {
        ConfigNode::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for ConfigNode {
    fn from(i: i64) -> Self {
        ConfigNode::Scalar(Scalar::Int(i))
    }
}

impl From<f64> for ConfigNode {
    fn from(x: f64) -> Self {
        ConfigNode::Scalar(Scalar::Float(x))
    }
}

impl From<&str> for ConfigNode {
    fn from(s: &str) -> Self {
        ConfigNode::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<&ConfigNode> for serde_json::Value {
    fn from(node: &ConfigNode) -> Self {
        use serde_json::Value;
        match node {
            ConfigNode::Scalar(Scalar::Null) => Value::Null,
            ConfigNode::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            ConfigNode::Scalar(Scalar::Int(i)) => Value::Number((*i).into()),
            ConfigNode::Scalar(Scalar::Float(x)) => serde_json::Number::from_f64(*x)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ConfigNode::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            ConfigNode::Sequence(items) => Value::Array(items.iter().map(Value::from).collect()),
            ConfigNode::Mapping(mapping) => Value::from(mapping),
        }
    }
}

impl From<&Mapping> for serde_json::Value {
    fn from(mapping: &Mapping) -> Self {
        serde_json::Value::Object(
            mapping
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                .collect(),
        )
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(x) => serializer.serialize_f64(*x),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ConfigNode::Mapping(mapping) => mapping.serialize(serializer),
            ConfigNode::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigNode::Scalar(scalar) => scalar.serialize(serializer),
        }
    }
}

fn mapping_key(key: &YamlValue, path: &KeyPath) -> Result<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Null => Ok("null".to_string()),
        _ => Err(Error::structure(path, "mapping keys must be scalars")),
    }
}

fn is_blank_document(raw_text: &str) -> bool {
    raw_text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_preserves_mapping_order() {
        let node = ConfigNode::parse("test", "zeta: 1\nalpha: 2\nmid: 3\n").unwrap();
        let keys: Vec<&str> = node.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parse_types_scalars() {
        let node = ConfigNode::parse(
            "test",
            "i: 10\nf: 2.0e6\nb: true\ns: Powell\nn: null\n",
        )
        .unwrap();
        assert_eq!(node.get("i"), Some(&ConfigNode::from(10i64)));
        assert_eq!(node.get("f").and_then(|n| n.as_f64()), Some(2.0e6));
        assert_eq!(node.get("b").and_then(|n| n.as_bool()), Some(true));
        assert_eq!(node.get("s").and_then(|n| n.as_str()), Some("Powell"));
        assert!(node.get("n").unwrap().is_null());
    }

    #[test]
    fn blank_document_is_empty_mapping() {
        let node = ConfigNode::parse("test", "# only a comment\n\n").unwrap();
        assert_eq!(node, ConfigNode::Mapping(Mapping::new()));
    }

    #[test]
    fn malformed_yaml_is_syntax_error() {
        let err = ConfigNode::parse("broken.yaml", "a: [1, 2\nb: }").unwrap_err();
        match err {
            Error::Syntax { source_name, .. } => assert_eq!(source_name, "broken.yaml"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn custom_tag_is_type_error() {
        let err = ConfigNode::parse("test", "a: !custom 5\n").unwrap_err();
        match err {
            Error::Type { path, .. } => assert_eq!(path.to_string(), "a"),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn numeric_keys_are_stringified() {
        let node = ConfigNode::parse("test", "1: one\n").unwrap();
        assert_eq!(node.get("1").and_then(|n| n.as_str()), Some("one"));
    }

    #[test]
    fn lookup_walks_keys_and_indices() {
        let node = ConfigNode::parse(
            "test",
            "general:\n  optimizers:\n    - name: Powell\n      patience: 2\n",
        )
        .unwrap();
        assert_eq!(
            node.lookup("general.optimizers[0].patience"),
            Some(&ConfigNode::from(2i64))
        );
        assert_eq!(node.lookup("general.optimizers[1]"), None);
        assert_eq!(node.lookup("general.optimizers.name"), None);
    }

    #[test]
    fn set_path_creates_missing_and_null_mappings() {
        let mut node = ConfigNode::parse("test", "a:\n  keep: 1\nb: ~\n").unwrap();
        node.set_path(&parse_path("a.new.deep"), ConfigNode::from(2i64)).unwrap();
        node.set_path(&parse_path("b.x"), ConfigNode::from("y")).unwrap();

        assert_eq!(node.lookup("a.keep"), Some(&ConfigNode::from(1i64)));
        assert_eq!(node.lookup("a.new.deep"), Some(&ConfigNode::from(2i64)));
        assert_eq!(node.lookup("b.x"), Some(&ConfigNode::from("y")));
        let keys: Vec<&str> = node.get("a").and_then(|n| n.as_mapping()).unwrap().keys().collect();
        assert_eq!(keys, vec!["keep", "new"]);
    }

    #[test]
    fn set_path_replaces_sequence_items() {
        let mut node = ConfigNode::parse("test", "list:\n  - {name: Powell}\n").unwrap();
        node.set_path(&parse_path("list[0].name"), ConfigNode::from("NMSimplex")).unwrap();
        assert_eq!(node.lookup("list[0].name"), Some(&ConfigNode::from("NMSimplex")));

        let err = node.set_path(&parse_path("list[3]"), ConfigNode::null()).unwrap_err();
        match err {
            Error::Structure { path, .. } => assert_eq!(path.to_string(), "list"),
            other => panic!("expected structure error, got {other:?}"),
        }
    }

    #[test]
    fn set_path_through_a_scalar_is_type_error() {
        let mut node = ConfigNode::parse("test", "a:\n  b: 5\n").unwrap();
        let before = node.clone();
        let err = node.set_path(&parse_path("a.b.c"), ConfigNode::from(1i64)).unwrap_err();
        match err {
            Error::Type { path, expected, .. } => {
                assert_eq!(path.to_string(), "a.b");
                assert_eq!(expected, "mapping");
            }
            other => panic!("expected type error, got {other:?}"),
        }
        assert_eq!(node, before);
    }

    #[test]
    fn insert_keeps_position_of_existing_key() {
        let mut mapping = Mapping::new();
        mapping.insert("a", ConfigNode::from(1i64));
        mapping.insert("b", ConfigNode::from(2i64));
        let previous = mapping.insert("a", ConfigNode::from(3i64));
        assert_eq!(previous, Some(ConfigNode::from(1i64)));
        let keys: Vec<&str> = mapping.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(mapping.get("a"), Some(&ConfigNode::from(3i64)));
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let node = ConfigNode::parse("test", "lb:\n  length: 2.0e6\n  batches: true\n").unwrap();
        let json = node.to_json_value();
        assert_eq!(json["lb"]["length"], 2.0e6);
        assert_eq!(json["lb"]["batches"], true);
    }

    #[test]
    fn summary_is_compact() {
        let node = ConfigNode::parse("test", "a: 1\nb: [1, 2]\n").unwrap();
        assert_eq!(node.summary(), "mapping {a, b}");
        assert_eq!(node.get("b").unwrap().summary(), "sequence of 2 item(s)");
        assert_eq!(ConfigNode::from("x").summary(), "\"x\"");
    }
}
