//! Key paths into configuration documents
//!
//! Paths are written with dot-separated keys and bracketed sequence indices:
//!
//! - Dot-separated keys: `optimization_settings.general.load_balancer`
//! - Sequence indexing: `single_model[0].model_name`
//! - Combined: `general.optimizers[1].patience`
//!
//! # Examples
//!
//! ```
//! use mdt_config::path::{parse_path, PathSegment};
//!
//! let path = parse_path("single_model[0].model_name");
//! assert_eq!(path.segments(), &[
//!     PathSegment::Key("single_model".to_string()),
//!     PathSegment::Index(0),
//!     PathSegment::Key("model_name".to_string()),
//! ]);
//! assert_eq!(path.to_string(), "single_model[0].model_name");
//! ```

use std::fmt;

/// A segment of a path - either a mapping key or a sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A key in a mapping (e.g., "general" in "optimization_settings.general")
    Key(String),
    /// An index in a sequence (e.g., 0 in `optimizers[0]`)
    Index(usize),
}

/// An ordered path from the root of a document to one of its nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<PathSegment>,
}

impl KeyPath {
    /// The empty path, pointing at the document root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Return a new path extended with a mapping key
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push_key(key);
        next
    }

    /// Return a new path extended with a sequence index
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(index));
        next
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// Concatenate another path onto this one
    pub fn join(&self, other: &KeyPath) -> Self {
        let mut next = self.clone();
        next.segments.extend(other.segments.iter().cloned());
        next
    }

    /// Render the path with every index collapsed to `[]`.
    ///
    /// Schema tables are keyed this way so one entry covers every item of a
    /// sequence: `optimizers[3].patience` becomes `optimizers[].patience`.
    pub fn schema_key(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(_) => out.push_str("[]"),
            }
        }
        out
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromIterator<PathSegment> for KeyPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

/// Parse a path string into a [`KeyPath`].
///
/// Empty keys are skipped, so `a..b` and `.a.b` both parse as `a.b`. A
/// bracket whose contents are not an index is dropped.
pub fn parse_path(path: &str) -> KeyPath {
    let mut segments = Vec::new();
    let mut current_key = String::new();
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }
            }
            '[' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }
                let mut index_str = String::new();
                for ch in chars.by_ref() {
                    if ch == ']' {
                        break;
                    }
                    index_str.push(ch);
                }
                if let Ok(index) = index_str.trim().parse::<usize>() {
                    segments.push(PathSegment::Index(index));
                }
            }
            _ => current_key.push(ch),
        }
    }

    if !current_key.is_empty() {
        segments.push(PathSegment::Key(current_key));
    }

    KeyPath { segments }
}
