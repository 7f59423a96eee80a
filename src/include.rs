//! Inclusion directive trees.
//!
//! An [`IncludeTree`] is the request-scoped specification of which
//! relationships (and nested relationships) to materialize. A name absent
//! from the tree means "do not load this relationship" — lazy relationships
//! are opt-in, never loaded by default.
//!
//! The tree is built once per request and never mutated afterwards;
//! evaluation only narrows it by descending into sub-trees. Because any
//! concrete directive is finite, the tree is also the sole recursion bound:
//! even cyclic relationship declarations terminate once the directive runs
//! out of depth.
//!
//! # Example
//!
//! ```rust
//! use sideload::IncludeTree;
//!
//! let include = IncludeTree::from_paths(["comments.author", "tags"]).unwrap();
//!
//! assert!(include.contains("comments"));
//! assert!(include.contains("tags"));
//! assert!(!include.contains("likes"));
//!
//! let comments = include.descend("comments");
//! assert!(comments.contains("author"));
//! // "author" was requested with no children: descending yields an empty tree.
//! assert!(comments.descend("author").is_empty());
//! ```

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{SideloadError, SideloadResult};

static EMPTY: LazyLock<Arc<IncludeTree>> = LazyLock::new(|| Arc::new(IncludeTree::new()));

/// A normalized inclusion directive: relationship name to sub-directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: IndexMap<SmolStr, Arc<IncludeTree>>,
}

impl IncludeTree {
    /// Create an empty directive (include nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared empty directive.
    pub fn empty() -> Arc<IncludeTree> {
        EMPTY.clone()
    }

    /// Build a directive from dotted relationship paths.
    ///
    /// Each path names one chain of relationships, e.g. `"comments.author"`.
    /// Paths sharing a prefix are merged into one sub-tree. Empty paths and
    /// empty segments are rejected.
    pub fn from_paths<I, S>(paths: I) -> SideloadResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            let path = path.as_ref().trim();
            if path.is_empty() {
                return Err(SideloadError::malformed_directive("empty relationship path"));
            }
            let mut segments = Vec::new();
            for segment in path.split('.') {
                let segment = segment.trim();
                if segment.is_empty() {
                    return Err(SideloadError::malformed_directive(format!(
                        "empty segment in path '{}'",
                        path
                    )));
                }
                segments.push(segment);
            }
            tree.insert_path(&segments);
        }
        Ok(tree)
    }

    /// Build a directive from a comma-separated list of dotted paths, the
    /// form typically carried by a request parameter
    /// (e.g. `"comments.author,tags"`).
    ///
    /// A blank list yields the empty directive.
    pub fn parse(list: &str) -> SideloadResult<Self> {
        if list.trim().is_empty() {
            return Ok(Self::new());
        }
        Self::from_paths(list.split(','))
    }

    /// Build a directive from a nested JSON object, e.g.
    /// `{"comments": {"author": {}}, "tags": {}}`.
    ///
    /// `null` is accepted as an alias for an empty sub-directive. Any other
    /// non-object value is rejected.
    pub fn from_json(value: &serde_json::Value) -> SideloadResult<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::new()),
            serde_json::Value::Object(map) => {
                let mut tree = Self::new();
                for (name, sub) in map {
                    if name.trim().is_empty() {
                        return Err(SideloadError::malformed_directive(
                            "empty relationship name",
                        ));
                    }
                    let child = Self::from_json(sub).map_err(|e| {
                        SideloadError::malformed_directive(format!("under '{}': {}", name, e.message))
                    })?;
                    tree.children.insert(name.as_str().into(), Arc::new(child));
                }
                Ok(tree)
            }
            other => Err(SideloadError::malformed_directive(format!(
                "expected an object of relationship names, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// Check if relationship `name` is requested at this level.
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Get the sub-directive for `name`.
    ///
    /// Returns the shared empty directive when `name` was requested with no
    /// children, or is not requested at all: "load this relationship, but do
    /// not recurse further into it".
    pub fn descend(&self, name: &str) -> Arc<IncludeTree> {
        self.children
            .get(name)
            .cloned()
            .unwrap_or_else(IncludeTree::empty)
    }

    /// Add a relationship with the given sub-directive.
    pub fn with(mut self, name: impl Into<SmolStr>, sub: IncludeTree) -> Self {
        self.children.insert(name.into(), Arc::new(sub));
        self
    }

    /// Merge another directive into this one, unioning sub-trees.
    pub fn merge(mut self, other: IncludeTree) -> Self {
        for (name, sub) in other.children {
            match self.children.get_mut(&name) {
                Some(existing) => {
                    let merged = (**existing).clone().merge((*sub).clone());
                    *existing = Arc::new(merged);
                }
                None => {
                    self.children.insert(name, sub);
                }
            }
        }
        self
    }

    /// The relationship names requested at this level.
    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.children.keys()
    }

    /// Number of relationships requested at this level.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if nothing is requested at this level.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn insert_path(&mut self, segments: &[&str]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        let entry = self
            .children
            .entry((*first).into())
            .or_insert_with(|| Arc::new(IncludeTree::new()));
        Arc::make_mut(entry).insert_path(rest);
    }
}

impl FromStr for IncludeTree {
    type Err = SideloadError;

    fn from_str(s: &str) -> SideloadResult<Self> {
        Self::parse(s)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
