//! Relationship and wrapper declarations.
//!
//! A [`WrapperDef`] is the static declaration of one serialized entity type:
//! its name plus the relationships it can lazily resolve. Declarations are
//! built once, shared via `Arc`, and looked up by name — never recreated per
//! request.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::loader::FetchSource;

/// Declaration of one lazy relationship on a wrapper type.
///
/// The `key_field` names the field on the owning record whose value keys the
/// batch request: the foreign key for a belongs-to shape, the owner's own
/// primary key for a has-many shape. The fetch source is shared across every
/// owner in a pass, which is what makes cross-owner batching possible.
#[derive(Debug, Clone)]
pub struct RelationshipSpec {
    name: SmolStr,
    key_field: SmolStr,
    source: Arc<dyn FetchSource>,
    nested: bool,
    wrapper: Option<SmolStr>,
}

impl RelationshipSpec {
    /// Declare a relationship whose resolved records are themselves wrapped
    /// and recursed into.
    pub fn nested(
        name: impl Into<SmolStr>,
        key_field: impl Into<SmolStr>,
        source: Arc<dyn FetchSource>,
    ) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            source,
            nested: true,
            wrapper: None,
        }
    }

    /// Declare a leaf relationship: resolved records are the final artifact,
    /// never re-wrapped or recursed into.
    pub fn leaf(
        name: impl Into<SmolStr>,
        key_field: impl Into<SmolStr>,
        source: Arc<dyn FetchSource>,
    ) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            source,
            nested: false,
            wrapper: None,
        }
    }

    /// Force resolved records to be wrapped with a specific wrapper
    /// definition, bypassing per-record type resolution.
    pub fn with_wrapper(mut self, wrapper: impl Into<SmolStr>) -> Self {
        self.wrapper = Some(wrapper.into());
        self
    }

    /// The relationship name, the key into the inclusion directive.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The owning record's field whose value keys the batch request.
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// The fetch source behind this relationship.
    pub fn source(&self) -> &Arc<dyn FetchSource> {
        &self.source
    }

    /// Whether resolved records are wrapped and recursed into.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// The explicit wrapper override, if declared.
    pub fn wrapper(&self) -> Option<&SmolStr> {
        self.wrapper.as_ref()
    }
}

/// Ordered registry of relationship declarations for one wrapper type.
///
/// Iteration follows insertion order, but evaluation is driven by directive
/// intersection — declaration order carries no semantics.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    relationships: IndexMap<SmolStr, RelationshipSpec>,
}

impl RelationshipRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relationship. A later declaration with the same name
    /// replaces the earlier one.
    pub fn register(&mut self, spec: RelationshipSpec) {
        self.relationships.insert(spec.name.clone(), spec);
    }

    /// Get a relationship by name.
    pub fn get(&self, name: &str) -> Option<&RelationshipSpec> {
        self.relationships.get(name)
    }

    /// All declared relationships, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationshipSpec> {
        self.relationships.values()
    }

    /// Number of declared relationships.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    /// Check if no relationships are declared.
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// The static declaration of a serialized entity type.
#[derive(Debug, Clone)]
pub struct WrapperDef {
    name: SmolStr,
    relationships: RelationshipRegistry,
}

impl WrapperDef {
    /// Create a wrapper definition with no relationships.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            relationships: RelationshipRegistry::new(),
        }
    }

    /// Declare a relationship on this wrapper type.
    pub fn relationship(mut self, spec: RelationshipSpec) -> Self {
        self.relationships.register(spec);
        self
    }

    /// Finish the declaration as a shared definition.
    pub fn build(self) -> Arc<WrapperDef> {
        Arc::new(self)
    }

    /// The wrapper type's name.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The declared relationships.
    pub fn relationships(&self) -> &RelationshipRegistry {
        &self.relationships
    }
}

/// Registry resolving wrapper definitions, by record type and by name.
///
/// Nested records resolve their wrapper through an explicit per-relationship
/// override first, then through the record-type mapping here, then through
/// the registry's explicit default. There is no implicit inspection beyond
/// the record's own `type_name()`.
#[derive(Debug, Clone, Default)]
pub struct WrapperRegistry {
    by_type: IndexMap<SmolStr, Arc<WrapperDef>>,
    by_name: IndexMap<SmolStr, Arc<WrapperDef>>,
    default: Option<Arc<WrapperDef>>,
}

impl WrapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper definition for a record type.
    pub fn register(&mut self, record_type: impl Into<SmolStr>, def: Arc<WrapperDef>) {
        self.by_name.insert(def.name.clone(), def.clone());
        self.by_type.insert(record_type.into(), def);
    }

    /// Register a wrapper definition reachable only by name (through a
    /// per-relationship override), without a record-type mapping.
    pub fn add(&mut self, def: Arc<WrapperDef>) {
        self.by_name.insert(def.name.clone(), def);
    }

    /// Set the fallback definition used when a record type has no mapping.
    pub fn set_default(&mut self, def: Arc<WrapperDef>) {
        self.by_name.insert(def.name.clone(), def.clone());
        self.default = Some(def);
    }

    /// Resolve the wrapper definition for a record type, falling back to the
    /// explicit default if one is set.
    pub fn for_record_type(&self, record_type: &str) -> Option<Arc<WrapperDef>> {
        self.by_type
            .get(record_type)
            .cloned()
            .or_else(|| self.default.clone())
    }

    /// Get a wrapper definition by its own name.
    pub fn by_name(&self, name: &str) -> Option<Arc<WrapperDef>> {
        self.by_name.get(name).cloned()
    }
}

impl fmt::Display for WrapperDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn stub_source() -> Arc<dyn FetchSource> {
        MemorySource::new("stub", "id", Vec::new())
    }

    #[test]
    fn test_relationship_spec_constructors() {
        let nested = RelationshipSpec::nested("comments", "id", stub_source());
        assert_eq!(nested.name(), "comments");
        assert_eq!(nested.key_field(), "id");
        assert!(nested.is_nested());
        assert!(nested.wrapper().is_none());

        let leaf = RelationshipSpec::leaf("tags", "id", stub_source());
        assert!(!leaf.is_nested());
    }

    #[test]
    fn test_relationship_spec_wrapper_override() {
        let spec = RelationshipSpec::nested("author", "author_id", stub_source())
            .with_wrapper("UserWrapper");
        assert_eq!(spec.wrapper().map(SmolStr::as_str), Some("UserWrapper"));
    }

    #[test]
    fn test_relationship_registry_order_and_lookup() {
        let mut registry = RelationshipRegistry::new();
        registry.register(RelationshipSpec::nested("comments", "id", stub_source()));
        registry.register(RelationshipSpec::leaf("tags", "id", stub_source()));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("comments").is_some());
        assert!(registry.get("missing").is_none());

        let names: Vec<_> = registry.iter().map(|s| s.name().as_str()).collect();
        assert_eq!(names, vec!["comments", "tags"]);
    }

    #[test]
    fn test_wrapper_def_builder() {
        let def = WrapperDef::new("PostWrapper")
            .relationship(RelationshipSpec::nested("comments", "id", stub_source()))
            .build();

        assert_eq!(def.name(), "PostWrapper");
        assert_eq!(def.relationships().len(), 1);
    }

    #[test]
    fn test_wrapper_registry_resolution() {
        let post = WrapperDef::new("PostWrapper").build();
        let fallback = WrapperDef::new("RecordWrapper").build();

        let mut registry = WrapperRegistry::new();
        registry.register("Post", post.clone());

        assert_eq!(
            registry.for_record_type("Post").unwrap().name(),
            "PostWrapper"
        );
        assert!(registry.for_record_type("Video").is_none());

        registry.set_default(fallback);
        assert_eq!(
            registry.for_record_type("Video").unwrap().name(),
            "RecordWrapper"
        );
    }

    #[test]
    fn test_wrapper_registry_by_name() {
        let user = WrapperDef::new("UserWrapper").build();
        let mut registry = WrapperRegistry::new();
        registry.add(user);

        assert!(registry.by_name("UserWrapper").is_some());
        assert!(registry.for_record_type("User").is_none());
    }
}
