//! # sideload
//!
//! Batched, lazily-evaluated relationship loading for serialization layers.
//!
//! Rendering a tree of related records naively triggers one fetch per record
//! per relationship per nesting level — the N+1 problem. `sideload` declares
//! relationships as *lazy*: nothing is fetched until a caller-supplied
//! inclusion directive requests it, and everything that is requested loads
//! through deduplicating batch loaders, one fetch per distinct key set per
//! evaluation pass.
//!
//! The crate provides:
//! - [`IncludeTree`] — the immutable, tree-shaped inclusion directive
//! - [`RelationshipSpec`] / [`WrapperDef`] / [`WrapperRegistry`] — static
//!   per-entity-type relationship declarations
//! - [`BatchLoader`] / [`FetchSource`] — the batching contract and its
//!   pass-scoped deduplication
//! - [`Engine`] — the evaluation walk that ties the three together
//!
//! ## Inclusion directives
//!
//! Directives are built once per request, from dotted paths or nested JSON:
//!
//! ```rust
//! use sideload::IncludeTree;
//!
//! let include = IncludeTree::parse("comments.author,tags").unwrap();
//! assert!(include.contains("comments"));
//! assert!(include.descend("comments").contains("author"));
//!
//! // Absent means "do not load" — relationships are opt-in.
//! assert!(!include.contains("likes"));
//!
//! // Malformed specifications fail at construction, not during evaluation.
//! assert!(IncludeTree::parse("comments..author").is_err());
//! ```
//!
//! ## Evaluation
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sideload::prelude::*;
//!
//! // Declare wrapper types and their lazy relationships once.
//! let comment_def = WrapperDef::new("CommentWrapper")
//!     .relationship(RelationshipSpec::nested("author", "author_id", users.clone()))
//!     .build();
//! let post_def = WrapperDef::new("PostWrapper")
//!     .relationship(RelationshipSpec::nested("comments", "id", comments.clone()))
//!     .relationship(RelationshipSpec::leaf("tags", "id", tags.clone()))
//!     .build();
//!
//! let mut wrappers = WrapperRegistry::new();
//! wrappers.register("Post", post_def.clone());
//! wrappers.register("Comment", comment_def);
//!
//! // One pass per request; sibling posts batch into a single comments fetch.
//! let engine = Engine::new(wrappers);
//! let include = Arc::new(IncludeTree::parse("comments.author")?);
//! let instances = posts
//!     .into_iter()
//!     .map(|post| WrapperInstance::new(post_def.clone(), post, include.clone()));
//! let evaluation = engine.evaluate_many(instances).await?;
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use sideload::{ErrorKind, IncludeTree, SideloadError};
//!
//! let err = IncludeTree::parse("a..b").unwrap_err();
//! assert_eq!(err.kind, ErrorKind::MalformedDirective);
//! assert_eq!(err.kind.code(), "S1001");
//!
//! let err = SideloadError::load_failed("backend unavailable");
//! assert!(err.is_load_failed());
//! ```

pub mod engine;
pub mod error;
pub mod include;
pub mod loader;
pub mod logging;
pub mod record;
pub mod relationship;
pub mod source;

pub use engine::{
    BranchFailure, Engine, EvaluatedNode, Evaluation, FailureMode, LoadedRelation, WrapperInstance,
};
pub use error::{ErrorKind, SideloadError, SideloadResult};
pub use include::IncludeTree;
pub use loader::{BatchLoader, FetchSource, LoadResolution, LoadState, Scheduling};
pub use record::{JsonRecord, KeyValue, Record, SharedRecord};
pub use relationship::{RelationshipRegistry, RelationshipSpec, WrapperDef, WrapperRegistry};
pub use source::MemorySource;

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::engine::{
        Engine, EvaluatedNode, Evaluation, FailureMode, LoadedRelation, WrapperInstance,
    };
    pub use crate::error::{ErrorKind, SideloadError, SideloadResult};
    pub use crate::include::IncludeTree;
    pub use crate::loader::{BatchLoader, FetchSource, Scheduling};
    pub use crate::record::{JsonRecord, KeyValue, Record, SharedRecord};
    pub use crate::relationship::{
        RelationshipRegistry, RelationshipSpec, WrapperDef, WrapperRegistry,
    };
    pub use crate::source::MemorySource;
}
