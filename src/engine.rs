//! Relationship evaluation.
//!
//! The engine walks a wrapper instance's declared relationships, intersects
//! them with the inclusion directive, resolves each requested relationship
//! through a batching loader, and recurses into the resolved records with the
//! directive narrowed one level.
//!
//! The walk is breadth-first: every node of one depth registers its load
//! requests before any loader flushes, so sibling owners and parallel
//! branches sharing a fetch source coalesce into one batch per level.
//! Loaders live for exactly one pass, keyed by fetch-source identity; a
//! source shared by several relationships shares one deduplication scope.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Engine::new(wrappers);
//! let include = IncludeTree::parse("comments.author")?;
//! let instance = WrapperInstance::new(post_wrapper, post, Arc::new(include));
//! let evaluation = engine.evaluate(instance).await?;
//! for comment in evaluation.root().unwrap().nested("comments").unwrap() {
//!     // each comment node carries its resolved author
//! }
//! ```

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::error::{SideloadError, SideloadResult};
use crate::include::IncludeTree;
use crate::loader::{BatchLoader, FetchSource, LoadResolution, Scheduling};
use crate::record::{KeyValue, SharedRecord};
use crate::relationship::{RelationshipSpec, WrapperDef, WrapperRegistry};

/// How the engine reports relationship branches that failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Any failed branch fails the overall evaluation (the default). Sibling
    /// branches still resolve; only the result reporting changes.
    #[default]
    Fail,
    /// Return partial results; failed branches are listed on the
    /// [`Evaluation`] instead of failing it.
    Tolerate,
}

/// One wrapper instance: a record plus the directive applicable at its
/// nesting position.
///
/// The root instance is built by the caller; nested instances are built by
/// the engine, one per resolved record. Instances are request-scoped and do
/// not outlive the pass that created them.
#[derive(Debug, Clone)]
pub struct WrapperInstance {
    def: Arc<WrapperDef>,
    record: Option<SharedRecord>,
    include: Arc<IncludeTree>,
}

impl WrapperInstance {
    /// Wrap a record with the directive applicable at its position.
    pub fn new(def: Arc<WrapperDef>, record: SharedRecord, include: Arc<IncludeTree>) -> Self {
        Self {
            def,
            record: Some(record),
            include,
        }
    }

    /// An instance with no underlying record. Evaluating it is a no-op:
    /// nothing to relate.
    pub fn absent(def: Arc<WrapperDef>, include: Arc<IncludeTree>) -> Self {
        Self {
            def,
            record: None,
            include,
        }
    }

    /// The wrapper definition.
    pub fn def(&self) -> &Arc<WrapperDef> {
        &self.def
    }

    /// The underlying record, if present.
    pub fn record(&self) -> Option<&SharedRecord> {
        self.record.as_ref()
    }

    /// The directive at this instance's position.
    pub fn include(&self) -> &Arc<IncludeTree> {
        &self.include
    }
}

/// One failed relationship branch: which relationship, on which owner, why.
#[derive(Debug, Clone)]
pub struct BranchFailure {
    /// The relationship that failed to load.
    pub relationship: SmolStr,
    /// The owning record's type name.
    pub owner_type: SmolStr,
    /// The owning record's key.
    pub owner_key: KeyValue,
    /// The load failure.
    pub error: Arc<SideloadError>,
}

impl BranchFailure {
    fn describe(&self) -> String {
        format!(
            "{} on {}({}): {}",
            self.relationship, self.owner_type, self.owner_key, self.error
        )
    }
}

/// A resolved relationship on an evaluated node.
#[derive(Debug)]
pub enum LoadedRelation {
    /// Leaf relationship: the resolved records are the final artifact.
    Records(Vec<SharedRecord>),
    /// Nested relationship: one evaluated node per resolved record, in
    /// resolution order.
    Nested(Vec<EvaluatedNode>),
}

/// One wrapper instance with its relationships materialized.
#[derive(Debug)]
pub struct EvaluatedNode {
    record: SharedRecord,
    wrapper: SmolStr,
    relationships: IndexMap<SmolStr, LoadedRelation>,
}

impl EvaluatedNode {
    /// The underlying record.
    pub fn record(&self) -> &SharedRecord {
        &self.record
    }

    /// The name of the wrapper definition this node was built with.
    pub fn wrapper(&self) -> &SmolStr {
        &self.wrapper
    }

    /// All materialized relationships, in declaration order.
    pub fn relationships(&self) -> &IndexMap<SmolStr, LoadedRelation> {
        &self.relationships
    }

    /// A materialized relationship by name. Absent when the relationship was
    /// not requested, not declared, or its branch failed.
    pub fn relationship(&self, name: &str) -> Option<&LoadedRelation> {
        self.relationships.get(name)
    }

    /// The nested nodes of a relationship, if it resolved as nested.
    pub fn nested(&self, name: &str) -> Option<&[EvaluatedNode]> {
        match self.relationships.get(name) {
            Some(LoadedRelation::Nested(nodes)) => Some(nodes),
            _ => None,
        }
    }

    /// The records of a relationship, if it resolved as a leaf.
    pub fn records(&self, name: &str) -> Option<&[SharedRecord]> {
        match self.relationships.get(name) {
            Some(LoadedRelation::Records(records)) => Some(records),
            _ => None,
        }
    }
}

/// The outcome of one evaluation pass.
#[derive(Debug)]
pub struct Evaluation {
    roots: Vec<EvaluatedNode>,
    failures: Vec<BranchFailure>,
}

impl Evaluation {
    /// The evaluated root nodes, one per present root instance.
    pub fn roots(&self) -> &[EvaluatedNode] {
        &self.roots
    }

    /// The first root node, for single-instance passes.
    pub fn root(&self) -> Option<&EvaluatedNode> {
        self.roots.first()
    }

    /// The failed branches of this pass (empty unless
    /// [`FailureMode::Tolerate`] is active).
    pub fn failures(&self) -> &[BranchFailure] {
        &self.failures
    }

    /// Consume the evaluation, yielding the root nodes.
    pub fn into_roots(self) -> Vec<EvaluatedNode> {
        self.roots
    }
}

/// Internal node storage during a pass. Children are linked by arena index
/// until finalization so levels can be processed without borrowing into the
/// result tree.
struct NodeSlot {
    record: SharedRecord,
    wrapper: Arc<WrapperDef>,
    include: Arc<IncludeTree>,
    leaves: IndexMap<SmolStr, Vec<SharedRecord>>,
    children: IndexMap<SmolStr, Vec<usize>>,
}

struct ResolvedLoad {
    node: usize,
    spec: RelationshipSpec,
    resolution: LoadResolution,
}

/// Per-pass loader table, keyed by fetch-source identity.
struct Pass {
    scheduling: Scheduling,
    loaders: IndexMap<usize, Arc<BatchLoader>>,
}

impl Pass {
    fn new(scheduling: Scheduling) -> Self {
        Self {
            scheduling,
            loaders: IndexMap::new(),
        }
    }

    fn loader_for(&mut self, source: &Arc<dyn FetchSource>) -> Arc<BatchLoader> {
        let identity = Arc::as_ptr(source) as *const () as usize;
        self.loaders
            .entry(identity)
            .or_insert_with(|| Arc::new(BatchLoader::new(source.clone(), self.scheduling)))
            .clone()
    }

    async fn flush_all(&self) {
        join_all(self.loaders.values().map(|loader| loader.flush())).await;
    }
}

/// The relationship evaluation engine.
#[derive(Debug, Clone)]
pub struct Engine {
    wrappers: Arc<WrapperRegistry>,
    scheduling: Scheduling,
    failure_mode: FailureMode,
}

impl Engine {
    /// Create an engine over the given wrapper registry.
    pub fn new(wrappers: WrapperRegistry) -> Self {
        Self {
            wrappers: Arc::new(wrappers),
            scheduling: Scheduling::default(),
            failure_mode: FailureMode::default(),
        }
    }

    /// Set the loader scheduling shape.
    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Set how failed branches are reported.
    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// The wrapper registry.
    pub fn wrappers(&self) -> &WrapperRegistry {
        &self.wrappers
    }

    /// Evaluate a single root instance.
    pub async fn evaluate(&self, instance: WrapperInstance) -> SideloadResult<Evaluation> {
        self.evaluate_many([instance]).await
    }

    /// Evaluate several root instances in one pass.
    ///
    /// All roots share the pass's loaders, so sibling top-level records
    /// requesting the same relationship batch into a single fetch.
    pub async fn evaluate_many(
        &self,
        instances: impl IntoIterator<Item = WrapperInstance>,
    ) -> SideloadResult<Evaluation> {
        let mut arena: Vec<Option<NodeSlot>> = Vec::new();
        let mut level: Vec<usize> = Vec::new();

        for instance in instances {
            let Some(record) = instance.record else {
                continue;
            };
            arena.push(Some(NodeSlot {
                record,
                wrapper: instance.def,
                include: instance.include,
                leaves: IndexMap::new(),
                children: IndexMap::new(),
            }));
            level.push(arena.len() - 1);
        }
        let root_count = level.len();
        debug!(roots = root_count, "starting evaluation pass");

        let mut pass = Pass::new(self.scheduling);
        let queue: Arc<Mutex<Vec<ResolvedLoad>>> = Arc::new(Mutex::new(Vec::new()));
        let mut failures: Vec<BranchFailure> = Vec::new();
        let mut depth = 0usize;

        while !level.is_empty() {
            trace!(depth, nodes = level.len(), "evaluating level");

            for &idx in &level {
                let slot = arena[idx].as_ref().expect("level node present");
                if slot.wrapper.relationships().is_empty() || slot.include.is_empty() {
                    continue;
                }
                let specs: Vec<RelationshipSpec> = slot
                    .wrapper
                    .relationships()
                    .iter()
                    .filter(|spec| slot.include.contains(spec.name()))
                    .cloned()
                    .collect();
                let key_of = |field: &str| {
                    arena[idx]
                        .as_ref()
                        .expect("level node present")
                        .record
                        .field(field)
                        .unwrap_or(KeyValue::Null)
                };
                for spec in specs {
                    let key = key_of(spec.key_field());
                    let loader = pass.loader_for(spec.source());
                    let queue = queue.clone();
                    loader
                        .load(key, move |resolution| {
                            queue.lock().push(ResolvedLoad {
                                node: idx,
                                spec,
                                resolution,
                            });
                        })
                        .await;
                }
            }

            pass.flush_all().await;

            let resolved = std::mem::take(&mut *queue.lock());
            let mut next_level: Vec<usize> = Vec::new();
            for load in resolved {
                self.distribute(load, &mut arena, &mut next_level, &mut failures);
            }

            level = next_level;
            depth += 1;
        }

        debug!(
            roots = root_count,
            nodes = arena.len(),
            failures = failures.len(),
            depth,
            "evaluation pass complete"
        );

        if self.failure_mode == FailureMode::Fail {
            if let Some(first) = failures.first() {
                return Err(SideloadError::branches_failed(failures.len(), first.describe())
                    .with_relationship(first.relationship.clone())
                    .with_owner(first.owner_type.clone(), first.owner_key.clone()));
            }
        }

        let roots = (0..root_count)
            .map(|idx| finalize(&mut arena, idx))
            .collect();
        Ok(Evaluation { roots, failures })
    }

    /// Attach one resolved load to its owning node: record leaf results,
    /// wrap nested records, or record the branch failure.
    fn distribute(
        &self,
        load: ResolvedLoad,
        arena: &mut Vec<Option<NodeSlot>>,
        next_level: &mut Vec<usize>,
        failures: &mut Vec<BranchFailure>,
    ) {
        let (owner_type, owner_key, sub) = {
            let owner = arena[load.node].as_ref().expect("owner node present");
            (
                SmolStr::new(owner.record.type_name()),
                owner.record.id(),
                owner.include.descend(load.spec.name()),
            )
        };

        let records = match load.resolution {
            Ok(records) => records,
            Err(error) => {
                failures.push(BranchFailure {
                    relationship: load.spec.name().clone(),
                    owner_type,
                    owner_key,
                    error,
                });
                return;
            }
        };

        if !load.spec.is_nested() {
            let owner = arena[load.node].as_mut().expect("owner node present");
            owner.leaves.insert(load.spec.name().clone(), records);
            return;
        }

        let mut kids = Vec::with_capacity(records.len());
        for record in records {
            match self.resolve_wrapper(&load.spec, &record) {
                Ok(def) => {
                    arena.push(Some(NodeSlot {
                        record,
                        wrapper: def,
                        include: sub.clone(),
                        leaves: IndexMap::new(),
                        children: IndexMap::new(),
                    }));
                    kids.push(arena.len() - 1);
                }
                Err(error) => {
                    failures.push(BranchFailure {
                        relationship: load.spec.name().clone(),
                        owner_type,
                        owner_key,
                        error: Arc::new(error),
                    });
                    // The branch aborts: wrappers already built for it are
                    // discarded, sibling relationships are unaffected.
                    return;
                }
            }
        }
        next_level.extend(kids.iter().copied());
        let owner = arena[load.node].as_mut().expect("owner node present");
        owner.children.insert(load.spec.name().clone(), kids);
    }

    /// Resolve the wrapper definition for a nested record: explicit
    /// per-relationship override first, then the record-type registry, then
    /// the registry default.
    fn resolve_wrapper(
        &self,
        spec: &RelationshipSpec,
        record: &SharedRecord,
    ) -> SideloadResult<Arc<WrapperDef>> {
        if let Some(name) = spec.wrapper() {
            return self.wrappers.by_name(name).ok_or_else(|| {
                SideloadError::internal(format!(
                    "relationship '{}' names unknown wrapper '{}'",
                    spec.name(),
                    name
                ))
                .with_relationship(spec.name().clone())
            });
        }
        self.wrappers
            .for_record_type(record.type_name())
            .ok_or_else(|| {
                SideloadError::unresolved_wrapper(record.type_name())
                    .with_relationship(spec.name().clone())
            })
    }
}

/// Move a finished node out of the arena, recursing through its children in
/// declaration order.
fn finalize(arena: &mut Vec<Option<NodeSlot>>, idx: usize) -> EvaluatedNode {
    let slot = arena[idx].take().expect("node finalized once");
    let order: Vec<SmolStr> = slot
        .wrapper
        .relationships()
        .iter()
        .map(|spec| spec.name().clone())
        .collect();

    let mut leaves = slot.leaves;
    let mut children = slot.children;
    let mut relationships = IndexMap::new();
    for name in order {
        if let Some(records) = leaves.shift_remove(&name) {
            relationships.insert(name, LoadedRelation::Records(records));
        } else if let Some(kids) = children.shift_remove(&name) {
            let nodes = kids.into_iter().map(|kid| finalize(arena, kid)).collect();
            relationships.insert(name, LoadedRelation::Nested(nodes));
        }
    }

    EvaluatedNode {
        record: slot.record,
        wrapper: slot.wrapper.name().clone(),
        relationships,
    }
}
