//! In-memory fetch source.
//!
//! [`MemorySource`] resolves batch requests against a fixed record
//! collection by matching one field per record against the requested keys.
//! It serves as the reference implementation of the batching contract and as
//! the test double behind the integration tests: it records every
//! `fetch_batch` call so batching behavior can be asserted.
//!
//! Both canonical relationship shapes reduce to one matching rule:
//! - belongs-to: records are matched on their own `id` (the requested key is
//!   the owner's foreign key value);
//! - has-many: records are matched on their foreign key field (the requested
//!   key is the owner's own id).

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::trace;

use crate::error::SideloadResult;
use crate::loader::FetchSource;
use crate::record::{KeyValue, SharedRecord};

/// A fetch source over an in-memory record collection.
#[derive(Debug)]
pub struct MemorySource {
    name: SmolStr,
    match_field: SmolStr,
    records: Vec<SharedRecord>,
    calls: Mutex<Vec<Vec<KeyValue>>>,
}

impl MemorySource {
    /// Create a source matching `match_field` on each record against the
    /// requested keys.
    pub fn new(
        name: impl Into<SmolStr>,
        match_field: impl Into<SmolStr>,
        records: Vec<SharedRecord>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            match_field: match_field.into(),
            records,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Create a source matching records by their own `id` field
    /// (the belongs-to shape).
    pub fn keyed_by_id(name: impl Into<SmolStr>, records: Vec<SharedRecord>) -> Arc<Self> {
        Self::new(name, "id", records)
    }

    /// Number of `fetch_batch` calls made against this source.
    pub fn fetch_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// The key batches observed, in call order.
    pub fn batches(&self) -> Vec<Vec<KeyValue>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FetchSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(
        &self,
        keys: &[KeyValue],
    ) -> SideloadResult<IndexMap<KeyValue, Vec<SharedRecord>>> {
        self.calls.lock().push(keys.to_vec());
        trace!(source = %self.name, keys = keys.len(), "in-memory batch fetch");

        let mut out: IndexMap<KeyValue, Vec<SharedRecord>> = IndexMap::new();
        for key in keys {
            for record in &self.records {
                if record.field(&self.match_field).as_ref() == Some(key) {
                    out.entry(key.clone()).or_default().push(record.clone());
                }
            }
        }
        Ok(out)
    }
}
