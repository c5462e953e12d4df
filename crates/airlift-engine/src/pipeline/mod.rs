//! Pipeline building blocks
//!
//! A pipeline is described by a [`PipelineDescriptor`] value: one extractor,
//! an ordered transformer chain, one loader, and the policies that govern the
//! run. The descriptor owns stage handles but no state; all run state lives in
//! the tracker row and the dedupe ledger, which is what makes retries safe.

pub mod registry;
pub mod runner;

pub use registry::PipelineRegistry;
pub use runner::PipelineRunner;

use crate::cache::CacheStrategy;
use crate::context::PipelineContext;
use crate::entity::TrackerStatus;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Records yielded by one extraction step, plus the cursor for the next one
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

impl ExtractedData {
    /// A single, final batch of records
    pub fn batch(records: Vec<Value>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    pub fn with_cursor(records: Vec<Value>, next_cursor: Option<String>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Pulls one batch of raw records from the source
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        ctx: &PipelineContext,
        cursor: Option<&str>,
    ) -> Result<ExtractedData>;
}

/// Reshapes a single record; `None` drops it from the run
pub trait Transformer: Send + Sync {
    fn transform(&self, ctx: &PipelineContext, record: Value) -> Result<Option<Value>>;
}

/// Writes a single record into the destination
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, ctx: &PipelineContext, record: &Value) -> Result<()>;
}

/// Adapter for closure transformers
pub struct FnTransformer<F>(F);

impl<F> FnTransformer<F>
where
    F: Fn(&PipelineContext, Value) -> Result<Option<Value>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&PipelineContext, Value) -> Result<Option<Value>> + Send + Sync,
{
    fn transform(&self, ctx: &PipelineContext, record: Value) -> Result<Option<Value>> {
        (self.0)(ctx, record)
    }
}

/// Counters accumulated over one tracker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub pages: u64,
    pub extracted: u64,
    pub dropped: u64,
    pub cached_hits: u64,
    pub loaded: u64,
    pub failed_records: u64,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.pages += other.pages;
        self.extracted += other.extracted;
        self.dropped += other.dropped;
        self.cached_hits += other.cached_hits;
        self.loaded += other.loaded;
        self.failed_records += other.failed_records;
    }
}

/// Outcome of one tracker run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub relation: String,
    pub status: TrackerStatus,
    pub error: Option<String>,
    pub stats: RunStats,
}

impl RunResult {
    pub fn is_failed(&self) -> bool {
        self.status == TrackerStatus::Failed
    }
}

/// Immutable description of one relation's pipeline
#[derive(Clone)]
pub struct PipelineDescriptor {
    pub relation: String,
    pub extractor: Arc<dyn Extractor>,
    pub transformers: Vec<Arc<dyn Transformer>>,
    pub loader: Arc<dyn Loader>,
    pub cache_strategy: CacheStrategy,
    /// When false, a record-level load failure is logged and counted instead
    /// of failing the tracker
    pub abort_on_failure: bool,
}

impl std::fmt::Debug for PipelineDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDescriptor")
            .field("relation", &self.relation)
            .field("cache_strategy", &self.cache_strategy)
            .field("abort_on_failure", &self.abort_on_failure)
            .finish_non_exhaustive()
    }
}

impl PipelineDescriptor {
    pub fn new(
        relation: impl Into<String>,
        extractor: Arc<dyn Extractor>,
        loader: Arc<dyn Loader>,
    ) -> Self {
        Self {
            relation: relation.into(),
            extractor,
            transformers: Vec::new(),
            loader,
            cache_strategy: CacheStrategy::Hexdigest,
            abort_on_failure: false,
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }

    /// Run the transformer chain over one record. Transformers execute in
    /// order; the first to return `None` drops the record and the chain
    /// short-circuits.
    pub fn run_transformers(
        &self,
        ctx: &PipelineContext,
        record: Value,
    ) -> Result<Option<Value>> {
        let mut current = record;
        for transformer in &self.transformers {
            match transformer.transform(ctx, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}
