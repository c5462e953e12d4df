//! Record-level idempotency
//!
//! Before a record is handed to the loader the runner consults the ledger;
//! after a successful load it marks the record seen. Two keying strategies
//! exist: content digests for unordered collections and a monotonic high-water
//! index for strictly ordered ones.

pub mod ledger;

use crate::error::{AirliftError, Result};
use ledger::DedupeLedger;
use serde_json::Value;
use uuid::Uuid;

pub use ledger::SqliteLedger;

/// Namespace for ledger entries: one migration entity, one relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheScope {
    pub entity_id: Uuid,
    pub relation: String,
}

impl CacheScope {
    pub fn new(entity_id: Uuid, relation: impl Into<String>) -> Self {
        Self {
            entity_id,
            relation: relation.into(),
        }
    }
}

const INDEX_KEY: &str = "max_index";

/// How records within a relation are keyed in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Key each record by the SHA-256 of its serialized form. Order-independent,
    /// so safe for relations whose source ordering can shift between retries.
    Hexdigest,
    /// Track the highest record ordinal loaded so far. Only valid for relations
    /// the source emits in a stable order.
    Index,
}

impl CacheStrategy {
    /// Has this record already been loaded in a previous attempt?
    pub async fn seen(
        &self,
        ledger: &dyn DedupeLedger,
        scope: &CacheScope,
        record: &Value,
        index: u64,
    ) -> Result<bool> {
        match self {
            CacheStrategy::Hexdigest => {
                let key = hexdigest_key(record);
                Ok(ledger.get(scope, &key).await?.is_some())
            }
            CacheStrategy::Index => match ledger.get(scope, INDEX_KEY).await? {
                Some(raw) => {
                    let max: u64 = raw.parse().map_err(|_| {
                        AirliftError::CacheUnavailable(format!(
                            "malformed index entry for {}/{}: {raw}",
                            scope.entity_id, scope.relation
                        ))
                    })?;
                    Ok(index <= max)
                }
                None => Ok(false),
            },
        }
    }

    /// Record a successful load so retries skip this record
    pub async fn mark_seen(
        &self,
        ledger: &dyn DedupeLedger,
        scope: &CacheScope,
        record: &Value,
        index: u64,
    ) -> Result<()> {
        match self {
            CacheStrategy::Hexdigest => {
                let key = hexdigest_key(record);
                ledger.put(scope, &key, "1").await
            }
            CacheStrategy::Index => ledger.put(scope, INDEX_KEY, &index.to_string()).await,
        }
    }
}

/// Content key for a record: SHA-256 over its canonical JSON text.
/// `serde_json` serializes object keys in sorted order, so the digest is
/// stable across re-fetches of the same logical record.
pub fn hexdigest_key(record: &Value) -> String {
    airlift_common::checksum::sha256_hex(record.to_string().as_bytes())
}
