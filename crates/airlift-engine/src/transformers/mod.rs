//! Shared record transformers

use crate::context::PipelineContext;
use crate::error::{AirliftError, Result};
use crate::pipeline::Transformer;
use regex::Regex;
use serde_json::Value;

/// Strips source-private attributes from records before loading.
///
/// Numeric row ids, foreign keys and rendered caches only have meaning inside
/// the source installation; carrying them over would corrupt the destination.
/// Keys are stripped recursively so embedded associations get the same
/// treatment as the top-level record.
pub struct ProhibitedAttributes {
    pattern: Regex,
}

impl ProhibitedAttributes {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"^(id|cached_markdown_version)$|_id$|_html$")
            .map_err(|e| AirliftError::Config(format!("prohibited attribute pattern: {e}")))?;
        Ok(Self { pattern })
    }

    fn strip(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| !self.pattern.is_match(key))
                    .map(|(key, value)| (key, self.strip(value)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.strip(item)).collect())
            }
            other => other,
        }
    }
}

impl Transformer for ProhibitedAttributes {
    fn transform(&self, _ctx: &PipelineContext, record: Value) -> Result<Option<Value>> {
        Ok(Some(self.strip(record)))
    }
}
