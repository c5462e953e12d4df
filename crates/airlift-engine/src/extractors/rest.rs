//! Paged REST extraction

use crate::context::PipelineContext;
use crate::error::Result;
use crate::extractors::entity_api_path;
use crate::pipeline::{ExtractedData, Extractor};
use async_trait::async_trait;
use tracing::debug;

/// Pulls one page per call from a collection endpoint under the entity's API
/// path; the page's cursor drives the runner's paging loop.
pub struct RestExtractor {
    endpoint: String,
}

impl RestExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Extractor for RestExtractor {
    async fn extract(
        &self,
        ctx: &PipelineContext,
        cursor: Option<&str>,
    ) -> Result<ExtractedData> {
        let path = format!("{}/{}", entity_api_path(&ctx.entity), self.endpoint);
        let page = ctx.client.fetch_page(&path, cursor).await?;
        debug!(
            relation = %ctx.relation,
            records = page.records.len(),
            has_next = page.next_cursor.is_some(),
            "Extracted page"
        );
        Ok(ExtractedData::with_cursor(page.records, page.next_cursor))
    }
}
