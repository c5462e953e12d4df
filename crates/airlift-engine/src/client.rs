//! HTTP client for the source instance
//!
//! Two access patterns: cursor-paged JSON collections and streamed relation
//! archives. The client performs no retries; transient failures surface to the
//! tracker, whose restart path is already idempotent.

use crate::config::SourceConfig;
use crate::error::{AirliftError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// One page of records from a paged collection endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read access to the source instance
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of a paged collection, optionally resuming from a cursor
    async fn fetch_page(&self, relation_path: &str, cursor: Option<&str>) -> Result<Page>;

    /// Stream a relation file to `dest`, enforcing `max_bytes`. Returns the
    /// number of bytes written.
    async fn download_relation(
        &self,
        relation_path: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<u64>;
}

/// `SourceClient` over HTTP with bearer-token auth
pub struct HttpSourceClient {
    http: reqwest::Client,
    download: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
}

impl HttpSourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let user_agent = concat!("airlift/", env!("CARGO_PKG_VERSION"));
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(user_agent)
            .build()?;
        // Archive downloads get a separate client so the page-request timeout
        // does not cut long streams short.
        let download = reqwest::Client::builder()
            .timeout(config.download_timeout())
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http,
            download,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, relation_path: &str) -> String {
        format!("{}/{}", self.base_url, relation_path.trim_start_matches('/'))
    }

    fn get(&self, client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
        let request = client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_page(&self, relation_path: &str, cursor: Option<&str>) -> Result<Page> {
        let mut query: Vec<(&str, String)> = vec![("per_page", self.page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let url = self.url(relation_path);
        debug!(%url, cursor = cursor.unwrap_or("-"), "Fetching page");

        let response = self.get(&self.http, &url).query(&query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AirliftError::Source(format!(
                "{url} returned HTTP {status}"
            )));
        }

        Ok(response.json::<Page>().await?)
    }

    async fn download_relation(
        &self,
        relation_path: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<u64> {
        let url = self.url(relation_path);
        debug!(%url, dest = %dest.display(), "Downloading relation file");

        let response = self.get(&self.download, &url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AirliftError::Source(format!(
                "{url} returned HTTP {status}"
            )));
        }

        // Reject oversized payloads up front when the server declares a length;
        // the streamed count below still guards chunked responses.
        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(AirliftError::SizeLimit {
                    what: format!("download of {relation_path} ({length} bytes)"),
                    limit: max_bytes,
                });
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                tokio::fs::remove_file(dest).await.ok();
                return Err(AirliftError::SizeLimit {
                    what: format!("download of {relation_path}"),
                    limit: max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(bytes = written, "Download complete");
        Ok(written)
    }
}
