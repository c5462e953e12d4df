//! Common test utilities for engine integration tests
//!
//! Provides an in-memory migration service wired to a scripted source client
//! so tests can drive full pipeline runs without a network:
//!
//! - [`ScriptedSource`]: serves canned pages and archive bytes per relation
//! - [`CountingImporter`]: bundle importer that records invocations
//! - [`TestService`]: service plus handles for asserting on state, ledger
//!   and destination
//! - gzip/tar builders for NDJSON and file-relation fixtures

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tempfile::TempDir;

use airlift_engine::cache::SqliteLedger;
use airlift_engine::client::{Page, SourceClient};
use airlift_engine::config::EngineConfig;
use airlift_engine::destination::DestinationStore;
use airlift_engine::entity::Entity;
use airlift_engine::error::{AirliftError, Result};
use airlift_engine::loaders::BundleImporter;
use airlift_engine::store::StateStore;
use airlift_engine::MigrationService;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,airlift_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Scripted stand-in for the source instance.
///
/// Pages and archives are registered per relation name; requests are matched
/// by the `relation=` query parameter when present, otherwise by the last
/// path segment.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<String, Vec<Page>>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    fetch_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the full page sequence for a relation. The cursor is the
    /// stringified index of the page to serve next.
    pub fn with_pages(self, relation: &str, records_per_page: Vec<Vec<Value>>) -> Self {
        let total = records_per_page.len();
        let pages = records_per_page
            .into_iter()
            .enumerate()
            .map(|(i, records)| Page {
                records,
                next_cursor: (i + 1 < total).then(|| (i + 1).to_string()),
            })
            .collect();
        if let Ok(mut map) = self.pages.lock() {
            map.insert(relation.to_string(), pages);
        }
        self
    }

    pub fn with_archive(self, relation: &str, bytes: Vec<u8>) -> Self {
        if let Ok(mut map) = self.archives.lock() {
            map.insert(relation.to_string(), bytes);
        }
        self
    }

    /// Make every request for this relation fail with a source error
    pub fn failing_relation(self, relation: &str) -> Self {
        if let Ok(mut set) = self.failing.lock() {
            set.insert(relation.to_string());
        }
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn relation_of(path: &str) -> String {
        if let Some((_, relation)) = path.split_once("relation=") {
            relation.to_string()
        } else {
            path.rsplit('/').next().unwrap_or(path).to_string()
        }
    }

    fn check_failing(&self, relation: &str) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map(|set| set.contains(relation))
            .unwrap_or(false);
        if failing {
            return Err(AirliftError::Source(format!(
                "{relation} returned HTTP 502 Bad Gateway"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch_page(&self, relation_path: &str, cursor: Option<&str>) -> Result<Page> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let relation = Self::relation_of(relation_path);
        self.check_failing(&relation)?;

        let index: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let page = self
            .pages
            .lock()
            .ok()
            .and_then(|map| map.get(&relation).and_then(|pages| pages.get(index)).cloned());
        page.ok_or_else(|| AirliftError::Source(format!("{relation_path} returned HTTP 404")))
    }

    async fn download_relation(
        &self,
        relation_path: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<u64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let relation = Self::relation_of(relation_path);
        self.check_failing(&relation)?;

        let bytes = self
            .archives
            .lock()
            .ok()
            .and_then(|map| map.get(&relation).cloned())
            .ok_or_else(|| {
                AirliftError::Source(format!("{relation_path} returned HTTP 404"))
            })?;

        if bytes.len() as u64 > max_bytes {
            return Err(AirliftError::SizeLimit {
                what: format!("download of {relation_path}"),
                limit: max_bytes,
            });
        }

        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// Bundle importer double that records every invocation
#[derive(Default)]
pub struct CountingImporter {
    calls: AtomicUsize,
    bundles: Mutex<Vec<PathBuf>>,
}

impl CountingImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bundles(&self) -> Vec<PathBuf> {
        self.bundles.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BundleImporter for CountingImporter {
    async fn import_bundle(&self, _entity: &Entity, bundle: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push(bundle.to_path_buf());
        }
        Ok(())
    }
}

/// In-memory migration service plus the handles tests assert on.
///
/// The temp directories are owned here so they outlive the run.
pub struct TestService {
    pub service: MigrationService,
    pub store: StateStore,
    pub destination: DestinationStore,
    pub source: Arc<ScriptedSource>,
    pub importer: Arc<CountingImporter>,
    pub scratch: TempDir,
    pub files: TempDir,
}

impl TestService {
    /// Paths still present under the scratch root. Empty after any completed
    /// run; transfer state cleanup is unconditional.
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .map(|dir| dir.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

/// Build a service over in-memory SQLite and the given scripted source
pub async fn test_service(source: ScriptedSource) -> TestService {
    test_service_with_config(source, |_| {}).await
}

/// Same as [`test_service`] but lets the caller tweak the configuration
/// (e.g. shrink transfer bounds) before the service is assembled
pub async fn test_service_with_config(
    source: ScriptedSource,
    adjust: impl FnOnce(&mut EngineConfig),
) -> TestService {
    let scratch = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();

    let mut config = EngineConfig::default();
    config.source.base_url = "http://source.invalid/api".to_string();
    config.transfer.scratch_root = scratch.path().to_path_buf();
    config.destination.files_root = files.path().to_path_buf();
    config.cache.ttl_hours = 1;
    adjust(&mut config);

    let store = StateStore::in_memory().await.unwrap();
    let ledger = Arc::new(SqliteLedger::new(store.pool().clone(), config.cache.ttl_hours));
    let destination = DestinationStore::new(store.pool().clone(), &config.destination.files_root);
    let source = Arc::new(source);
    let importer = Arc::new(CountingImporter::new());

    let service = MigrationService::with_parts(
        store.clone(),
        ledger,
        destination.clone(),
        source.clone(),
        importer.clone(),
        Arc::new(config),
    )
    .unwrap();

    TestService {
        service,
        store,
        destination,
        source,
        importer,
        scratch,
        files,
    }
}

/// Gzip a byte buffer
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Serialize records as gzipped NDJSON, one JSON object per line
pub fn ndjson_gz(records: &[Value]) -> Vec<u8> {
    let mut plain = String::new();
    for record in records {
        plain.push_str(&record.to_string());
        plain.push('\n');
    }
    gzip(plain.as_bytes())
}

/// Entries for [`targz`]
pub enum ArchiveEntry<'a> {
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
    Dir(&'a str),
}

/// Build a gzipped tar archive from the given entries
pub fn targz(entries: &[ArchiveEntry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        match entry {
            ArchiveEntry::File(name, bytes) => {
                let mut header = tar::Header::new_gnu();
                header.set_size(bytes.len() as u64);
                header.set_mode(0o644);
                // Write the raw name field: `set_path` refuses the hostile
                // `..` paths these fixtures must contain.
                header.as_gnu_mut().unwrap().name[..name.len()]
                    .copy_from_slice(name.as_bytes());
                header.set_cksum();
                builder.append(&header, *bytes).unwrap();
            }
            ArchiveEntry::Symlink(name, target) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                builder.append_link(&mut header, name, target).unwrap();
            }
            ArchiveEntry::Dir(name) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                builder.append_data(&mut header, name, &[][..]).unwrap();
            }
        }
    }

    gzip(&builder.into_inner().unwrap())
}
