//! Crawl pipeline - per-target crawl orchestration
//!
//! For every target the pipeline:
//! - Returns the most recent stored record if the target was crawled before
//! - Waits for a concurrency slot
//! - Fetches the page (the page source retries on its own)
//! - Extracts the embedded state and reads the page title
//! - Appends a success or failure record to the store
//! - Releases the slot and waits out the inter-request delay

use crate::config::{Config, PipelineConfig};
use crate::crawler::fetcher::{HttpFetcher, PageSource};
use crate::crawler::limiter::ConcurrencyLimiter;
use crate::crawler::parser::{parse_target, parse_title};
use crate::extract::{ExtractionOutcome, Extractor};
use crate::state::summarize;
use crate::storage::{open_storage, CrawlRecord, RecordStore, StorageError};
use crate::HarvestError;
use futures::stream::{self, Stream, StreamExt};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Message stored on records for pages without recoverable state
pub const NO_STATE_MESSAGE: &str = "no recoverable state found";

/// Record store shared between concurrent crawls
pub type SharedStore = Arc<Mutex<dyn RecordStore + Send>>;

/// Fetch, extract and persist pipeline
pub struct Pipeline {
    config: PipelineConfig,
    store: SharedStore,
    source: Arc<dyn PageSource>,
    extractor: Extractor,
    limiter: ConcurrencyLimiter,
}

impl Pipeline {
    /// Creates a pipeline over an existing store and page source
    pub fn new(
        config: PipelineConfig,
        extractor: Extractor,
        source: Arc<dyn PageSource>,
        store: SharedStore,
    ) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_requests as usize);
        Self {
            config,
            store,
            source,
            extractor,
            limiter,
        }
    }

    /// Builds the HTTP page source, extractor and SQLite store from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Pipeline)` - Ready to crawl
    /// * `Err(HarvestError)` - The store could not be opened, the HTTP client
    ///   could not be built or the extraction patterns did not compile
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let store: SharedStore = Arc::new(Mutex::new(storage));
        let source = Arc::new(HttpFetcher::from_config(config)?);
        let extractor = Extractor::new(&config.extractor)?;

        Ok(Self::new(config.pipeline.clone(), extractor, source, store))
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Crawls a single target
    ///
    /// A target with a stored record is not fetched again; its most recent
    /// record is returned as is, whether it succeeded or failed.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlRecord)` - The stored or newly created success record
    /// * `Err(HarvestError::InvalidUrl)` - Target is not an absolute http(s) URL
    /// * `Err(HarvestError::Network)` - Fetch failed after all retries; a
    ///   failure record was stored
    /// * `Err(HarvestError::Extraction)` - Page had no recoverable state; a
    ///   failure record was stored
    pub async fn crawl_one(&self, url: &str) -> Result<CrawlRecord, HarvestError> {
        let target = parse_target(url)?;
        let key = target.as_str();

        let existing = self.lock_store()?.latest(key)?;
        if let Some(existing) = existing {
            tracing::debug!(
                "Skipping {}: already recorded as {} at {}",
                key,
                existing.status,
                existing.scraped_at
            );
            return Ok(existing);
        }

        let result = self.fetch_and_record(key).await;

        // The slot is already released here
        tokio::time::sleep(self.config.request_delay()).await;

        result
    }

    async fn fetch_and_record(&self, key: &str) -> Result<CrawlRecord, HarvestError> {
        let _slot = self.limiter.acquire().await?;
        tracing::info!(
            "Crawling {} ({}/{} slots in use)",
            key,
            self.limiter.in_flight(),
            self.limiter.max()
        );

        let page = match self.source.fetch(key).await {
            Ok(page) => page,
            Err(e) => {
                let message = match &e {
                    HarvestError::Network { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                self.persist_failure(CrawlRecord::failed(key, None, message));
                return Err(e);
            }
        };

        let title = parse_title(&page.body);

        match self.extractor.extract(&page.body) {
            ExtractionOutcome::Extracted { data, strategy } => {
                tracing::debug!(
                    "{} state via {} strategy: {}",
                    key,
                    strategy,
                    summarize(&data)
                );
                let record = self.persist(CrawlRecord::success(key, title, data))?;
                tracing::info!("Stored state for {} (record {:?})", key, record.id);
                Ok(record)
            }
            outcome => {
                let reason = match outcome {
                    ExtractionOutcome::Malformed { reason } => reason,
                    _ => NO_STATE_MESSAGE.to_string(),
                };
                tracing::warn!("No state recovered from {}: {}", page.final_url, reason);
                self.persist_failure(CrawlRecord::failed(key, title, NO_STATE_MESSAGE));
                Err(HarvestError::Extraction {
                    url: key.to_string(),
                    reason,
                })
            }
        }
    }

    /// Crawls targets one after another as a lazy stream
    ///
    /// Each target is completed before the next one starts. Failures are
    /// logged and yield `None`; they do not end the stream.
    pub fn crawl_stream(
        &self,
        urls: Vec<String>,
    ) -> impl Stream<Item = Option<CrawlRecord>> + '_ {
        stream::iter(urls).then(move |url| async move {
            match self.crawl_one(&url).await {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::error!("Error crawling {}: {}", url, e);
                    None
                }
            }
        })
    }

    /// Crawls all targets in order and collects the results
    pub async fn crawl_many(&self, urls: &[String]) -> Vec<Option<CrawlRecord>> {
        let results: Vec<_> = self.crawl_stream(urls.to_vec()).collect().await;

        let succeeded = results
            .iter()
            .flatten()
            .filter(|record| record.is_success())
            .count();
        tracing::info!("Crawl complete: {}/{} succeeded", succeeded, results.len());

        results
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, dyn RecordStore + Send + 'static>, StorageError> {
        self.store.lock().map_err(|_| StorageError::Poisoned)
    }

    fn persist(&self, mut record: CrawlRecord) -> Result<CrawlRecord, HarvestError> {
        let id = self.lock_store()?.append(&record)?;
        record.id = Some(id);
        Ok(record)
    }

    /// Stores a failure record; a store error here is logged, not returned
    fn persist_failure(&self, record: CrawlRecord) {
        if let Err(e) = self.persist(record) {
            tracing::error!("Failed to store failure record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::crawler::FetchResult;
    use crate::storage::{RecordStatus, SqliteStorage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Canned page source that counts calls and tracks concurrent fetches
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Result<String, String>>,
        delay: Duration,
        calls: AtomicUsize,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn failing(mut self, url: &str, message: &str) -> Self {
            self.pages.insert(url.to_string(), Err(message.to_string()));
            self
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<FetchResult, HarvestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            match self.pages.get(url) {
                Some(Ok(body)) => Ok(FetchResult {
                    final_url: url.to_string(),
                    status_code: 200,
                    body: body.clone(),
                }),
                Some(Err(message)) => Err(HarvestError::Network {
                    url: url.to_string(),
                    message: message.clone(),
                }),
                None => Err(HarvestError::Network {
                    url: url.to_string(),
                    message: "HTTP 404".to_string(),
                }),
            }
        }
    }

    const STATE_PAGE: &str = r#"<html><head><title>Home</title></head><body><script>window.__NUXT__={"data":[{"id":1}]};</script></body></html>"#;

    fn pipeline_with(source: Arc<FakeSource>, max_concurrent: u32) -> Pipeline {
        let config = PipelineConfig {
            request_delay_ms: 0,
            max_concurrent_requests: max_concurrent,
            ..PipelineConfig::default()
        };
        pipeline_with_config(source, config)
    }

    fn pipeline_with_config(source: Arc<FakeSource>, config: PipelineConfig) -> Pipeline {
        let store: SharedStore = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let extractor = Extractor::new(&ExtractorConfig::default()).unwrap();
        Pipeline::new(config, extractor, source, store)
    }

    #[tokio::test]
    async fn test_crawl_one_success() {
        let source = Arc::new(FakeSource::default().page("https://example.com/", STATE_PAGE));
        let pipeline = pipeline_with(source, 2);

        let record = pipeline.crawl_one("https://example.com/").await.unwrap();
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.title.as_deref(), Some("Home"));
        assert_eq!(record.extracted_data, Some(json!({"data": [{"id": 1}]})));
        assert!(record.id.is_some());
    }

    #[tokio::test]
    async fn test_crawl_one_is_idempotent() {
        let source = Arc::new(FakeSource::default().page("https://example.com/", STATE_PAGE));
        let pipeline = pipeline_with(Arc::clone(&source), 2);

        let first = pipeline.crawl_one("https://example.com/").await.unwrap();
        let second = pipeline.crawl_one("https://example.com/").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_equivalent_urls_share_records() {
        let source = Arc::new(FakeSource::default().page("https://example.com/", STATE_PAGE));
        let pipeline = pipeline_with(Arc::clone(&source), 2);

        pipeline.crawl_one("https://example.com/").await.unwrap();
        pipeline.crawl_one("https://EXAMPLE.com").await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_fetched_or_stored() {
        let source = Arc::new(FakeSource::default());
        let pipeline = pipeline_with(Arc::clone(&source), 2);

        let err = pipeline.crawl_one("not a url").await.unwrap_err();
        assert!(matches!(err, HarvestError::InvalidUrl { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.store().lock().unwrap().recent(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_is_recorded() {
        let source = Arc::new(FakeSource::default().failing("https://down.example/", "HTTP 503"));
        let pipeline = pipeline_with(source, 2);

        let err = pipeline.crawl_one("https://down.example/").await.unwrap_err();
        assert!(err.is_network());

        let stored = pipeline
            .store()
            .lock()
            .unwrap()
            .latest("https://down.example/")
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RecordStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("HTTP 503"));
        assert_eq!(pipeline.limiter().available(), 2);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_recorded() {
        let source = Arc::new(
            FakeSource::default().page("https://plain.example/", "<title>Plain</title><p>hi</p>"),
        );
        let pipeline = pipeline_with(source, 2);

        let err = pipeline.crawl_one("https://plain.example/").await.unwrap_err();
        assert!(err.is_extraction());

        let stored = pipeline
            .store()
            .lock()
            .unwrap()
            .latest("https://plain.example/")
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RecordStatus::Failed);
        assert_eq!(stored.title.as_deref(), Some("Plain"));
        assert_eq!(stored.error_message.as_deref(), Some(NO_STATE_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_delay_follows_fetches_only() {
        let source = Arc::new(
            FakeSource::default()
                .page("https://example.com/", STATE_PAGE)
                .failing("https://down.example/", "HTTP 503"),
        );
        let config = PipelineConfig {
            request_delay_ms: 1_000,
            max_concurrent_requests: 2,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with_config(source, config);
        let delay = Duration::from_millis(1_000);
        let slack = Duration::from_millis(50);

        let started = Instant::now();
        pipeline.crawl_one("https://example.com/").await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= delay && elapsed < delay + slack, "elapsed {elapsed:?}");

        // Dedup hit: no fetch, no delay
        let started = Instant::now();
        pipeline.crawl_one("https://example.com/").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);

        // Failed fetches are followed by the delay as well
        let started = Instant::now();
        pipeline.crawl_one("https://down.example/").await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= delay && elapsed < delay + slack, "elapsed {elapsed:?}");

        // Invalid targets are never fetched
        let started = Instant::now();
        pipeline.crawl_one("not a url").await.unwrap_err();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_crawl_many_continues_after_failure() {
        let source = Arc::new(
            FakeSource::default()
                .failing("https://u1.example/", "Request timeout")
                .page("https://u2.example/", STATE_PAGE),
        );
        let pipeline = pipeline_with(source, 2);

        let results = pipeline
            .crawl_many(&[
                "https://u1.example/".to_string(),
                "https://u2.example/".to_string(),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_none());
        assert_eq!(
            results[1].as_ref().map(|r| r.status),
            Some(RecordStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_crawl_stream_is_sequential() {
        let mut source = FakeSource::default();
        source.delay = Duration::from_millis(5);
        let source = Arc::new(
            source
                .page("https://a.example/", STATE_PAGE)
                .page("https://b.example/", STATE_PAGE)
                .page("https://c.example/", STATE_PAGE),
        );
        let pipeline = pipeline_with(Arc::clone(&source), 5);

        let urls = vec![
            "https://a.example/".to_string(),
            "https://b.example/".to_string(),
            "https://c.example/".to_string(),
        ];
        let records: Vec<_> = pipeline.crawl_stream(urls).collect().await;

        assert!(records.iter().all(Option::is_some));
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_are_capped() {
        let mut source = FakeSource::default();
        source.delay = Duration::from_millis(30);
        let urls: Vec<String> = (0..10)
            .map(|i| format!("https://site{}.example/", i))
            .collect();
        for url in &urls {
            source = source.page(url, STATE_PAGE);
        }
        let source = Arc::new(source);
        let pipeline = Arc::new(pipeline_with(Arc::clone(&source), 3));

        let tasks: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.crawl_one(&url).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded cap");
        assert!(peak > 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 10);
        assert_eq!(pipeline.limiter().available(), 3);
    }
}
