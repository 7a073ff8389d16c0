//! Integration tests for the scrape pipeline
//!
//! These tests use wiremock to serve a paginated listing and run whole jobs
//! end-to-end against it.

use pagesift::config::{HttpConfig, JobConfig};
use pagesift::events::{CollectingEventSink, QueueEvent};
use pagesift::output::{RecordSink, SinkResult};
use pagesift::scrape::{build_http_client, RetryPolicy, RetryingFetcher};
use pagesift::output::RunSummary;
use pagesift::storage::{CheckpointError, CheckpointResult, FileFrontierStore, FrontierStore};
use pagesift::{Job, PageState, Pipeline, PipelineEvent, Record, ScrapeError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROWS_PER_PAGE: u32 = 2;

/// Seed page linking to pages 1..=total
fn seed_body(total: u32) -> String {
    let links: String = (1..=total)
        .map(|page| format!(r#"<li><a href="?page={page}">{page}</a></li>"#))
        .collect();
    format!(r#"<html><body><ul class="pagination">{links}</ul></body></html>"#)
}

/// Listing page with a header row and `ROWS_PER_PAGE` data rows
fn page_body(page: u32) -> String {
    let rows: String = (0..ROWS_PER_PAGE)
        .map(|row| {
            format!(
                r#"<tr><td>item-{page}-{row}</td><td>{page}</td><td><a href="/view/{page}-{row}">open</a> <a href="/download/{page}-{row}.pdf">pdf</a></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><table><tr><th>Name</th><th>Page</th><th>Links</th></tr>{rows}</table></body></html>"#
    )
}

async fn mount_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_ok_pages(server: &MockServer, pages: impl IntoIterator<Item = u32>) {
    for page in pages {
        mount_page(server, page, ResponseTemplate::new(200).set_body_string(page_body(page))).await;
    }
}

/// Mounted last so page-specific mocks take precedence
async fn mount_seed(server: &MockServer, total: u32) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(seed_body(total)))
        .mount(server)
        .await;
}

fn job_config(server: &MockServer, output: &Path, concurrency: u32) -> JobConfig {
    JobConfig {
        name: "listing".to_string(),
        base_url: format!("{}/list", server.uri()),
        output: output.to_string_lossy().into_owned(),
        columns: vec![
            "name".to_string(),
            "page".to_string(),
            "view_url".to_string(),
            "download_url".to_string(),
        ],
        view_column: "view_url".to_string(),
        download_column: "download_url".to_string(),
        view_prefix: "/view/".to_string(),
        download_prefix: "/download/".to_string(),
        link_base_url: server.uri(),
        concurrency,
        page_param: "page".to_string(),
        max_pages: 10_000,
        strict_markup: false,
        fail_fast: false,
    }
}

fn fetcher() -> RetryingFetcher {
    let client = build_http_client(&HttpConfig::default()).expect("Failed to build client");
    RetryingFetcher::new(
        client,
        RetryPolicy {
            max_attempts: 4,
            backoff_unit: Duration::from_millis(10),
        },
    )
}

fn pipeline(config: &JobConfig, events: &Arc<CollectingEventSink>) -> Pipeline {
    let job = Job::from_config(config).expect("Invalid job");
    Pipeline::new(job, fetcher(), events.clone())
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("Failed to open output");
    reader
        .records()
        .map(|row| row.expect("Bad CSV row").iter().map(String::from).collect())
        .collect()
}

fn header() -> Vec<String> {
    vec![
        "name".to_string(),
        "page".to_string(),
        "view_url".to_string(),
        "download_url".to_string(),
    ]
}

fn attempts_for(events: &CollectingEventSink, page: u32) -> usize {
    events
        .events()
        .iter()
        .filter(|event| matches!(event, PipelineEvent::PageAttempt { page: p, .. } if *p == page))
        .count()
}

fn finished_summary(events: &CollectingEventSink) -> RunSummary {
    events
        .events()
        .into_iter()
        .find_map(|event| match event {
            PipelineEvent::RunFinished { summary } => Some(summary),
            _ => None,
        })
        .expect("No RunFinished event")
}

fn stored_frontier(output: &Path) -> u32 {
    FileFrontierStore::for_target(output)
        .load()
        .expect("Failed to read checkpoint")
}

#[tokio::test]
async fn test_full_run_writes_every_page() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, 1..=5).await;
    mount_seed(&server, 5).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out").join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 3), &events);

    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(summary.total_pages, 5);
    assert_eq!(summary.scheduled, 5);
    assert_eq!(summary.final_frontier, 5);
    assert_eq!(summary.stats.completed(), 5);
    assert_eq!(summary.stats.records_written, 10);
    assert!(summary.is_complete());
    assert!(!summary.cancelled);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[0], header());

    let first_page = rows
        .iter()
        .find(|row| row[0] == "item-1-0")
        .expect("Missing row from page 1");
    assert_eq!(first_page[1], "1");
    assert_eq!(first_page[2], format!("{}/view/1-0", server.uri()));
    assert_eq!(first_page[3], format!("{}/download/1-0.pdf", server.uri()));

    assert_eq!(stored_frontier(&output), 5);

    // The frontier only ever moves forward
    let checkpoints = events.checkpoints();
    assert!(checkpoints.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(checkpoints.last(), Some(&5));

    let mut started = events.started_pages();
    started.sort_unstable();
    assert_eq!(started, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_resume_skips_completed_prefix() {
    let server = MockServer::start().await;
    for page in 1..=3 {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(page)))
            .expect(0)
            .mount(&server)
            .await;
    }
    mount_ok_pages(&server, 4..=5).await;
    mount_seed(&server, 5).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    FileFrontierStore::for_target(&output).persist(3).unwrap();

    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 2), &events);
    let summary = pipeline.run().await.expect("Run failed");

    let mut started = events.started_pages();
    started.sort_unstable();
    assert_eq!(started, vec![4, 5]);

    assert_eq!(summary.start_frontier, 3);
    assert_eq!(summary.final_frontier, 5);
    assert_eq!(summary.stats.count(PageState::Skipped), 3);
    assert_eq!(summary.stats.completed(), 2);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 1 + 4);
    assert_eq!(rows[0], header());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, [1, 3]).await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(&server, 2, ResponseTemplate::new(200).set_body_string(page_body(2))).await;
    mount_seed(&server, 3).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 3), &events);

    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(attempts_for(&events, 2), 3);
    assert_eq!(summary.stats.completed(), 3);
    assert_eq!(summary.final_frontier, 3);
    assert_eq!(stored_frontier(&output), 3);
}

#[tokio::test]
async fn test_exhausted_retries_leave_gap_for_next_run() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, [1, 3]).await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;
    mount_seed(&server, 3).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut first = pipeline(&job_config(&server, &output, 3), &events);

    let summary = first.run().await.expect("Run failed");

    assert_eq!(attempts_for(&events, 2), 4);
    assert_eq!(summary.stats.count(PageState::FetchFailed), 1);
    assert_eq!(summary.stats.completed(), 2);
    assert_eq!(summary.final_frontier, 1);
    assert_eq!(stored_frontier(&output), 1);
    assert_eq!(read_rows(&output).len(), 1 + 4);

    // Page 2 recovers; pages 2 and 3 are fetched again
    server.reset().await;
    mount_ok_pages(&server, 1..=3).await;
    mount_seed(&server, 3).await;

    let events = Arc::new(CollectingEventSink::new());
    let mut second = pipeline(&job_config(&server, &output, 3), &events);
    let summary = second.run().await.expect("Run failed");

    let mut started = events.started_pages();
    started.sort_unstable();
    assert_eq!(started, vec![2, 3]);
    assert_eq!(summary.final_frontier, 3);

    // Page 3 was written by both runs
    let rows = read_rows(&output);
    assert_eq!(rows.len(), 1 + 4 + 4);
    assert_eq!(rows.iter().filter(|row| row[0] == "item-3-0").count(), 2);
    assert_eq!(rows.iter().filter(|row| **row == header()).count(), 1);
}

#[tokio::test]
async fn test_http_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, [1, 3]).await;
    mount_page(&server, 2, ResponseTemplate::new(404)).await;
    mount_seed(&server, 3).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 2), &events);

    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(attempts_for(&events, 2), 1);
    assert_eq!(summary.stats.count(PageState::HttpError), 1);
    assert_eq!(summary.stats.completed(), 2);
    assert_eq!(summary.final_frontier, 1);
    assert!(!summary.is_complete());

    let failed: Vec<u32> = events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::PageFailed { page, .. } => Some(page),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![2]);
}

#[tokio::test]
async fn test_second_run_appends_without_header() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, 1..=2).await;
    mount_seed(&server, 2).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    pipeline(&job_config(&server, &output, 2), &events)
        .run()
        .await
        .expect("First run failed");
    assert_eq!(read_rows(&output).len(), 1 + 4);

    // The listing grew by two pages
    server.reset().await;
    mount_ok_pages(&server, 1..=4).await;
    mount_seed(&server, 4).await;

    let events = Arc::new(CollectingEventSink::new());
    let summary = pipeline(&job_config(&server, &output, 2), &events)
        .run()
        .await
        .expect("Second run failed");

    let mut started = events.started_pages();
    started.sort_unstable();
    assert_eq!(started, vec![3, 4]);
    assert_eq!(summary.final_frontier, 4);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 1 + 8);
    assert_eq!(rows[0], header());
    assert_eq!(rows.iter().filter(|row| **row == header()).count(), 1);
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1)))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 2), &events);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(ScrapeError::Discovery { .. })));
    assert!(!output.exists());
    assert!(events.started_pages().is_empty());
}

#[tokio::test]
async fn test_fail_fast_stops_run() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, [1, 3, 4, 5]).await;
    mount_page(&server, 2, ResponseTemplate::new(500)).await;
    mount_seed(&server, 5).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let mut config = job_config(&server, &output, 1);
    config.fail_fast = true;
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&config, &events);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(ScrapeError::PageFailed { page: 2, .. })));
    assert_eq!(events.started_pages(), vec![1, 2]);
    assert_eq!(stored_frontier(&output), 1);
    // The sink was closed with page 1's rows in place
    assert_eq!(read_rows(&output).len(), 1 + 2);
}

#[tokio::test]
async fn test_cancel_drains_in_flight_pages() {
    let server = MockServer::start().await;
    for page in 1..=6 {
        mount_page(
            &server,
            page,
            ResponseTemplate::new(200)
                .set_body_string(page_body(page))
                .set_delay(Duration::from_millis(100)),
        )
        .await;
    }
    mount_seed(&server, 6).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 1), &events);

    let handle = pipeline.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.cancel();
    });

    let summary = pipeline.run().await.expect("Run failed");

    assert!(summary.cancelled);
    assert!(summary.final_frontier >= 1);
    assert!(summary.final_frontier < 6);
    assert!(summary.stats.count(PageState::Dropped) > 0);
    assert_eq!(stored_frontier(&output), summary.final_frontier);
    assert_eq!(
        read_rows(&output).len() as u32,
        1 + summary.final_frontier * ROWS_PER_PAGE
    );
}

/// In-memory sink that remembers whether it was closed
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<Record>>,
    closed: Mutex<bool>,
}

impl RecordSink for MemorySink {
    fn write_record(&self, record: &Record) -> SinkResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        Ok(())
    }

    fn close(&self) -> SinkResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Frontier store that keeps every persisted value
#[derive(Default)]
struct MemoryStore {
    persisted: Arc<Mutex<Vec<u32>>>,
}

impl FrontierStore for MemoryStore {
    fn load(&self) -> CheckpointResult<u32> {
        Ok(0)
    }

    fn persist(&self, frontier: u32) -> CheckpointResult<()> {
        self.persisted.lock().unwrap().push(frontier);
        Ok(())
    }

    fn reset(&self) -> CheckpointResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_sink_and_store() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, 1..=4).await;
    mount_seed(&server, 4).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("unused.csv");
    let sink = Arc::new(MemorySink::default());
    let store = MemoryStore::default();
    let persisted = store.persisted.clone();

    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 4), &events)
        .with_sink(sink.clone())
        .with_frontier_store(Box::new(store));

    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(summary.final_frontier, 4);
    assert!(*sink.closed.lock().unwrap());
    assert_eq!(sink.records.lock().unwrap().len(), 8);
    assert!(!output.exists());

    let persisted = persisted.lock().unwrap().clone();
    assert_eq!(persisted.last(), Some(&4));
    assert!(persisted.windows(2).all(|pair| pair[0] < pair[1]));
}

/// Frontier store whose disk fills up after `limit`
struct FullDiskStore {
    limit: u32,
    persisted: Arc<Mutex<Vec<u32>>>,
}

impl FrontierStore for FullDiskStore {
    fn load(&self) -> CheckpointResult<u32> {
        Ok(0)
    }

    fn persist(&self, frontier: u32) -> CheckpointResult<()> {
        if frontier > self.limit {
            return Err(CheckpointError::Io {
                path: "full-disk".into(),
                source: std::io::Error::other("no space left on device"),
            });
        }
        self.persisted.lock().unwrap().push(frontier);
        Ok(())
    }

    fn reset(&self) -> CheckpointResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_checkpoint_failure_stops_run() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, 1..=5).await;
    mount_seed(&server, 5).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("unused.csv");
    let sink = Arc::new(MemorySink::default());
    let persisted = Arc::new(Mutex::new(Vec::new()));
    let store = FullDiskStore {
        limit: 1,
        persisted: persisted.clone(),
    };

    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 1), &events)
        .with_sink(sink.clone())
        .with_frontier_store(Box::new(store));

    let result = pipeline.run().await;

    assert!(matches!(result, Err(ScrapeError::Checkpoint(_))));
    assert_eq!(events.started_pages(), vec![1, 2]);
    assert_eq!(*persisted.lock().unwrap(), vec![1]);

    // Page 2's rows reached the sink before its checkpoint failed
    assert!(*sink.closed.lock().unwrap());
    assert_eq!(sink.records.lock().unwrap().len(), 4);

    let summary = finished_summary(&events);
    assert!(summary.cancelled);
    assert_eq!(summary.final_frontier, 1);
    assert_eq!(summary.stats.completed(), 1);
    assert_eq!(summary.stats.count(PageState::CheckpointFailed), 1);
    assert_eq!(summary.stats.count(PageState::Dropped), 3);
}

#[tokio::test]
async fn test_pause_and_resume_mid_run() {
    let server = MockServer::start().await;
    for page in 1..=4 {
        mount_page(
            &server,
            page,
            ResponseTemplate::new(200)
                .set_body_string(page_body(page))
                .set_delay(Duration::from_millis(100)),
        )
        .await;
    }
    mount_seed(&server, 4).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&job_config(&server, &output, 1), &events);

    let handle = pipeline.handle();
    let watcher = events.clone();
    let control = tokio::spawn(async move {
        while watcher.started_pages().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.pause();
        // Page 1 finishes during the pause; nothing else may start
        tokio::time::sleep(Duration::from_millis(400)).await;
        let while_paused = watcher.started_pages();
        let paused = handle.is_paused();
        handle.resume();
        (while_paused, paused)
    });

    let summary = pipeline.run().await.expect("Run failed");
    let (while_paused, paused) = control.await.unwrap();

    assert!(paused);
    assert_eq!(while_paused, vec![1]);
    assert_eq!(events.started_pages(), vec![1, 2, 3, 4]);
    assert!(!summary.cancelled);
    assert_eq!(summary.stats.completed(), 4);
    assert_eq!(summary.final_frontier, 4);
    assert_eq!(stored_frontier(&output), 4);

    let queue: Vec<QueueEvent> = events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::Queue(queue) => Some(queue),
            _ => None,
        })
        .collect();
    let paused_at = queue.iter().position(|e| *e == QueueEvent::Paused);
    let resumed_at = queue.iter().position(|e| *e == QueueEvent::Resumed);
    assert!(paused_at.is_some());
    assert!(paused_at < resumed_at);
}

#[tokio::test]
async fn test_runaway_page_count_is_capped() {
    let server = MockServer::start().await;
    mount_ok_pages(&server, 1..=3).await;
    Mock::given(method("GET"))
        .and(query_param("page", "4000000000"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="?page=1">1</a><a href="?page=2">2</a><a href="?page=4000000000">Last</a>"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("listing.csv");
    let mut config = job_config(&server, &output, 2);
    config.max_pages = 3;
    let events = Arc::new(CollectingEventSink::new());
    let mut pipeline = pipeline(&config, &events);

    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(summary.total_pages, 3);
    assert_eq!(summary.scheduled, 3);
    assert_eq!(summary.final_frontier, 3);
    assert_eq!(read_rows(&output).len(), 1 + 6);
}
