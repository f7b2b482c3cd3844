//! Dataset pipeline integration tests
//!
//! Tests the complete catalog → resolve → download → progress flow:
//! 1. A fresh run downloads the preferred resource and records progress
//! 2. A second run downloads nothing
//! 3. Files from an earlier run are recognized without network access
//! 4. In-flight `tmp_*` directories are never trusted
//! 5. Failed downloads leave the dataset pending
//! 6. Duplicate headings are processed once

use coletor::crawler::Orchestrator;
use coletor::models::ProgressState;
use coletor::storage::progress::PROGRESS_FILE;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{
    test_config, CATALOG_PATH, CSV_BODY, DATASET_A_FILE, DATASET_A_HTML, LISTING_HTML,
    RESOURCE_A_HTML,
};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

/// Mount the catalog and dataset pages; the caller mounts the file itself
async fn mount_catalog(server: &MockServer, detail_requests: u64) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(html(LISTING_HTML))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a"))
        .respond_with(html(DATASET_A_HTML))
        .expect(detail_requests)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a/resource/1"))
        .respond_with(html(RESOURCE_A_HTML))
        .expect(detail_requests)
        .mount(server)
        .await;

    // The PDF resource loses to the CSV and is never resolved
    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a/resource/dicionario"))
        .respond_with(html(RESOURCE_A_HTML))
        .expect(0)
        .mount(server)
        .await;
}

async fn mount_csv(server: &MockServer, requests: u64) {
    Mock::given(method("GET"))
        .and(path("/files/dataset-a.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CSV_BODY))
        .expect(requests)
        .mount(server)
        .await;
}

fn completed(source_dir: &Path) -> ProgressState {
    let content = fs::read_to_string(source_dir.join(PROGRESS_FILE)).expect("sidecar should exist");
    serde_json::from_str(&content).expect("sidecar should be valid JSON")
}

#[tokio::test]
async fn test_fresh_run_downloads_preferred_resource() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, 1).await;
    mount_csv(&mock_server, 1).await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");
    let run_dir = source_dir.join("tmp_run1");
    let config = test_config(&mock_server.uri(), root.path());

    let orchestrator = Orchestrator::new(&config).unwrap();
    let summary = orchestrator.run(&run_dir).await.unwrap();

    assert_eq!(summary.datasets, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.files_downloaded, 1);
    assert_eq!(summary.bytes_downloaded, CSV_BODY.len() as u64);
    assert!(summary.harvest.is_none());

    let written = fs::read_to_string(run_dir.join(DATASET_A_FILE)).unwrap();
    assert_eq!(written, CSV_BODY);
    assert!(completed(&source_dir).completed_datasets.contains("DatasetA"));

    // No leftovers from the atomic write
    let leftovers: Vec<_> = fs::read_dir(&run_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, 1).await;
    mount_csv(&mock_server, 1).await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");
    let config = test_config(&mock_server.uri(), root.path());

    let first = Orchestrator::new(&config)
        .unwrap()
        .run(&source_dir.join("tmp_run1"))
        .await
        .unwrap();
    assert_eq!(first.files_downloaded, 1);

    let second = Orchestrator::new(&config)
        .unwrap()
        .run(&source_dir.join("tmp_run2"))
        .await
        .unwrap();

    assert_eq!(second.datasets, 1);
    assert_eq!(second.already_done, 1);
    assert_eq!(second.files_downloaded, 0);
    assert!(!source_dir.join("tmp_run2").join(DATASET_A_FILE).exists());
}

#[tokio::test]
async fn test_resume_from_existing_files() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, 0).await;
    mount_csv(&mock_server, 0).await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");
    let run_dir = source_dir.join("tmp_run1");
    fs::create_dir_all(&run_dir).unwrap();
    fs::write(run_dir.join(DATASET_A_FILE), CSV_BODY).unwrap();

    let config = test_config(&mock_server.uri(), root.path());
    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&run_dir)
        .await
        .unwrap();

    assert_eq!(summary.already_done, 1);
    assert_eq!(summary.files_downloaded, 0);
    assert!(completed(&source_dir).completed_datasets.contains("DatasetA"));
}

#[tokio::test]
async fn test_finished_sibling_run_counts_but_tmp_sibling_does_not() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, 1).await;
    mount_csv(&mock_server, 1).await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");

    // Leftover of an interrupted run: must not be trusted
    let interrupted = source_dir.join("tmp_old");
    fs::create_dir_all(&interrupted).unwrap();
    fs::write(interrupted.join(DATASET_A_FILE), "truncated").unwrap();

    let config = test_config(&mock_server.uri(), root.path());
    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&source_dir.join("tmp_new"))
        .await
        .unwrap();
    assert_eq!(summary.success, 1);
    assert_eq!(summary.files_downloaded, 1);

    // A promoted run with the files is trusted once the sidecar is gone
    fs::remove_file(source_dir.join(PROGRESS_FILE)).unwrap();
    let finished = source_dir.join("20240101_120000");
    fs::create_dir_all(&finished).unwrap();
    fs::write(finished.join(DATASET_A_FILE), CSV_BODY).unwrap();

    let again = Orchestrator::new(&config)
        .unwrap()
        .run(&source_dir.join("tmp_third"))
        .await
        .unwrap();
    assert_eq!(again.already_done, 1);
    assert_eq!(again.files_downloaded, 0);
}

#[tokio::test]
async fn test_failed_download_stays_pending() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, 1).await;

    // max_attempts = 2 in the test configuration
    Mock::given(method("GET"))
        .and(path("/files/dataset-a.csv"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");
    let run_dir = source_dir.join("tmp_run1");
    let config = test_config(&mock_server.uri(), root.path());

    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&run_dir)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 0);
    assert!(!run_dir.join(DATASET_A_FILE).exists());
    assert!(!run_dir.join(format!("{DATASET_A_FILE}.part")).exists());
    assert!(!source_dir.join(PROGRESS_FILE).exists());
}

#[tokio::test]
async fn test_duplicate_headings_processed_once() {
    let mock_server = MockServer::start().await;

    let listing = r#"<html><body><ul>
        <li class="dataset-item"><h2 class="dataset-heading"><a href="/dataset/dataset-a">Dataset A</a></h2></li>
        <li class="dataset-item"><h2 class="dataset-heading"><a href="/dataset/dataset-a-copia">Dataset  A</a></h2></li>
    </ul></body></html>"#;

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(html(listing))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a"))
        .respond_with(html(DATASET_A_HTML))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a-copia"))
        .respond_with(html(DATASET_A_HTML))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a/resource/1"))
        .respond_with(html(RESOURCE_A_HTML))
        .mount(&mock_server)
        .await;
    mount_csv(&mock_server, 1).await;

    let root = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), root.path());
    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&root.path().join("datasus").join("tmp_run1"))
        .await
        .unwrap();

    assert_eq!(summary.datasets, 1);
    assert_eq!(summary.success, 1);
}

#[tokio::test]
async fn test_dataset_without_recognized_format_is_skipped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(html(LISTING_HTML))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dataset/dataset-a"))
        .respond_with(html(
            r#"<ul><li class="resource-item"><a href="/r/1">Painel<span>HTML</span></a></li></ul>"#,
        ))
        .mount(&mock_server)
        .await;

    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("datasus");
    let config = test_config(&mock_server.uri(), root.path());
    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&source_dir.join("tmp_run1"))
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(!source_dir.join(PROGRESS_FILE).exists());
}
