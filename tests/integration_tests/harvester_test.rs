//! API harvester integration tests
//!
//! Tests paginated endpoint dumps against a mocked open-data API:
//! 1. Endpoint selection from the API description
//! 2. Pagination stops on the first short page
//! 3. Incomplete dumps restart from offset 0
//! 4. Complete dumps are left alone
//! 5. A failing page leaves an in-progress dump
//! 6. The harvest runs after the dataset pipeline
//! 7. Checkpoints land every `checkpoint_interval` pages
//! 8. Complete dumps in finished sibling runs are left alone

use chrono::Utc;
use coletor::crawler::Orchestrator;
use coletor::harvester::{HarvestOutcome, OpenApiHarvester, OPENAPI_DIR};
use coletor::models::{DumpMetadata, DumpStatus, EndpointDescriptor, EndpointDump};
use coletor::storage::{load_dump, save_dump, RunLayout};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{any, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{api_spec, records, test_config, CATALOG_PATH, SPEC_PATH};

const DOSES_PATH: &str = "/vacinacao/doses";

fn doses_endpoint() -> EndpointDescriptor {
    EndpointDescriptor {
        path: DOSES_PATH.to_string(),
        summary: "Doses aplicadas".to_string(),
        tag: "Vacinacao".to_string(),
        page_limit: 100,
    }
}

async fn mount_page(server: &MockServer, offset: usize, count: usize) {
    Mock::given(method("GET"))
        .and(path(DOSES_PATH))
        .and(query_param("offset", offset.to_string()))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "doses": records(offset, count)
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn write_dump(dir: &Path, status: DumpStatus, count: usize) {
    let dump = EndpointDump {
        metadata: DumpMetadata {
            endpoint: DOSES_PATH.to_string(),
            summary: "Doses aplicadas".to_string(),
            tag: "Vacinacao".to_string(),
            download_date: Utc::now(),
            total_records: count,
            pages_downloaded: 1,
            elapsed_seconds: 0.5,
            status,
        },
        data: records(0, count),
    };
    save_dump(&doses_endpoint().dump_path(dir), &dump).unwrap();
}

#[tokio::test]
async fn test_run_pages_until_short_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_spec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, 0, 100).await;
    mount_page(&mock_server, 100, 100).await;
    mount_page(&mock_server, 200, 100).await;
    mount_page(&mock_server, 300, 37).await;

    let root = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), root.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let summary = harvester.run(root.path()).await;

    assert_eq!(summary.endpoints, 1);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.records, 337);

    let dump_path = root.path().join(OPENAPI_DIR).join("vacinacao_doses.json");
    let dump = load_dump(&dump_path).unwrap().expect("dump should exist");
    assert!(dump.is_complete());
    assert_eq!(dump.metadata.total_records, 337);
    assert_eq!(dump.metadata.pages_downloaded, 4);
    assert_eq!(dump.metadata.tag, "Vacinacao");
    assert_eq!(dump.data.len(), 337);
    assert_eq!(dump.data[336], json!({"id": 336, "dose": "D1"}));
}

#[tokio::test]
async fn test_incomplete_dump_restarts_from_zero() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 0, 12).await;

    let dir = TempDir::new().unwrap();
    write_dump(dir.path(), DumpStatus::InProgress, 100);

    let config = test_config(&mock_server.uri(), dir.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::Complete { records: 12, pages: 1 });

    let dump = load_dump(&doses_endpoint().dump_path(dir.path()))
        .unwrap()
        .unwrap();
    assert!(dump.is_complete());
    assert_eq!(dump.data.len(), 12);
}

#[tokio::test]
async fn test_complete_dump_is_skipped() {
    let mock_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    write_dump(dir.path(), DumpStatus::Complete, 5);

    let config = test_config(&mock_server.uri(), dir.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::AlreadyComplete);
}

#[tokio::test]
async fn test_failing_page_leaves_in_progress_dump() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 0, 100).await;

    // max_attempts = 2 in the test configuration
    Mock::given(method("GET"))
        .and(path(DOSES_PATH))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::Failed { records: 100, pages: 1 });

    let dump = load_dump(&doses_endpoint().dump_path(dir.path()))
        .unwrap()
        .unwrap();
    assert_eq!(dump.metadata.status, DumpStatus::InProgress);
    assert_eq!(dump.metadata.total_records, 100);
}

#[tokio::test]
async fn test_empty_endpoint_is_complete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOSES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"doses": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::Complete { records: 0, pages: 1 });
}

#[tokio::test]
async fn test_harvest_follows_pipeline() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><ul></ul></body></html>",
            "text/html; charset=utf-8",
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_spec()))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 0, 3).await;

    let root = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), root.path());
    config.harvest.enabled = true;

    let run_dir = root.path().join("datasus").join("tmp_run1");
    let summary = Orchestrator::new(&config)
        .unwrap()
        .run(&run_dir)
        .await
        .unwrap();

    assert_eq!(summary.datasets, 0);
    let harvest = summary.harvest.expect("harvest should have run");
    assert_eq!(harvest.successful, 1);
    assert_eq!(harvest.records, 3);
    assert!(run_dir.join(OPENAPI_DIR).join("vacinacao_doses.json").exists());
}

#[tokio::test]
async fn test_checkpoints_every_interval_pages() {
    let mock_server = MockServer::start().await;
    for page in 0..9 {
        mount_page(&mock_server, page * 100, 100).await;
    }
    mount_page(&mock_server, 900, 37).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.harvest.checkpoint_interval = 2;
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::Complete { records: 937, pages: 10 });

    let dump_path = doses_endpoint().dump_path(dir.path());
    let dump = load_dump(&dump_path).unwrap().unwrap();
    assert!(dump.is_complete());
    assert_eq!(dump.metadata.total_records, 937);
    assert_eq!(dump.metadata.pages_downloaded, 10);
    assert!(!dump_path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_checkpoint_visible_while_next_page_pending() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 0, 100).await;
    mount_page(&mock_server, 100, 100).await;
    Mock::given(method("GET"))
        .and(path(DOSES_PATH))
        .and(query_param("offset", "200"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"doses": records(200, 37)}))
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.harvest.checkpoint_interval = 2;
    let harvester = OpenApiHarvester::new(&config).unwrap();
    let endpoint = doses_endpoint();
    let dump_path = endpoint.dump_path(dir.path());

    let observe = async {
        for _ in 0..50 {
            if let Some(dump) = load_dump(&dump_path).unwrap() {
                return Some(dump);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    };

    let (outcome, checkpoint) =
        tokio::join!(harvester.harvest(&endpoint, dir.path()), observe);

    let checkpoint = checkpoint.expect("checkpoint should be written before the third page");
    assert_eq!(checkpoint.metadata.status, DumpStatus::InProgress);
    assert_eq!(checkpoint.metadata.total_records, 200);
    assert_eq!(checkpoint.metadata.pages_downloaded, 2);

    assert_eq!(outcome, HarvestOutcome::Complete { records: 237, pages: 3 });
    assert!(load_dump(&dump_path).unwrap().unwrap().is_complete());
}

#[tokio::test]
async fn test_failure_after_checkpoint_keeps_collected_pages() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 0, 100).await;
    mount_page(&mock_server, 100, 100).await;
    mount_page(&mock_server, 200, 100).await;
    Mock::given(method("GET"))
        .and(path(DOSES_PATH))
        .and(query_param("offset", "300"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.harvest.checkpoint_interval = 2;
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), dir.path()).await;
    assert_eq!(outcome, HarvestOutcome::Failed { records: 300, pages: 3 });

    let dump = load_dump(&doses_endpoint().dump_path(dir.path()))
        .unwrap()
        .unwrap();
    assert_eq!(dump.metadata.status, DumpStatus::InProgress);
    assert_eq!(dump.metadata.total_records, 300);
    assert_eq!(dump.data.len(), 300);
}

#[tokio::test]
async fn test_complete_dump_in_finished_run_is_skipped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_spec()))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 0, 42).await;

    let root = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), root.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let first = RunLayout::create(root.path()).unwrap();
    let summary = harvester.run(first.tmp_dir()).await;
    assert_eq!(summary.successful, 1);
    let finished = first.promote().unwrap();
    assert!(finished.join(OPENAPI_DIR).join("vacinacao_doses.json").is_file());

    let second = RunLayout::create(root.path()).unwrap();
    let summary = harvester.run(second.tmp_dir()).await;

    assert_eq!(summary.endpoints, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.successful, 0);
    assert!(!second
        .tmp_dir()
        .join(OPENAPI_DIR)
        .join("vacinacao_doses.json")
        .exists());
}

#[tokio::test]
async fn test_in_progress_dump_in_finished_run_is_fetched_again() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 0, 7).await;

    let root = TempDir::new().unwrap();
    let previous = root.path().join("datasus").join("20240101_120000").join(OPENAPI_DIR);
    write_dump(&previous, DumpStatus::InProgress, 100);

    let current = root.path().join("datasus").join("tmp_current").join(OPENAPI_DIR);
    let config = test_config(&mock_server.uri(), root.path());
    let harvester = OpenApiHarvester::new(&config).unwrap();

    let outcome = harvester.harvest(&doses_endpoint(), &current).await;
    assert_eq!(outcome, HarvestOutcome::Complete { records: 7, pages: 1 });
}
