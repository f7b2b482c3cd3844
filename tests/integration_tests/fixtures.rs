//! Shared HTML fixtures and configuration for integration tests

use coletor::config::Config;
use serde_json::{json, Value};
use std::path::Path;

/// Path of the catalog listing on the mock server
pub const CATALOG_PATH: &str = "/organization/ministerio-da-saude";

/// Path of the API description on the mock server
pub const SPEC_PATH: &str = "/static/swagger.json";

/// Listing page with a single dataset and no pagination controls
pub const LISTING_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <ul class="dataset-list">
    <li class="dataset-item">
      <h2 class="dataset-heading"><a href="/dataset/dataset-a">Dataset A</a></h2>
    </li>
  </ul>
</body>
</html>"#;

/// Detail page of "Dataset A" with a PDF and a CSV resource
pub const DATASET_A_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <ul class="resource-list">
    <li class="resource-item">
      <a href="/dataset/dataset-a/resource/dicionario">Dicionario<span>PDF</span></a>
    </li>
    <li class="resource-item">
      <a href="/dataset/dataset-a/resource/1">Resource A<span>CSV</span></a>
    </li>
  </ul>
</body>
</html>"#;

/// Resource page with a direct download button
pub const RESOURCE_A_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <div class="btn-group">
    <a class="btn btn-primary" href="/files/dataset-a.csv">Baixar</a>
  </div>
</body>
</html>"#;

/// Body served for the CSV download
pub const CSV_BODY: &str = "municipio;obitos\n355030;12\n330455;7\n";

/// File the pipeline writes for "Dataset A"
pub const DATASET_A_FILE: &str = "DatasetA_ResourceACSV.csv";

/// Configuration pointing every upstream at the mock server
///
/// Retries are immediate and pacing is effectively off so tests run fast.
pub fn test_config(base_url: &str, output_root: &Path) -> Config {
    let mut config = Config::default();
    config.catalog.catalog_url = format!("{base_url}{CATALOG_PATH}");
    config.catalog.site_origin = base_url.to_string();
    config.catalog.api_origin = base_url.to_string();
    config.catalog.openapi_spec_url = format!("{base_url}{SPEC_PATH}");
    config.http.max_attempts = 2;
    config.http.retry_delay_secs = 0;
    config.http.requests_per_second = 1000;
    config.http.request_timeout_secs = 5;
    config.http.download_timeout_secs = 5;
    config.http.api_timeout_secs = 5;
    config.pipeline.workers = 2;
    config.pipeline.output_root = output_root.to_path_buf();
    config.harvest.enabled = false;
    config.harvest.page_delay_ms = 0;
    config.harvest.endpoint_delay_ms = 0;
    config
}

/// API description with one paginated endpoint and several that must be ignored
pub fn api_spec() -> Value {
    let paginated = json!([
        {"name": "limit", "in": "query", "type": "integer"},
        {"name": "offset", "in": "query", "type": "integer"}
    ]);

    json!({
        "swagger": "2.0",
        "info": {"title": "API de Dados Abertos", "version": "1.0"},
        "paths": {
            "/vacinacao/doses": {
                "get": {
                    "summary": "Doses aplicadas",
                    "tags": ["Vacinacao"],
                    "parameters": paginated
                }
            },
            "/vacinacao/doses/{id}": {
                "get": {"summary": "Por id", "parameters": paginated}
            },
            "/restrito/registros": {
                "get": {
                    "summary": "Restrito",
                    "security": [{"basic": []}],
                    "parameters": paginated
                }
            },
            "/sem/paginacao": {
                "get": {"summary": "Sem paginacao", "parameters": []}
            }
        }
    })
}

/// `count` distinct records
pub fn records(start: usize, count: usize) -> Vec<Value> {
    (start..start + count)
        .map(|i| json!({"id": i, "dose": "D1"}))
        .collect()
}
