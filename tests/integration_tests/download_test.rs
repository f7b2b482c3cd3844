//! Downloader transfer tests
//!
//! Uses a raw TCP server to control body pacing byte by byte:
//! 1. A slow but steady body outlives the timeout and still completes
//! 2. A body that stalls longer than the timeout fails and leaves no files

use coletor::crawler::download::partial_path;
use coletor::crawler::{DownloadOutcome, Downloader};
use coletor::models::{DownloadTask, ResourceFormat};
use coletor::utils::retry::RetryConfig;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `body` one byte at a time, pausing `gap` before each byte
async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for byte in body {
                    tokio::time::sleep(gap).await;
                    if socket.write_all(&[*byte]).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
            });
        }
    });

    format!("http://{addr}/dados.csv")
}

fn task(output_dir: &Path, url: String) -> DownloadTask {
    DownloadTask {
        dataset_name: "SIH".into(),
        resource_name: "Internacoes".into(),
        format: ResourceFormat::Csv,
        output_dir: output_dir.to_path_buf(),
        resolved_url: url,
        auth: None,
        suffix: None,
    }
}

#[tokio::test]
async fn test_slow_steady_transfer_completes() {
    // 8 bytes, 300ms apart: 2.4s in total, never idle for 1s
    let url = trickle_server(b"a;b\n1;2\n", Duration::from_millis(300)).await;
    let output = TempDir::new().unwrap();

    let downloader =
        Downloader::with_config(RetryConfig::immediate(2), Duration::from_secs(1), "coletor-test")
            .unwrap();
    let task = task(output.path(), url);

    let outcome = downloader.download(&task).await.unwrap();

    assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 8 });
    assert_eq!(std::fs::read(task.destination()).unwrap(), b"a;b\n1;2\n");
}

#[tokio::test]
async fn test_stalled_transfer_fails() {
    let url = trickle_server(b"a;b\n", Duration::from_secs(3)).await;
    let output = TempDir::new().unwrap();

    let downloader = Downloader::with_config(
        RetryConfig::immediate(1),
        Duration::from_millis(500),
        "coletor-test",
    )
    .unwrap();
    let task = task(output.path(), url);

    assert!(downloader.download(&task).await.is_err());
    assert!(!task.destination().exists());
    assert!(!partial_path(&task.destination()).exists());
}
