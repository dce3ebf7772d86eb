// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use redqueue_app::{
    AppConfig, AppHandle,
    tasks::{TaskConfig, URL_TASK_KEY},
};
use redqueue_common_storage_queue::QueueConfig;
use redqueue_common_telemetry::init_default_ut_logging;
use redqueue_server::MemcacheServerConfig;
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};

fn config(dir: &TempDir, tasks_enabled: bool) -> AppConfig {
    AppConfig::builder()
        .memcache(
            MemcacheServerConfig::builder()
                .bind_address("127.0.0.1:0".to_string())
                .build(),
        )
        .queue(QueueConfig {
            journal_dir: dir.path().to_path_buf(),
            ..QueueConfig::default()
        })
        .tasks(
            TaskConfig::builder()
                .enabled(tasks_enabled)
                .max_start_jitter(Duration::ZERO)
                .build(),
        )
        .enable_graceful_shutdown(false)
        .build()
}

async fn start(config: AppConfig) -> AppHandle {
    init_default_ut_logging();
    let handle = config.open().start().await.unwrap();
    assert!(handle.is_running());
    handle
}

async fn stop(mut handle: AppHandle) {
    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(15), handle.wait_for_shutdown())
        .await
        .unwrap();
    assert!(!handle.is_running());
}

async fn set(stream: &mut BufReader<TcpStream>, key: &str, payload: &str) {
    let command = format!("set {key} 0 0 {}\r\n{payload}\r\n", payload.len());
    stream.get_mut().write_all(command.as_bytes()).await.unwrap();
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    assert_eq!(line, "STORED\r\n");
}

/// Minimal HTTP server reporting the path of every request it answers.
async fn http_recorder() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut stream = BufReader::new(stream);
                let mut request_line = String::new();
                stream.read_line(&mut request_line).await.unwrap();
                loop {
                    let mut header = String::new();
                    if stream.read_line(&mut header).await.unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }
                let path = request_line.split(' ').nth(1).unwrap_or_default().to_owned();
                stream
                    .get_mut()
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await
                    .unwrap();
                let _ = tx.send(path);
            });
        }
    });
    (base, rx)
}

#[tokio::test]
async fn test_url_task_fetches_queued_urls() {
    let dir = TempDir::new().unwrap();
    let (base, mut requests) = http_recorder().await;
    let handle = start(config(&dir, true)).await;

    let mut client = BufReader::new(TcpStream::connect(handle.local_addr()).await.unwrap());
    set(&mut client, URL_TASK_KEY, &format!(r#""{base}/plain""#)).await;
    set(&mut client, URL_TASK_KEY, "not json").await;
    set(&mut client, URL_TASK_KEY, &format!(r#"{{"url": "{base}/object"}}"#)).await;

    let mut seen = Vec::new();
    for _ in 0..2 {
        let path = tokio::time::timeout(Duration::from_secs(10), requests.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(path);
    }
    seen.sort();
    assert_eq!(seen, vec!["/object", "/plain"]);

    // The malformed payload was consumed rather than retried.
    let factory = handle.factory();
    assert!(
        factory
            .lock()
            .get_queue(URL_TASK_KEY, false)
            .unwrap()
            .is_none_or(|queue| queue.is_empty())
    );

    stop(handle).await;
}

#[tokio::test]
async fn test_queues_survive_app_restart() {
    let dir = TempDir::new().unwrap();

    let handle = start(config(&dir, false)).await;
    let mut client = BufReader::new(TcpStream::connect(handle.local_addr()).await.unwrap());
    set(&mut client, "jobs", "persisted").await;
    drop(client);
    stop(handle).await;

    let handle = start(config(&dir, false)).await;
    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"get jobs\r\n").await.unwrap();
    let expected = b"VALUE jobs 0 9\r\npersisted\r\nEND\r\n";
    let mut reply = vec![0; expected.len()];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, expected);

    stop(handle).await;
}
