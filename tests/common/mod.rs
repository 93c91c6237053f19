//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use model_router::registry::Instance;

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Health endpoint whose score the test can change at any time.
#[derive(Clone)]
pub struct HealthBackend {
    pub addr: SocketAddr,
    score: Arc<AtomicU64>,
    hits: Arc<AtomicUsize>,
}

impl HealthBackend {
    pub async fn start(score: f64) -> Self {
        let cell = Arc::new(AtomicU64::new(score.to_bits()));
        let hits = Arc::new(AtomicUsize::new(0));

        let (c, h) = (cell.clone(), hits.clone());
        let addr = start_programmable_backend(move || {
            let score = f64::from_bits(c.load(Ordering::SeqCst));
            h.fetch_add(1, Ordering::SeqCst);
            async move {
                let body = format!(
                    r#"{{"health":{},"timestamp":"2024-01-01T00:00:00Z","metrics":{{"latency":12.5,"errorRate":0.01,"successRate":0.99}}}}"#,
                    score
                );
                (200, body)
            }
        })
        .await;

        Self { addr, score: cell, hits }
    }

    pub fn set_score(&self, score: f64) {
        self.score.store(score.to_bits(), Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn instance(&self, id: &str, advertised: f64) -> Instance {
        Instance::new(id, format!("http://{}", self.addr), advertised)
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
