//! Common test utilities for integration tests.

pub mod fakes;
pub mod fixtures;

use axum::http::{Method, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

// Re-export common types
pub use fakes::*;
pub use fixtures::*;

/// Find an available port for testing.
pub fn find_available_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("Failed to bind to port");
    listener.local_addr().unwrap().port()
}

/// Test environment that manages a temporary directory.
pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes a file into the temp dir and returns its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server answering every request with a fixed status.
///
/// Keeps the method and body of each request it serves.
pub struct StatusServer {
    pub url: String,
    requests: Arc<Mutex<Vec<(Method, String)>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl StatusServer {
    pub async fn start(status: u16) -> Self {
        let code = StatusCode::from_u16(status).expect("valid status code");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        let app = Router::new().fallback(move |method: Method, body: String| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push((method, body));
                code
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url,
            requests,
            handle,
        }
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> u64 {
        self.requests.lock().len() as u64
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().clone()
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
