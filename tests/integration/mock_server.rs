//! Mock HTTP server setup for integration tests

use mockito::{Matcher, Mock, Server, ServerGuard};
use parallel_requests::{ClientConfig, HttpTransport, Transport};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Client config pointing at the mock server
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new().with_base_url(format!("{}/", self.base_url))
    }

    /// HTTP transport resolving relative URLs against the mock server
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport_with(self.config())
    }

    pub fn transport_with(&self, config: ClientConfig) -> Arc<dyn Transport> {
        Arc::new(HttpTransport::new(config).expect("valid mock server config"))
    }

    /// Create a mock for a JSON response
    pub async fn mock_json(&self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock for a plain-text response
    pub async fn mock_text(&self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "text/plain")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock that only answers when every matcher holds
    pub async fn mock_matching(
        &self,
        method: &str,
        path: &str,
        query: Matcher,
        header: (&str, Matcher),
        body: Matcher,
        response: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .match_query(query)
            .match_header(header.0, header.1)
            .match_body(body)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response)
            .expect(1)
            .create_async()
            .await
    }
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
