//! Integration tests with mock HTTP server

pub mod mock_server;
pub mod http_batch;
pub mod http_single;
