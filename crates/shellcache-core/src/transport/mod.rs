//! Network transport used by the strategies and the lifecycle events.
//!
//! `Transport::fetch` fails only when the network cannot be reached.
//! Any HTTP status, including 4xx/5xx, is an `Ok` response.

pub mod http;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::models::{Request, Response};

pub use http::HttpTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, TransportError>;
}
