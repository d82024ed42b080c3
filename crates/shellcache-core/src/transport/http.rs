use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use tracing::debug;

use super::Transport;
use crate::error::TransportError;
use crate::models::{Request, Response};

/// Default request timeout in seconds.
/// Long enough for a slow mobile link, short enough that the cache fallback
/// kicks in before the user gives up.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

const USER_AGENT: &str = concat!("shellcache/", env!("CARGO_PKG_VERSION"));

/// HTTP transport over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        // Redirects are handed back to the caller rather than followed.
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
        let mut collected: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            // Non UTF-8 values cannot be represented in a stored entry
            let Ok(value) = value.to_str() else {
                continue;
            };
            collected
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        collected
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, bytes = body.len(), "Network fetch complete");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
