use std::collections::BTreeMap;
use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// An intercepted resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
        }
    }

    /// Build a GET request from an absolute URL string.
    pub fn get(url: &str) -> CacheResult<Self> {
        Self::parse("GET", url)
    }

    /// Build a request from a method name and an absolute URL string.
    pub fn parse(method: &str, url: &str) -> CacheResult<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CacheError::InvalidRequest(format!("bad method: {}", method)))?;
        let url = Url::parse(url)
            .map_err(|e| CacheError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    /// Build a GET request for a path on the given origin.
    pub fn for_path(origin: &Url, path: &str) -> CacheResult<Self> {
        let url = origin
            .join(path)
            .map_err(|e| CacheError::InvalidRequest(format!("{}: {}", path, e)))?;
        Ok(Self::new(Method::GET, url))
    }

    /// Add a header (names are stored lowercased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Serialized origin (`scheme://host[:port]`).
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Only plain retrievals are eligible for caching.
    pub fn is_safe(&self) -> bool {
        self.method == Method::GET
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Canonical cache key: method plus URL with any fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method, url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
