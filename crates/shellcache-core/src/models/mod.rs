//! Data models shared by every layer of the cache manager.
//!
//! - `Request`, `RequestKey`: the intercepted request and its canonical cache key
//! - `Response`: a captured response (status, headers, body)
//! - `StoredEntry`: the persisted form of a cache entry

pub mod request;
pub mod response;

pub use request::{Request, RequestKey};
pub use response::{Response, StoredEntry};
