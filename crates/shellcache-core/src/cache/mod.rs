//! Named, durable key→response stores ("generations").
//!
//! `CacheStore` is the backend seam. Two backends are provided:
//! - `DiskStore`: one directory per generation, one JSON file per entry
//! - `MemoryStore`: process-local, used by tests and short-lived hosts
//!
//! Entries never expire; the last write for a key wins. A lookup against a
//! store that does not exist (or was just deleted) is a miss, not an error.

pub mod disk;
pub mod memory;
pub mod store;

pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use store::CacheStore;
