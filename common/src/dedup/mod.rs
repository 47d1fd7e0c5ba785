// Dedup store for posts that have already been notified

pub mod backend;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, SeenPostsBackend};
pub use store::{DedupKey, DedupStore, DEFAULT_MAX_BYTES};
