// Reddit read capability

pub mod client;
pub mod listing;

pub use client::{RedditClient, RedditClientConfig};

use crate::errors::FetchError;
use crate::models::Post;
use async_trait::async_trait;

/// Fetches the newest posts of a subreddit
#[async_trait]
pub trait PostFetcher: Send + Sync {
    /// Up to `limit` newest posts, newest first
    async fn fetch_new_posts(&self, subreddit: &str, limit: usize) -> Result<Vec<Post>, FetchError>;
}
