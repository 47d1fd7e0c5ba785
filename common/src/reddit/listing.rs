// Reddit listing wire types

use crate::models::Post;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub score: i64,
    pub permalink: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub created_utc: f64,
}

impl From<RedditPostData> for Post {
    fn from(data: RedditPostData) -> Self {
        let author = data
            .author
            .filter(|name| !name.is_empty() && name != "[deleted]");
        let flair_text = data.link_flair_text.filter(|f| !f.is_empty());

        Post {
            id: data.id,
            title: data.title,
            url: data.url,
            score: data.score,
            permalink: data.permalink,
            domain: data.domain,
            flair_text,
            author,
            created_at: timestamp_to_utc(data.created_utc),
        }
    }
}

fn timestamp_to_utc(created_utc: f64) -> DateTime<Utc> {
    let secs = created_utc.trunc() as i64;
    let nanos = ((created_utc.fract()) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_default()
}

impl RedditListing<RedditPostData> {
    /// Posts in feed order, skipping anything that is not a link (`t3`)
    pub fn into_posts(self) -> Vec<Post> {
        self.data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .map(|child| child.data.into())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_converts_in_feed_order() {
        let listing: RedditListing<RedditPostData> = serde_json::from_value(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "post1", "title": "[USA-NY] [H] RTX 4090 FE [W] PayPal",
                        "url": "https://i.redd.it/x.jpg", "score": 25,
                        "permalink": "/r/hardwareswap/comments/post1/", "domain": "i.redd.it",
                        "link_flair_text": "SELLING", "author": "seller", "created_utc": 1700000000.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "post2", "title": "deleted account post",
                        "url": "https://example.com", "score": 1,
                        "permalink": "/r/hardwareswap/comments/post2/", "domain": "example.com",
                        "link_flair_text": null, "author": "[deleted]", "created_utc": 1700000100.5
                    }}
                ]
            }
        }))
        .unwrap();

        let posts = listing.into_posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "post1");
        assert_eq!(posts[0].score, 25);
        assert_eq!(posts[0].flair_text.as_deref(), Some("SELLING"));
        assert_eq!(posts[0].created_at.timestamp(), 1_700_000_000);
        assert_eq!(posts[1].author, None);
        assert_eq!(posts[1].flair_text, None);
    }
}
