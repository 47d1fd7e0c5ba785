// Post filter predicate
//
// A post matches a monitor when every rule holds. All string comparisons are
// case-insensitive; rule entries are lowercased at comparison time so that
// monitors written by hand with mixed case still behave.

use crate::models::{Monitor, Post};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// The first rule a post failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRejection {
    MissingKeyword,
    ExcludedKeyword,
    BelowMinUpvotes,
    DomainNotIncluded,
    DomainExcluded,
    FlairNotIncluded,
    AuthorNotIncluded,
    AuthorExcluded,
    TooOld,
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FilterRejection::MissingKeyword => "title is missing a required keyword",
            FilterRejection::ExcludedKeyword => "title contains an excluded keyword",
            FilterRejection::BelowMinUpvotes => "score is below the minimum",
            FilterRejection::DomainNotIncluded => "domain matches none of the included domains",
            FilterRejection::DomainExcluded => "domain is excluded",
            FilterRejection::FlairNotIncluded => "flair matches none of the included flairs",
            FilterRejection::AuthorNotIncluded => "author is not in the included authors",
            FilterRejection::AuthorExcluded => "author is excluded",
            FilterRejection::TooOld => "post is older than the maximum age",
        };
        f.write_str(reason)
    }
}

/// Whether `post` passes every rule of `monitor` at time `now`
pub fn matches(post: &Post, monitor: &Monitor, now: DateTime<Utc>) -> bool {
    evaluate(post, monitor, now).is_ok()
}

/// Evaluate every rule in order and report the first one that fails
pub fn evaluate(post: &Post, monitor: &Monitor, now: DateTime<Utc>) -> Result<(), FilterRejection> {
    let title = post.title.to_lowercase();
    let domain = post.domain.to_lowercase();
    let flair = post.flair_text.as_deref().unwrap_or("").to_lowercase();
    let author = post.author.as_deref().map(str::to_lowercase);

    if !has_all_keywords(&title, &monitor.keywords) {
        return Err(FilterRejection::MissingKeyword);
    }
    if contains_any(&title, &monitor.exclude_keywords) {
        return Err(FilterRejection::ExcludedKeyword);
    }
    if !meets_upvotes(post.score, monitor.min_upvotes) {
        return Err(FilterRejection::BelowMinUpvotes);
    }
    if !monitor.domain_contains.is_empty() && !contains_any(&domain, &monitor.domain_contains) {
        return Err(FilterRejection::DomainNotIncluded);
    }
    if contains_any(&domain, &monitor.domain_excludes) {
        return Err(FilterRejection::DomainExcluded);
    }
    if !monitor.flair_contains.is_empty() && !contains_any(&flair, &monitor.flair_contains) {
        return Err(FilterRejection::FlairNotIncluded);
    }
    if !meets_author_includes(author.as_deref(), &monitor.author_includes) {
        return Err(FilterRejection::AuthorNotIncluded);
    }
    if !meets_author_excludes(author.as_deref(), &monitor.author_excludes) {
        return Err(FilterRejection::AuthorExcluded);
    }
    if !meets_max_age(post.created_at, monitor.max_post_age_hours, now) {
        return Err(FilterRejection::TooOld);
    }
    Ok(())
}

fn has_all_keywords(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .all(|keyword| haystack.contains(&keyword.to_lowercase()))
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}

fn meets_upvotes(score: i64, min_upvotes: Option<i64>) -> bool {
    min_upvotes.map_or(true, |min| score >= min)
}

fn meets_author_includes(author: Option<&str>, includes: &[String]) -> bool {
    if includes.is_empty() {
        return true;
    }
    match author {
        Some(name) => includes.iter().any(|a| a.to_lowercase() == name),
        None => false,
    }
}

fn meets_author_excludes(author: Option<&str>, excludes: &[String]) -> bool {
    match author {
        Some(name) => !excludes.iter().any(|a| a.to_lowercase() == name),
        None => true,
    }
}

fn meets_max_age(created_at: DateTime<Utc>, max_hours: Option<u32>, now: DateTime<Utc>) -> bool {
    match max_hours {
        Some(hours) => now - created_at <= Duration::hours(i64::from(hours)),
        None => true,
    }
}
