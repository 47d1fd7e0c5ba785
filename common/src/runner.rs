// Monitor runner: one monitor's fetch → filter → dedup → notify → record pass
//
// Failures stop at this boundary. Whatever happens inside a run is folded into
// the returned `RunOutcome`; nothing propagates to the scheduler.

use crate::dedup::{DedupKey, DedupStore};
use crate::errors::FetchError;
use crate::filter;
use crate::models::{Monitor, Post};
use crate::notifier::NotifierGateway;
use crate::reddit::PostFetcher;
use crate::scheduler::clock::{Clock, SystemClock};
use crate::telemetry;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_FETCH_LIMIT: usize = 10;

/// Where a run currently is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStage {
    #[default]
    Fetching,
    Filtering,
    Deduplicating,
    Notifying,
    Recording,
    Done,
    Errored,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RunStage::Fetching => "fetching",
            RunStage::Filtering => "filtering",
            RunStage::Deduplicating => "deduplicating",
            RunStage::Notifying => "notifying",
            RunStage::Recording => "recording",
            RunStage::Done => "done",
            RunStage::Errored => "errored",
        };
        f.write_str(stage)
    }
}

/// Summary of a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub monitor_id: String,
    pub stage: RunStage,
    pub fetched: usize,
    pub matched: usize,
    pub notified_count: usize,
    pub duplicates: usize,
    pub rate_limited: bool,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl RunOutcome {
    fn new(monitor_id: &str) -> Self {
        Self {
            monitor_id: monitor_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }

    fn outcome_label(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else if self.cancelled {
            "cancelled"
        } else if self.rate_limited {
            "rate_limited"
        } else {
            "success"
        }
    }
}

/// Executes monitor runs against shared capabilities
#[derive(Clone)]
pub struct MonitorRunner {
    fetcher: Arc<dyn PostFetcher>,
    dedup: Arc<DedupStore>,
    gateway: NotifierGateway,
    clock: Arc<dyn Clock>,
    fetch_limit: usize,
    cancel: CancellationToken,
}

impl MonitorRunner {
    pub fn new(
        fetcher: Arc<dyn PostFetcher>,
        dedup: Arc<DedupStore>,
        gateway: NotifierGateway,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            dedup,
            gateway,
            clock: Arc::new(SystemClock),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            cancel,
        }
    }

    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dedup(&self) -> &Arc<DedupStore> {
        &self.dedup
    }

    /// Run one monitor to completion. Never fails; see `RunOutcome`.
    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id, monitor_name = %monitor.name, subreddit = %monitor.subreddit))]
    pub async fn run(&self, monitor: &Monitor) -> RunOutcome {
        let mut outcome = RunOutcome::new(&monitor.id);
        info!("Searching subreddit for matches");

        let posts = match self.fetch(monitor).await {
            Ok(posts) => posts,
            Err(FetchError::RateLimited { retry_after_secs }) => {
                warn!(?retry_after_secs, "Rate limited, skipping monitor this cycle");
                outcome.rate_limited = true;
                outcome.stage = RunStage::Done;
                telemetry::record_monitor_run(&monitor.id, outcome.outcome_label());
                return outcome;
            }
            Err(FetchError::Cancelled) => {
                info!("Run cancelled during fetch");
                outcome.cancelled = true;
                telemetry::record_monitor_run(&monitor.id, outcome.outcome_label());
                return outcome;
            }
            Err(e) => {
                self.fail(monitor, &mut outcome, &e).await;
                return outcome;
            }
        };
        outcome.fetched = posts.len();

        // Age checks use one instant per run, taken after the fetch returned
        let now = self.clock.now();

        outcome.stage = RunStage::Filtering;
        let matches: Vec<&Post> = posts
            .iter()
            .filter(|post| match filter::evaluate(post, monitor, now) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(post_id = %post.id, %reason, "Post filtered out");
                    false
                }
            })
            .collect();
        outcome.matched = matches.len();
        telemetry::record_matches(&monitor.id, matches.len());

        for post in matches {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            outcome.stage = RunStage::Deduplicating;
            let key = DedupKey::new(&monitor.subreddit, &post.id);
            if !self.dedup.claim(&key).await {
                info!(post_id = %post.id, title = %post.title, "Skipping duplicate post");
                outcome.duplicates += 1;
                continue;
            }

            outcome.stage = RunStage::Notifying;
            let message = format_match_message(&monitor.subreddit, post);
            info!(post_id = %post.id, title = %post.title, "Match found");
            let title = format!("Reddit Alert: r/{}", monitor.subreddit);

            let delivered = tokio::select! {
                delivered = self.gateway.notify(&title, &message) => Some(delivered),
                _ = self.cancel.cancelled() => None,
            };
            let Some(delivered) = delivered else {
                // Not announced, so it may be picked up again on the next run
                self.dedup.release(&key).await;
                outcome.cancelled = true;
                break;
            };
            if delivered {
                outcome.notified_count += 1;
            }

            outcome.stage = RunStage::Recording;
            self.dedup.record(&key).await;
            if let Err(e) = self.dedup.persist().await {
                error!(error = %e, "Failed to persist seen posts");
            }
        }

        if !outcome.cancelled {
            outcome.stage = RunStage::Done;
        }
        info!(
            fetched = outcome.fetched,
            matched = outcome.matched,
            notified = outcome.notified_count,
            duplicates = outcome.duplicates,
            cancelled = outcome.cancelled,
            "Finished searching subreddit"
        );
        telemetry::record_monitor_run(&monitor.id, outcome.outcome_label());
        outcome
    }

    async fn fetch(&self, monitor: &Monitor) -> Result<Vec<Post>, FetchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetcher.fetch_new_posts(&monitor.subreddit, self.fetch_limit) => result,
        }
    }

    async fn fail(&self, monitor: &Monitor, outcome: &mut RunOutcome, err: &FetchError) {
        let failed_at = outcome.stage;
        outcome.stage = RunStage::Errored;
        outcome.error = Some(err.to_string());

        error!(stage = %failed_at, error = %err, "Monitor run failed");
        telemetry::record_monitor_failure(&monitor.id, &failed_at.to_string());
        telemetry::record_monitor_run(&monitor.id, outcome.outcome_label());

        let context = format!("'{}' (r/{})", monitor.name, monitor.subreddit);
        self.gateway.notify_error(&context, &err.to_string()).await;
    }
}

/// Notification body for a matching post
pub fn format_match_message(subreddit: &str, post: &Post) -> String {
    let mut message = format!(
        "Match found in '{}' subreddit:\nTitle: {}\nURL: {}\nUpvotes: {}\nPermalink: {}",
        subreddit,
        post.title,
        post.url,
        post.score,
        post.permalink_url()
    );
    if let Some(author) = &post.author {
        message.push_str(&format!("\nAuthor: u/{}", author));
    }
    if let Some(flair) = &post.flair_text {
        message.push_str(&format!("\nFlair: {}", flair));
    }
    message
}
