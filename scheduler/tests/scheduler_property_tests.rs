// Property-based tests for scheduling decisions and config reload

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::config_store::{JsonMonitorStore, MonitorSource};
use common::dedup::{DedupStore, MemoryBackend, DEFAULT_MAX_BYTES};
use common::errors::FetchError;
use common::models::{Monitor, Post};
use common::notifier::{NotificationSender, NotifierGateway};
use common::reddit::PostFetcher;
use common::runner::MonitorRunner;
use common::scheduler::{DueTimeTable, ManualClock, Scheduler, SchedulerConfig, SchedulerEngine};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// Mock implementations for testing

/// Counts fetches per subreddit and returns no posts
#[derive(Default)]
struct CountingFetcher {
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    fn calls_for(&self, subreddit: &str) -> usize {
        self.calls.lock().unwrap().get(subreddit).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PostFetcher for CountingFetcher {
    async fn fetch_new_posts(&self, subreddit: &str, _limit: usize) -> Result<Vec<Post>, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(subreddit.to_string())
            .or_default() += 1;
        Ok(Vec::new())
    }
}

struct CountingSender {
    sent: AtomicUsize,
}

#[async_trait]
impl NotificationSender for CountingSender {
    async fn send(&self, _title: &str, _body: &str, _targets: &[String]) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn engine_over(
    source: Arc<dyn MonitorSource>,
    fetcher: Arc<CountingFetcher>,
    clock: Arc<ManualClock>,
) -> SchedulerEngine {
    let cancel = CancellationToken::new();
    let runner = MonitorRunner::new(
        fetcher,
        Arc::new(DedupStore::new(Arc::new(MemoryBackend::new()), DEFAULT_MAX_BYTES)),
        NotifierGateway::new(
            Arc::new(CountingSender {
                sent: AtomicUsize::new(0),
            }),
            Vec::new(),
        ),
        cancel.clone(),
    )
    .with_clock(clock.clone());
    SchedulerEngine::new(SchedulerConfig::default(), source, runner, cancel).with_clock(clock)
}

fn write_monitors(path: &std::path::Path, monitors: serde_json::Value) {
    std::fs::write(
        path,
        serde_json::to_vec(&json!({ "subreddits_to_search": monitors })).unwrap(),
    )
    .unwrap();
}

/// *For any* cooldown and any elapsed time since the last dispatch, a monitor
/// is due exactly when the elapsed time reaches the cooldown
#[test]
fn property_due_iff_cooldown_elapsed() {
    proptest!(|(cooldown_minutes in 1u32..240, elapsed_seconds in 0i64..(240 * 60 * 2))| {
        let mut monitor = Monitor::new("m1", "test");
        monitor.cooldown_minutes = cooldown_minutes;

        let start = Utc::now();
        let mut table = DueTimeTable::new();
        prop_assert!(table.is_due(&monitor, start));

        table.mark_dispatched(&monitor.id, start);
        let now = start + Duration::seconds(elapsed_seconds);
        let expected = elapsed_seconds >= i64::from(cooldown_minutes) * 60;
        prop_assert_eq!(table.is_due(&monitor, now), expected);
        prop_assert_eq!(table.remaining(&monitor, now).is_none(), expected);
    });
}

/// *For any* sequence of cycle gaps, the engine runs a monitor exactly as
/// often as a direct simulation of its cooldown predicts
#[test]
fn property_engine_runs_match_cooldown_simulation() {
    proptest!(ProptestConfig::with_cases(24), |(
        cooldown_minutes in 1u32..30,
        gaps in proptest::collection::vec(0i64..1200, 1..20)
    )| {
        let mut monitor = Monitor::new("m1", "alpha");
        monitor.cooldown_minutes = cooldown_minutes;
        let cooldown = i64::from(cooldown_minutes) * 60;

        // Simulate: first cycle always runs, later ones when the gap since the last run reaches the cooldown
        let mut expected = 1usize;
        let mut since_last = 0i64;
        for gap in &gaps {
            since_last += gap;
            if since_last >= cooldown {
                expected += 1;
                since_last = 0;
            }
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("search.json");
        write_monitors(&path, json!([monitor]));

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = engine_over(Arc::new(JsonMonitorStore::new(&path)), fetcher.clone(), clock.clone());

        runtime().block_on(async {
            engine.load_initial().await.unwrap();
            engine.run_cycle().await;
            for gap in &gaps {
                clock.advance(Duration::seconds(*gap));
                engine.run_cycle().await;
            }
        });

        prop_assert_eq!(fetcher.calls_for("alpha"), expected);
    });
}

/// In-memory source whose contents and marker tests can flip
struct SwitchableSource {
    current: Mutex<(Option<std::time::SystemTime>, Result<Vec<Monitor>, String>)>,
}

#[async_trait]
impl MonitorSource for SwitchableSource {
    fn modified_marker(&self) -> Option<std::time::SystemTime> {
        self.current.lock().unwrap().0
    }

    async fn load_monitors(&self) -> Result<Vec<Monitor>, common::errors::ConfigStoreError> {
        self.current
            .lock()
            .unwrap()
            .1
            .clone()
            .map_err(common::errors::ConfigStoreError::InvalidJson)
    }
}

/// *For any* interleaving of valid and invalid reloads, the engine's monitor
/// list always equals the most recent valid document
#[test]
fn property_invalid_reload_keeps_last_valid_list() {
    proptest!(|(updates in proptest::collection::vec(proptest::option::of(1usize..6), 1..15))| {
        let initial = vec![Monitor::new("m0", "zero")];
        let source = Arc::new(SwitchableSource {
            current: Mutex::new((Some(std::time::UNIX_EPOCH), Ok(initial.clone()))),
        });
        let engine = engine_over(
            source.clone(),
            Arc::new(CountingFetcher::default()),
            Arc::new(ManualClock::new(Utc::now())),
        );

        let mut last_valid = initial.len();
        let rt = runtime();
        rt.block_on(engine.load_initial()).unwrap();

        for (step, update) in updates.iter().enumerate() {
            let marker = std::time::UNIX_EPOCH + std::time::Duration::from_secs(step as u64 + 1);
            let contents = match update {
                Some(count) => {
                    last_valid = *count;
                    Ok((0..*count).map(|i| Monitor::new(format!("m{}", i), &format!("sub{}", i))).collect())
                }
                None => Err("Expecting value: line 1 column 1".to_string()),
            };
            *source.current.lock().unwrap() = (Some(marker), contents);

            rt.block_on(engine.run_cycle());
            prop_assert_eq!(rt.block_on(engine.monitors()).len(), last_valid);
        }
    });
}

/// Monitors that share a subreddit each run on their own cooldown
#[tokio::test]
async fn test_independent_cooldowns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("search.json");
    write_monitors(
        &path,
        json!([
            {"id": "fast", "subreddit": "alpha", "cooldown_minutes": 1},
            {"id": "slow", "subreddit": "beta", "cooldown_minutes": 10},
            {"id": "off", "subreddit": "gamma", "enabled": false}
        ]),
    );

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let fetcher = Arc::new(CountingFetcher::default());
    let engine = engine_over(Arc::new(JsonMonitorStore::new(&path)), fetcher.clone(), clock.clone());
    engine.load_initial().await.unwrap();

    for _ in 0..10 {
        engine.run_cycle().await;
        clock.advance(Duration::seconds(120));
    }

    assert_eq!(fetcher.calls_for("alpha"), 10);
    assert_eq!(fetcher.calls_for("beta"), 2);
    assert_eq!(fetcher.calls_for("gamma"), 0);
}

/// Editing the document on disk is picked up on the next cycle
#[tokio::test]
async fn test_reload_on_document_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("search.json");
    write_monitors(&path, json!([{"subreddit": "alpha"}]));

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let fetcher = Arc::new(CountingFetcher::default());
    let engine = engine_over(Arc::new(JsonMonitorStore::new(&path)), fetcher.clone(), clock.clone());
    engine.load_initial().await.unwrap();
    engine.run_cycle().await;

    // Coarse filesystem timestamps need a visible gap
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    write_monitors(&path, json!([{"subreddit": "alpha"}, {"subreddit": "beta"}]));

    let report = engine.run_cycle().await;
    assert_eq!(report.due, 1);
    assert_eq!(fetcher.calls_for("beta"), 1);
    assert_eq!(engine.monitors().await.len(), 2);
}

/// The loop exits promptly after stop
#[tokio::test]
async fn test_stop_interrupts_sleep() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("search.json");
    write_monitors(&path, json!([{"subreddit": "alpha"}]));

    let fetcher = Arc::new(CountingFetcher::default());
    let engine = Arc::new(engine_over(
        Arc::new(JsonMonitorStore::new(&path)),
        fetcher.clone(),
        Arc::new(ManualClock::new(Utc::now())),
    ));

    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start().await })
    };
    while fetcher.calls_for("alpha") == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    engine.stop().await.unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
