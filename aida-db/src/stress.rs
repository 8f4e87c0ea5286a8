//! A fixed worker pool that issues a list of recorded JSON-RPC queries, with
//! a shared atomic work-index counter and mutex-guarded stats aggregation.
//! Grounded on `tools/state-viewer`'s RPC client usage, with the worker pool
//! hand-rolled over `std::thread`: a bounded pool whose size is
//! configuration-driven, each worker owning its own HTTP client rather than
//! sharing a pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::stats::PercentileReport;

const TIMEOUT_MARKER: &str = "context deadline exceeded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success,
    Timeout,
    Error(String),
}

/// Aggregated results across every worker: counters plus timing samples,
/// collected into a single slice behind one mutex.
#[derive(Debug, Default)]
pub struct StressStats {
    pub successes: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub timings: Vec<Duration>,
}

impl StressStats {
    pub fn percentile_report(&self) -> PercentileReport {
        PercentileReport::new(self.timings.clone())
    }
}

fn classify(result: &Result<Value, reqwest::Error>) -> QueryOutcome {
    match result {
        Ok(_) => QueryOutcome::Success,
        Err(e) => {
            let message = e.to_string();
            if message.contains(TIMEOUT_MARKER) || e.is_timeout() {
                QueryOutcome::Timeout
            } else {
                QueryOutcome::Error(message)
            }
        }
    }
}

fn send_query(client: &reqwest::blocking::Client, url: &str, body: &Value) -> Result<Value, reqwest::Error> {
    client.post(url).json(body).send()?.json::<Value>()
}

/// Runs `queries` against `url` with `worker_count` threads. Each worker
/// owns its own blocking HTTP client; a shared atomic counter dispenses
/// work indices so no two workers process the same query. Timeouts never
/// abort the run; they are tallied in the returned stats.
pub fn run_stress(url: &str, queries: Vec<Value>, worker_count: usize, timeout: Duration) -> StressStats {
    let queries = Arc::new(queries);
    let next_index = Arc::new(AtomicUsize::new(0));
    let stats = Arc::new(Mutex::new(StressStats::default()));

    thread::scope(|scope| {
        for _ in 0..worker_count.max(1) {
            let queries = Arc::clone(&queries);
            let next_index = Arc::clone(&next_index);
            let stats = Arc::clone(&stats);
            let url = url.to_string();
            scope.spawn(move || {
                let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                    Ok(c) => c,
                    Err(_) => return,
                };
                loop {
                    let index = next_index.fetch_add(1, Ordering::SeqCst);
                    let Some(query) = queries.get(index) else { break };
                    let start = Instant::now();
                    let result = send_query(&client, &url, query);
                    let elapsed = start.elapsed();
                    let outcome = classify(&result);
                    let mut s = stats.lock();
                    s.timings.push(elapsed);
                    match outcome {
                        QueryOutcome::Success => s.successes += 1,
                        QueryOutcome::Timeout => s.timeouts += 1,
                        QueryOutcome::Error(_) => s.errors += 1,
                    }
                }
            });
        }
    });

    Arc::try_unwrap(stats).expect("all worker threads joined").into_inner()
}
