//! Mirror latency testing
//!
//! A sweep probes every catalog entry concurrently and ranks the results:
//! reachable mirrors first, fastest first, then the failures. Each probe
//! is a small ranged GET with its own timeout, so the sweep's wall clock is
//! bounded by the slowest single probe rather than the sum of them.

pub mod cache;
pub mod catalog;

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

pub use cache::{Clock, DEFAULT_CACHE_TTL, ManualClock, MirrorCache, SystemClock};
pub use catalog::{DEFAULT_MIRROR, MirrorEntry, WORLDWIDE_MIRRORS};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
/// Bytes requested and read per probe.
pub const PROBE_SIZE: usize = 2048;
pub const MAX_PARALLEL_MIRRORS: usize = 20;
pub const USER_AGENT: &str = "GamerX-Installer/3.0 (Arch Linux)";

const MAX_REASON_LEN: usize = 50;

/// Measures one mirror. Returns the latency in milliseconds or a short
/// failure reason.
pub trait MirrorProbe: Send + Sync {
    fn probe(&self, entry: &MirrorEntry) -> Result<u64, String>;
}

/// Probes over HTTP(S) with a ranged GET for the first [`PROBE_SIZE`] bytes
/// of the mirror's `core.db`.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

impl MirrorProbe for HttpProbe {
    fn probe(&self, entry: &MirrorEntry) -> Result<u64, String> {
        let url = entry.test_url();
        let started = Instant::now();

        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .set("Range", &format!("bytes=0-{}", PROBE_SIZE - 1))
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => format!("HTTP {}", code),
                other => shorten(&other.to_string()),
            })?;

        let mut buf = Vec::with_capacity(PROBE_SIZE);
        response
            .into_reader()
            .take(PROBE_SIZE as u64)
            .read_to_end(&mut buf)
            .map_err(|e| shorten(&e.to_string()))?;

        Ok(started.elapsed().as_millis() as u64)
    }
}

fn shorten(reason: &str) -> String {
    if reason.chars().count() > MAX_REASON_LEN {
        let cut: String = reason.chars().take(MAX_REASON_LEN).collect();
        format!("{}...", cut)
    } else {
        reason.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MirrorOutcome {
    Reachable { latency_ms: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorResult {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: MirrorOutcome,
}

impl MirrorResult {
    pub fn latency_ms(&self) -> Option<u64> {
        match self.outcome {
            MirrorOutcome::Reachable { latency_ms } => Some(latency_ms),
            MirrorOutcome::Failed { .. } => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.latency_ms().is_some()
    }

    /// `Name (123ms)` or `Name (Failed: reason)`.
    pub fn display_name(&self) -> String {
        match &self.outcome {
            MirrorOutcome::Reachable { latency_ms } => format!("{} ({}ms)", self.name, latency_ms),
            MirrorOutcome::Failed { reason } => format!("{} (Failed: {})", self.name, reason),
        }
    }
}

/// Sweep results: reachable mirrors ascending by latency, then failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MirrorRanking(Vec<MirrorResult>);

impl MirrorRanking {
    pub fn from_results(results: Vec<MirrorResult>) -> Self {
        let (mut reachable, failed): (Vec<_>, Vec<_>) =
            results.into_iter().partition(MirrorResult::is_reachable);
        reachable.sort_by_key(|r| r.latency_ms());
        reachable.extend(failed);
        Self(reachable)
    }

    /// Top-ranked reachable mirror.
    pub fn fastest(&self) -> Option<&MirrorResult> {
        self.0.first().filter(|r| r.is_reachable())
    }

    pub fn reachable_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_reachable()).count()
    }

    pub fn results(&self) -> &[MirrorResult] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Runs sweeps over a catalog with a bounded pool of worker threads.
pub struct MirrorTester<P> {
    probe: P,
    catalog: Vec<MirrorEntry>,
    max_workers: usize,
}

impl MirrorTester<HttpProbe> {
    /// The worldwide catalog over HTTP with the default limits.
    pub fn worldwide() -> Self {
        Self::new(HttpProbe::default(), WORLDWIDE_MIRRORS.to_vec())
    }
}

impl<P: MirrorProbe> MirrorTester<P> {
    pub fn new(probe: P, catalog: Vec<MirrorEntry>) -> Self {
        Self {
            probe,
            catalog,
            max_workers: MAX_PARALLEL_MIRRORS,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn catalog(&self) -> &[MirrorEntry] {
        &self.catalog
    }

    /// Probe every catalog entry. Always yields one result per entry.
    pub fn sweep(&self) -> MirrorRanking {
        let total = self.catalog.len();
        let workers = self.max_workers.min(total);
        info!("Testing {} mirrors with {} parallel workers", total, workers);

        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(entry) = self.catalog.get(index) else {
                            break;
                        };
                        let outcome = self.probe_one(entry);
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<Option<MirrorOutcome>> = vec![None; total];
        for (index, outcome) in rx {
            outcomes[index] = Some(outcome);
        }

        let results = self
            .catalog
            .iter()
            .zip(outcomes)
            .map(|(entry, outcome)| MirrorResult {
                name: entry.name.to_string(),
                url: entry.url.to_string(),
                outcome: outcome.unwrap_or_else(|| MirrorOutcome::Failed {
                    reason: "no result".to_string(),
                }),
            })
            .collect();

        let ranking = MirrorRanking::from_results(results);
        info!(
            "Mirror testing complete: {} of {} reachable",
            ranking.reachable_count(),
            ranking.len()
        );
        ranking
    }

    fn probe_one(&self, entry: &MirrorEntry) -> MirrorOutcome {
        match self.probe.probe(entry) {
            Ok(latency_ms) => {
                debug!("Mirror {}: {}ms", entry.name, latency_ms);
                MirrorOutcome::Reachable { latency_ms }
            }
            Err(reason) => {
                debug!("Mirror {} failed: {}", entry.name, reason);
                MirrorOutcome::Failed { reason }
            }
        }
    }
}
