//! Process-wide cache of the last mirror sweep.
//!
//! The check-age, sweep and store sequence runs under one lock, so callers
//! arriving while a sweep is in flight wait for it and reuse its result
//! instead of starting a second one.

use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use tracing::info;

use super::{MirrorProbe, MirrorRanking, MirrorTester};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

struct CachedSweep {
    taken_at: Instant,
    ranking: MirrorRanking,
}

pub struct MirrorCache {
    clock: Box<dyn Clock>,
    state: Mutex<Option<CachedSweep>>,
}

impl MirrorCache {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(None),
        }
    }

    /// The shared instance, backed by the system clock.
    pub fn global() -> &'static MirrorCache {
        static CACHE: OnceLock<MirrorCache> = OnceLock::new();
        CACHE.get_or_init(|| MirrorCache::new(Box::new(SystemClock)))
    }

    /// The cached ranking if younger than `ttl`, otherwise a fresh sweep.
    pub fn get_cached<P: MirrorProbe>(
        &self,
        tester: &MirrorTester<P>,
        ttl: Duration,
    ) -> MirrorRanking {
        self.get_cached_with(ttl, || tester.sweep())
    }

    /// Like [`get_cached`](Self::get_cached) with an arbitrary sweep.
    pub fn get_cached_with<F>(&self, ttl: Duration, sweep: F) -> MirrorRanking
    where
        F: FnOnce() -> MirrorRanking,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();

        if let Some(cached) = state.as_ref() {
            if now.saturating_duration_since(cached.taken_at) < ttl {
                info!("Using cached mirror results");
                return cached.ranking.clone();
            }
        }

        let ranking = sweep();
        *state = Some(CachedSweep {
            taken_at: now,
            ranking: ranking.clone(),
        });
        ranking
    }

    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Age of the cached sweep, if any.
    pub fn age(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .as_ref()
            .map(|c| self.clock.now().saturating_duration_since(c.taken_at))
    }
}
