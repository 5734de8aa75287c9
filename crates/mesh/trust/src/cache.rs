//! Bounded per-agent score cache.
//!
//! Capacity and TTL are documented `TrustConfig` tunables, never an
//! unbounded process-global map. Writes go through the cache's per-key
//! atomic compute, which gives each agent entry a single effective
//! writer: whichever snapshot carries the greater `window_end` stays,
//! regardless of arrival order.

use mesh_types::{AgentId, TrustScoreSnapshot};
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use std::time::Duration;

/// Freshest known score per agent, bounded by capacity and TTL.
pub struct ScoreCache {
    inner: Cache<AgentId, TrustScoreSnapshot>,
}

impl ScoreCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<TrustScoreSnapshot> {
        self.inner.get(agent_id)
    }

    /// Install the snapshot unless a newer window is already cached.
    /// Returns whether the cache now holds this snapshot.
    pub fn apply(&self, snapshot: TrustScoreSnapshot) -> bool {
        let result = self
            .inner
            .entry(snapshot.agent_id.clone())
            .and_compute_with(|current| match current {
                Some(entry) if entry.value().window.end >= snapshot.window.end => Op::Nop,
                _ => Op::Put(snapshot.clone()),
            });
        matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    pub fn len(&self) -> usize {
        self.inner.run_pending_tasks();
        self.inner.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use mesh_types::{ScoreWindow, TrustWeights};

    fn snapshot(agent: &str, window_end: chrono::DateTime<Utc>) -> TrustScoreSnapshot {
        let window = ScoreWindow::new(window_end - ChronoDuration::hours(1), window_end);
        TrustScoreSnapshot::neutral(AgentId::new(agent), TrustWeights::default(), window)
    }

    #[test]
    fn apply_keeps_newest_window() {
        let cache = ScoreCache::new(100, Duration::from_secs(600));
        let now = Utc::now();

        assert!(cache.apply(snapshot("agent-1", now)));
        // Recomputation of an older window arrives late and must lose.
        assert!(!cache.apply(snapshot("agent-1", now - ChronoDuration::hours(2))));

        let cached = cache.get(&AgentId::new("agent-1")).unwrap();
        assert_eq!(cached.window.end, now);
    }

    #[test]
    fn apply_replaces_with_newer_window() {
        let cache = ScoreCache::new(100, Duration::from_secs(600));
        let now = Utc::now();

        assert!(cache.apply(snapshot("agent-1", now)));
        let later = now + ChronoDuration::hours(1);
        assert!(cache.apply(snapshot("agent-1", later)));
        assert_eq!(
            cache.get(&AgentId::new("agent-1")).unwrap().window.end,
            later
        );
    }

    #[test]
    fn distinct_agents_get_distinct_entries() {
        let cache = ScoreCache::new(100, Duration::from_secs(600));
        let now = Utc::now();
        cache.apply(snapshot("agent-1", now));
        cache.apply(snapshot("agent-2", now));
        assert_eq!(cache.len(), 2);
    }
}
