use crate::engine::OrchestratorResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Finished run results, bounded in count and age.
///
/// Oldest entries are evicted once `max_entries` is exceeded; entries older
/// than `ttl` are dropped on access.
pub struct ResultStore {
    max_entries: usize,
    ttl: Duration,
    entries: Mutex<VecDeque<(Instant, OrchestratorResult)>>,
}

impl ResultStore {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            ttl,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn insert(&self, result: OrchestratorResult) {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);
        entries.retain(|(_, r)| r.session_id != result.session_id);
        entries.push_back((Instant::now(), result));
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<OrchestratorResult> {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);
        entries
            .iter()
            .find(|(_, r)| r.session_id == session_id)
            .map(|(_, r)| r.clone())
    }

    /// Session ids currently retained, oldest first.
    pub fn session_ids(&self) -> Vec<String> {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);
        entries.iter().map(|(_, r)| r.session_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge(&self, entries: &mut VecDeque<(Instant, OrchestratorResult)>) {
        while entries
            .front()
            .is_some_and(|(at, _)| at.elapsed() >= self.ttl)
        {
            entries.pop_front();
        }
    }
}
