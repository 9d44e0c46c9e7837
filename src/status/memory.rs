//! In-memory status cache with manual TTL control.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{CacheError, JobStatusRecord, StatusCache};

struct Entry {
    record: JobStatusRecord,
    expires_at: Instant,
}

/// Process-local [`StatusCache`] implementation.
///
/// Expiry is computed against a manually advanced clock so tests can force
/// eviction without sleeping: [`MemoryStatusCache::advance`] moves time
/// forward, [`MemoryStatusCache::expire`] drops a single key.
#[derive(Default)]
pub struct MemoryStatusCache {
    entries: Mutex<HashMap<Uuid, Entry>>,
    /// Simulated time offset added to `Instant::now()`.
    skew: Mutex<Duration>,
}

impl MemoryStatusCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the simulated clock, expiring entries whose TTL has passed.
    pub fn advance(&self, by: Duration) {
        let mut skew = self.skew.lock().expect("clock lock poisoned");
        *skew += by;
    }

    /// Returns the number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.now();
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.values().filter(|e| e.expires_at > now).count()
    }

    /// Returns whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn now(&self) -> Instant {
        let skew = *self.skew.lock().expect("clock lock poisoned");
        Instant::now() + skew
    }
}

#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn set(
        &self,
        job_id: Uuid,
        record: &JobStatusRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = self.now() + ttl;
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            job_id,
            Entry {
                record: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobStatusRecord>, CacheError> {
        let now = self.now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        match entries.get(&job_id) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.record.clone())),
            Some(_) => {
                // Expired; drop it opportunistically.
                entries.remove(&job_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn expire(&self, job_id: Uuid) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.remove(&job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::JobState;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryStatusCache::new();
        let job_id = Uuid::new_v4();
        let record = JobStatusRecord::new(JobState::Processing, 30, "generating design");

        cache
            .set(job_id, &record, Duration::from_secs(60))
            .await
            .expect("set");

        let fetched = cache.get(job_id).await.expect("get").expect("present");
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_absent_key_is_none() {
        let cache = MemoryStatusCache::new();
        assert!(cache.get(Uuid::new_v4()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_via_advance() {
        let cache = MemoryStatusCache::new();
        let job_id = Uuid::new_v4();

        cache
            .set(job_id, &JobStatusRecord::queued(), Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(cache.len(), 1);

        cache.advance(Duration::from_secs(61));

        assert!(cache.get(job_id).await.expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_expire() {
        let cache = MemoryStatusCache::new();
        let job_id = Uuid::new_v4();

        cache
            .set(job_id, &JobStatusRecord::queued(), Duration::from_secs(60))
            .await
            .expect("set");
        cache.expire(job_id).await.expect("expire");

        assert!(cache.get(job_id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryStatusCache::new();
        let job_id = Uuid::new_v4();

        cache
            .set(job_id, &JobStatusRecord::queued(), Duration::from_secs(60))
            .await
            .expect("first");
        cache
            .set(job_id, &JobStatusRecord::completed(), Duration::from_secs(60))
            .await
            .expect("second");

        let fetched = cache.get(job_id).await.expect("get").expect("present");
        assert_eq!(fetched.status, JobState::Completed);
        assert_eq!(fetched.progress, 100);
    }
}
