//! Soft-delete shadow store (spec.md §3/§4.4): a TTL-backed external
//! cache holding the full prior document of a deleted commitment, keyed
//! `deleted:{user}:{commitment_id}`, 24h expiry. Backed by Redis, same
//! client the teacher already depends on.

use crate::commitment::Commitment;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

const SHADOW_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowEntry {
    pub commitment: Commitment,
    pub deleted_at: OffsetDateTime,
}

#[async_trait]
pub trait ShadowStore: Send + Sync {
    async fn put(&self, user_id: &str, commitment: &Commitment, deleted_at: OffsetDateTime) -> CoreResult<()>;
    async fn take(&self, user_id: &str, commitment_id: &str) -> CoreResult<Option<ShadowEntry>>;
    async fn list(&self, user_id: &str, limit: i64) -> CoreResult<Vec<ShadowEntry>>;
}

pub struct RedisShadowStore {
    client: redis::Client,
}

impl RedisShadowStore {
    pub fn new(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn key(user_id: &str, commitment_id: &str) -> String {
        format!("deleted:{user_id}:{commitment_id}")
    }

    fn index_key(user_id: &str) -> String {
        format!("deleted-index:{user_id}")
    }
}

#[async_trait]
impl ShadowStore for RedisShadowStore {
    async fn put(&self, user_id: &str, commitment: &Commitment, deleted_at: OffsetDateTime) -> CoreResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let entry = ShadowEntry {
            commitment: commitment.clone(),
            deleted_at,
        };
        let payload = serde_json::to_string(&entry)?;
        let key = Self::key(user_id, &commitment.id.to_string());

        let _: () = conn
            .set_ex(&key, payload, SHADOW_TTL_SECONDS as u64)
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let index = Self::index_key(user_id);
        let _: () = conn
            .zadd(&index, &key, deleted_at.unix_timestamp())
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;
        let _: () = conn
            .expire(&index, SHADOW_TTL_SECONDS)
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        Ok(())
    }

    async fn take(&self, user_id: &str, commitment_id: &str) -> CoreResult<Option<ShadowEntry>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let key = Self::key(user_id, commitment_id);
        let payload: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let entry: ShadowEntry = serde_json::from_str(&payload)?;

        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;
        let _: () = conn
            .zrem(Self::index_key(user_id), &key)
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        Ok(Some(entry))
    }

    async fn list(&self, user_id: &str, limit: i64) -> CoreResult<Vec<ShadowEntry>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let index = Self::index_key(user_id);
        let keys: Vec<String> = conn
            .zrevrange(&index, 0, limit.saturating_sub(1).max(0))
            .await
            .map_err(|e| CoreError::ShadowStoreUnavailable(e.to_string()))?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let payload: Option<String> = conn.get(&key).await.ok().flatten();
            match payload {
                Some(payload) => match serde_json::from_str::<ShadowEntry>(&payload) {
                    Ok(entry) => out.push(entry),
                    Err(e) => warn!(error = %e, "corrupt shadow entry, skipping"),
                },
                None => {
                    // Entry expired out of the hash but is still in the
                    // sorted-set index; drop it lazily rather than fail
                    // the whole listing.
                    let _: Result<(), _> = conn.zrem(&index, &key).await;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory double used by pipeline/store tests that don't need a
    /// live Redis instance.
    #[derive(Default)]
    pub struct InMemoryShadowStore {
        entries: tokio::sync::Mutex<std::collections::HashMap<String, Vec<(String, ShadowEntry)>>>,
    }

    #[async_trait]
    impl ShadowStore for InMemoryShadowStore {
        async fn put(&self, user_id: &str, commitment: &Commitment, deleted_at: OffsetDateTime) -> CoreResult<()> {
            let mut map = self.entries.lock().await;
            map.entry(user_id.to_string()).or_default().push((
                commitment.id.to_string(),
                ShadowEntry {
                    commitment: commitment.clone(),
                    deleted_at,
                },
            ));
            Ok(())
        }

        async fn take(&self, user_id: &str, commitment_id: &str) -> CoreResult<Option<ShadowEntry>> {
            let mut map = self.entries.lock().await;
            let Some(list) = map.get_mut(user_id) else {
                return Ok(None);
            };
            if let Some(pos) = list.iter().position(|(id, _)| id == commitment_id) {
                Ok(Some(list.remove(pos).1))
            } else {
                Ok(None)
            }
        }

        async fn list(&self, user_id: &str, limit: i64) -> CoreResult<Vec<ShadowEntry>> {
            let map = self.entries.lock().await;
            let mut entries: Vec<ShadowEntry> = map
                .get(user_id)
                .map(|v| v.iter().map(|(_, e)| e.clone()).collect())
                .unwrap_or_default();
            entries.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
            entries.truncate(limit.max(0) as usize);
            Ok(entries)
        }
    }

    #[tokio::test]
    async fn put_then_take_round_trips_and_removes_entry() {
        let store = InMemoryShadowStore::default();
        let commitment = Commitment::new_for_test();
        let now = OffsetDateTime::now_utc();
        store.put("u1", &commitment, now).await.unwrap();

        let taken = store.take("u1", &commitment.id.to_string()).await.unwrap();
        assert!(taken.is_some());
        assert_eq!(taken.unwrap().commitment.id, commitment.id);

        let missing = store.take("u1", &commitment.id.to_string()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_sorts_by_deleted_at_desc_and_respects_limit() {
        let store = InMemoryShadowStore::default();
        let mut c1 = Commitment::new_for_test();
        c1.id = uuid::Uuid::new_v4();
        let mut c2 = Commitment::new_for_test();
        c2.id = uuid::Uuid::new_v4();

        let t1 = OffsetDateTime::UNIX_EPOCH;
        let t2 = OffsetDateTime::UNIX_EPOCH + time::Duration::days(1);

        store.put("u1", &c1, t1).await.unwrap();
        store.put("u1", &c2, t2).await.unwrap();

        let listed = store.list("u1", 1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].commitment.id, c2.id);
    }
}
