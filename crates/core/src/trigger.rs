//! Trigger provisioner (C7): guarantees one active inbox trigger
//! (`NEW_MESSAGE`) and one active sent trigger (`EMAIL_SENT`, 1-minute
//! poll) per `(user, entity)`. Grounded in spec.md §4.7; normalizes the
//! aggregator's trigger shape through a small adapter per SPEC_FULL.md
//! §4's "`TriggerHandle` adapter" note.

use crate::connection::ConnectionStore;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    NewMessage,
    EmailSent,
}

#[derive(Debug, Clone)]
pub struct TriggerHandle {
    pub id: String,
    pub kind: TriggerKind,
}

/// The aggregator-facing half of provisioning: list/create triggers for
/// a connected entity. A production implementation talks to the
/// third-party mail aggregator SDK (out of scope, spec.md §1); this
/// trait is the seam.
#[async_trait]
pub trait TriggerProvider: Send + Sync {
    async fn list_active_triggers(&self, entity_id: &str) -> CoreResult<Vec<TriggerHandle>>;
    async fn create_trigger(&self, entity_id: &str, kind: TriggerKind) -> CoreResult<TriggerHandle>;
    /// Disables outbound trigger delivery for an entity. Called by the
    /// credit meter's post-commit pause hook when a user's balance is
    /// exhausted (spec.md §4.3).
    async fn pause_triggers(&self, entity_id: &str) -> CoreResult<()>;
}

/// `ensure_triggers(user, entity)` (spec.md §4.7 algorithm): acquires the
/// trigger-creation lock (with stale-lock force-clear), lists existing
/// triggers, creates any missing kind, and persists both ids.
pub async fn ensure_triggers(
    connection_store: &dyn ConnectionStore,
    provider: &dyn TriggerProvider,
    user_id: &str,
    entity_id: &str,
    staleness: Duration,
) -> CoreResult<(String, String)> {
    let acquired = connection_store.acquire_trigger_lock(user_id, staleness).await?;
    if !acquired {
        return Err(CoreError::LockHeld);
    }

    let result = ensure_triggers_locked(provider, entity_id).await;

    // Lock release always runs, mirroring the Python `finally` block
    // (spec.md §4.6).
    if let Err(e) = connection_store.release_trigger_lock(user_id).await {
        warn!(user_id, error = %e, "failed to release trigger lock");
    }

    let (inbox_id, sent_id) = result?;
    connection_store
        .set_triggers(user_id, &inbox_id, &sent_id)
        .await?;

    info!(user_id, entity_id, "triggers provisioned");
    Ok((inbox_id, sent_id))
}

/// Best-effort pause, called from the credit meter's post-commit hook
/// (spec.md §4.3 "if new_remaining <= 0, call pause_outbound_trigger").
/// A user with no recorded `entity_id` has nothing to pause.
pub async fn pause_triggers(connection_store: &dyn ConnectionStore, provider: &dyn TriggerProvider, user_id: &str) -> CoreResult<()> {
    let Some(entity_id) = connection_store.get(user_id).await?.and_then(|s| s.entity_id) else {
        warn!(user_id, "credits exhausted but no entity_id on file, nothing to pause");
        return Ok(());
    };
    provider.pause_triggers(&entity_id).await?;
    info!(user_id, entity_id, "outbound triggers paused after credit exhaustion");
    Ok(())
}

async fn ensure_triggers_locked(provider: &dyn TriggerProvider, entity_id: &str) -> CoreResult<(String, String)> {
    let active = provider.list_active_triggers(entity_id).await?;

    let inbox = match active.iter().find(|t| t.kind == TriggerKind::NewMessage) {
        Some(t) => t.id.clone(),
        None => provider.create_trigger(entity_id, TriggerKind::NewMessage).await?.id,
    };
    let sent = match active.iter().find(|t| t.kind == TriggerKind::EmailSent) {
        Some(t) => t.id.clone(),
        None => provider.create_trigger(entity_id, TriggerKind::EmailSent).await?.id,
    };

    Ok((inbox, sent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubProvider {
        existing: Vec<TriggerHandle>,
        create_calls: AtomicUsize,
        pause_calls: AtomicUsize,
    }

    #[async_trait]
    impl TriggerProvider for StubProvider {
        async fn list_active_triggers(&self, _entity_id: &str) -> CoreResult<Vec<TriggerHandle>> {
            Ok(self.existing.clone())
        }

        async fn create_trigger(&self, _entity_id: &str, kind: TriggerKind) -> CoreResult<TriggerHandle> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TriggerHandle {
                id: format!("new-{kind:?}"),
                kind,
            })
        }

        async fn pause_triggers(&self, _entity_id: &str) -> CoreResult<()> {
            self.pause_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubConnectionStore {
        locked: Mutex<bool>,
        entity_id: Option<String>,
    }

    #[async_trait]
    impl ConnectionStore for StubConnectionStore {
        async fn get(&self, user_id: &str) -> CoreResult<Option<crate::connection::UserConnectionState>> {
            Ok(self.entity_id.clone().map(|entity_id| crate::connection::UserConnectionState {
                user_id: user_id.to_string(),
                first_connected_at: None,
                connection_enabled: true,
                entity_id: Some(entity_id),
                inbox_trigger_id: None,
                sent_trigger_id: None,
                initial_sync_completed: false,
                initial_sync_started_at: None,
                initial_sync_completed_at: None,
                sync_in_progress: false,
                trigger_creation_in_progress: false,
                trigger_creation_started_at: None,
                total_commitments_found: 0,
            }))
        }
        async fn mark_first_connection(&self, _u: &str, _e: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn mark_reconnection(&self, _u: &str, _e: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn mark_disconnection(&self, _u: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn acquire_sync_lock(&self, _u: &str) -> CoreResult<bool> {
            Ok(true)
        }
        async fn release_sync_lock(&self, _u: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn acquire_trigger_lock(&self, _u: &str, _s: Duration) -> CoreResult<bool> {
            let mut locked = self.locked.lock().unwrap();
            if *locked {
                Ok(false)
            } else {
                *locked = true;
                Ok(true)
            }
        }
        async fn release_trigger_lock(&self, _u: &str) -> CoreResult<()> {
            *self.locked.lock().unwrap() = false;
            Ok(())
        }
        async fn set_triggers(&self, _u: &str, _i: &str, _s: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn complete_initial_sync(&self, _u: &str, _t: i64) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reuses_existing_triggers_without_creating() {
        let provider = StubProvider {
            existing: vec![
                TriggerHandle { id: "in-1".into(), kind: TriggerKind::NewMessage },
                TriggerHandle { id: "out-1".into(), kind: TriggerKind::EmailSent },
            ],
            create_calls: AtomicUsize::new(0),
            pause_calls: AtomicUsize::new(0),
        };
        let store = StubConnectionStore { locked: Mutex::new(false), entity_id: None };

        let (inbox, sent) = ensure_triggers(&store, &provider, "u1", "e1", Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(inbox, "in-1");
        assert_eq!(sent, "out-1");
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn creates_missing_trigger_kinds() {
        let provider = StubProvider { existing: vec![], create_calls: AtomicUsize::new(0), pause_calls: AtomicUsize::new(0) };
        let store = StubConnectionStore { locked: Mutex::new(false), entity_id: None };

        let (inbox, sent) = ensure_triggers(&store, &provider, "u1", "e1", Duration::minutes(5))
            .await
            .unwrap();
        assert!(inbox.starts_with("new-"));
        assert!(sent.starts_with("new-"));
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn held_lock_returns_lock_held_error() {
        let provider = StubProvider { existing: vec![], create_calls: AtomicUsize::new(0), pause_calls: AtomicUsize::new(0) };
        let store = StubConnectionStore { locked: Mutex::new(true), entity_id: None };

        let result = ensure_triggers(&store, &provider, "u1", "e1", Duration::minutes(5)).await;
        assert!(matches!(result, Err(CoreError::LockHeld)));
    }

    #[tokio::test]
    async fn pause_triggers_calls_provider_when_entity_known() {
        let provider = StubProvider { existing: vec![], create_calls: AtomicUsize::new(0), pause_calls: AtomicUsize::new(0) };
        let store = StubConnectionStore { locked: Mutex::new(false), entity_id: Some("e1".to_string()) };

        pause_triggers(&store, &provider, "u1").await.unwrap();
        assert_eq!(provider.pause_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_triggers_is_noop_without_entity() {
        let provider = StubProvider { existing: vec![], create_calls: AtomicUsize::new(0), pause_calls: AtomicUsize::new(0) };
        let store = StubConnectionStore { locked: Mutex::new(false), entity_id: None };

        pause_triggers(&store, &provider, "u1").await.unwrap();
        assert_eq!(provider.pause_calls.load(Ordering::SeqCst), 0);
    }
}
