//! Change-event deduplication.
//!
//! Every call that resolves "the current environment for scope X" must
//! decide whether to fire a change notification. The hub keeps a
//! last-observed table keyed by [`ScopeKey`]; the table is updated
//! synchronously inside the lock and the event is dispatched on a
//! spawned task afterwards, so two interleaved resolutions for the same
//! scope can never both observe the stale value and double-fire.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use log::debug;
use manager_api::PythonEnvironment;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Key space for the last-observed table.
///
/// A tagged enum rather than a raw string, so the global sentinel can
/// never collide with a project path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    Project(PathBuf),
}

/// Fired when the environment governing a scope changes.
#[derive(Debug, Clone)]
pub struct EnvironmentChangeEvent {
    pub scope_key: ScopeKey,
    /// Resource the change applies to, when scoped to one.
    pub uri: Option<PathBuf>,
    pub old: Option<PythonEnvironment>,
    pub new: Option<PythonEnvironment>,
}

/// Deduplicates environment-change notifications against the
/// last-observed table before fanning them out.
pub struct ChangeEventHub {
    previous: StdMutex<HashMap<ScopeKey, Option<PythonEnvironment>>>,
    tx: broadcast::Sender<EnvironmentChangeEvent>,
}

impl Default for ChangeEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeEventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            previous: StdMutex::new(HashMap::new()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentChangeEvent> {
        self.tx.subscribe()
    }

    /// Record the latest resolution for a key.
    ///
    /// Compares `env_id` identity of the previous and new value (absence
    /// counts as an identity of its own) and updates the table in the
    /// same critical section. Returns the event to dispatch when the
    /// identities differ, `None` otherwise.
    pub fn observe(
        &self,
        key: ScopeKey,
        uri: Option<PathBuf>,
        new: Option<PythonEnvironment>,
    ) -> Option<EnvironmentChangeEvent> {
        let mut table = self.previous.lock().unwrap();
        let old = table.get(&key).and_then(|entry| entry.clone());
        let changed = match (&old, &new) {
            (None, None) => false,
            (Some(a), Some(b)) => a.env_id != b.env_id,
            _ => true,
        };
        if !changed {
            return None;
        }
        table.insert(key.clone(), new.clone());
        debug!(
            "[events] environment changed for {key:?}: {:?} -> {:?}",
            old.as_ref().map(|e| &e.env_id),
            new.as_ref().map(|e| &e.env_id)
        );
        Some(EnvironmentChangeEvent {
            scope_key: key,
            uri,
            old,
            new,
        })
    }

    /// Fire an event on the next tick, never inline on the caller's
    /// stack.
    pub fn dispatch(&self, event: EnvironmentChangeEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(event);
        });
    }

    /// Fire a batch of already-collected events together.
    pub fn dispatch_all(&self, events: Vec<EnvironmentChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let tx = self.tx.clone();
        tokio::spawn(async move {
            for event in events {
                let _ = tx.send(event);
            }
        });
    }

    /// Observe and, when the identity changed, dispatch. Returns whether
    /// an event was scheduled.
    pub fn observe_and_dispatch(
        &self,
        key: ScopeKey,
        uri: Option<PathBuf>,
        new: Option<PythonEnvironment>,
    ) -> bool {
        match self.observe(key, uri, new) {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::env;

    #[tokio::test]
    async fn test_same_identity_does_not_fire() {
        let hub = ChangeEventHub::new();
        let e = env("acme:venv", "a");

        assert!(hub.observe_and_dispatch(ScopeKey::Global, None, Some(e.clone())));
        // Same identity, different metadata: still no event.
        let mut renamed = e.clone();
        renamed.display_name = "renamed".to_string();
        assert!(!hub.observe_and_dispatch(ScopeKey::Global, None, Some(renamed)));
    }

    #[tokio::test]
    async fn test_absent_to_present_fires_with_old_none() {
        let hub = ChangeEventHub::new();
        let mut rx = hub.subscribe();

        assert!(!hub.observe_and_dispatch(ScopeKey::Global, None, None));
        assert!(hub.observe_and_dispatch(ScopeKey::Global, None, Some(env("acme:venv", "a"))));

        let event = rx.recv().await.unwrap();
        assert!(event.old.is_none());
        assert_eq!(event.new.unwrap().env_id, env("acme:venv", "a").env_id);
    }

    #[tokio::test]
    async fn test_table_updates_before_dispatch() {
        let hub = ChangeEventHub::new();
        let e = env("acme:venv", "a");

        // Two back-to-back observes for the same key and value; only the
        // first may produce an event, because the table was already
        // updated synchronously by the time the second runs.
        let first = hub.observe(ScopeKey::Global, None, Some(e.clone()));
        let second = hub.observe(ScopeKey::Global, None, Some(e));
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let hub = ChangeEventHub::new();
        let e = env("acme:venv", "a");
        assert!(hub.observe_and_dispatch(ScopeKey::Global, None, Some(e.clone())));
        assert!(hub.observe_and_dispatch(
            ScopeKey::Project(PathBuf::from("/work/app")),
            Some(PathBuf::from("/work/app/main.py")),
            Some(e)
        ));
    }

    #[tokio::test]
    async fn test_batch_dispatch_delivers_all() {
        let hub = ChangeEventHub::new();
        let mut rx = hub.subscribe();

        let a = hub.observe(ScopeKey::Global, None, Some(env("acme:venv", "a")));
        let b = hub.observe(
            ScopeKey::Project(PathBuf::from("/p")),
            None,
            Some(env("acme:conda", "b")),
        );
        hub.dispatch_all(vec![a.unwrap(), b.unwrap()]);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
    }
}
