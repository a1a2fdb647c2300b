//! Public face of the action queue.
//!
//! `push` and `remove` are bookkeeping only: they touch the store, wake the
//! processor and return. Completion is observed through `get_all` or the
//! event channel. Downstream failures never propagate out of here; the only
//! error a caller can see is a malformed action.

use std::sync::Arc;

use action_queue_core::{
    ActionHash,
    ActionRequest,
    InvalidAction,
    QueuedAction,
    action_hash,
};

use tokio::sync::{
    Notify,
    broadcast,
};
use tracing::{
    debug,
    error,
};

use crate::store::ActionStore;

/// Capacity of the queue event channel; slow subscribers lag, they do not
/// block the processor.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Emitted by the processor once per terminal submission outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Submitted {
        action_hash: ActionHash,
        transaction_hash: String,
    },
    Failed {
        action_hash: ActionHash,
        reason: String,
    },
}

/// Handle to the queue, cheap to clone into API connections and workers.
#[derive(Clone)]
pub struct ActionQueue {
    store: ActionStore,
    wake: Arc<Notify>,
    events: broadcast::Sender<QueueEvent>,
}

impl ActionQueue {
    pub fn new(store: ActionStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            wake: Arc::new(Notify::new()),
            events,
        }
    }

    /// Validates, hashes, appends and wakes the processor. Returns the action
    /// hash immediately; a push of an already queued action dedupes onto the
    /// existing entry and returns the same hash.
    pub fn push(&self, request: ActionRequest) -> Result<ActionHash, InvalidAction> {
        request.payload.validate()?;
        let hash = action_hash(&request.payload);

        match self.store.append(hash, request) {
            Ok(true) => {
                debug!(target: "action_queue::queue", %hash, "Action queued");
                metrics::counter!("actions_pushed_total").increment(1);
            }
            Ok(false) => {
                metrics::counter!("actions_deduplicated_total").increment(1);
            }
            Err(err) => {
                // Store faults stay behind the queue boundary; the entry is
                // observable (or absent) via get_all.
                error!(target: "action_queue::queue", ?err, %hash, "Failed to persist pushed action");
            }
        }

        self.wake.notify_one();
        Ok(hash)
    }

    /// Best-effort cancel. Once the processor has claimed the entry this only
    /// erases the record; work already dispatched to the executor runs to
    /// completion and its receipt is discarded.
    pub fn remove(&self, hash: &ActionHash) -> bool {
        match self.store.remove(hash) {
            Ok(removed) => {
                if removed {
                    debug!(target: "action_queue::queue", %hash, "Action removed");
                }
                removed
            }
            Err(err) => {
                error!(target: "action_queue::queue", ?err, %hash, "Failed to remove action");
                false
            }
        }
    }

    /// Queue contents in insertion order, for status display.
    pub fn get_all(&self) -> Vec<QueuedAction> {
        match self.store.list() {
            Ok(entries) => entries,
            Err(err) => {
                error!(target: "action_queue::queue", ?err, "Failed to list actions");
                Vec::new()
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &ActionStore {
        &self.store
    }

    pub(crate) fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub(crate) fn events_sender(&self) -> broadcast::Sender<QueueEvent> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_queue_core::{
        ActionMeta,
        ActionPayload,
        ActionStatus,
        TransactionPayload,
    };

    fn change_guardian_request() -> ActionRequest {
        ActionRequest {
            payload: ActionPayload::Transaction(TransactionPayload {
                contract_address: "0xabc".to_string(),
                entrypoint: "changeGuardian".to_string(),
                calldata: vec!["0".to_string()],
            }),
            meta: ActionMeta {
                title: Some("Change account guardian".to_string()),
                extra: serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn push_returns_hash_and_queues_pending_entry() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());
        let request = change_guardian_request();
        let expected = action_hash(&request.payload);

        let hash = queue.push(request).unwrap();
        assert_eq!(hash, expected);

        let entries = queue.get_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, expected);
        assert_eq!(entries[0].status, ActionStatus::Pending);
    }

    #[test]
    fn push_rejects_malformed_actions_without_persisting() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());
        let request = ActionRequest {
            payload: ActionPayload::Transaction(TransactionPayload {
                contract_address: String::new(),
                entrypoint: "changeGuardian".to_string(),
                calldata: vec![],
            }),
            meta: ActionMeta::default(),
        };

        assert!(matches!(
            queue.push(request),
            Err(InvalidAction::MissingField("contractAddress"))
        ));
        assert!(queue.get_all().is_empty());
    }

    #[test]
    fn repeated_push_keeps_one_entry() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());

        let first = queue.push(change_guardian_request()).unwrap();
        let second = queue.push(change_guardian_request()).unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.get_all().len(), 1);
    }

    #[test]
    fn push_ignores_meta_when_deriving_identity() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());

        let first = queue.push(change_guardian_request()).unwrap();
        let mut retitled = change_guardian_request();
        retitled.meta.title = Some("Retry guardian change".to_string());
        let second = queue.push(retitled).unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.get_all().len(), 1);
        // The original meta is kept; the duplicate push does not overwrite.
        assert_eq!(
            queue.get_all()[0].meta.title.as_deref(),
            Some("Change account guardian")
        );
    }

    #[test]
    fn remove_missing_hash_returns_false() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());
        assert!(!queue.remove(&ActionHash::ZERO));
    }

    #[test]
    fn remove_then_push_starts_from_scratch() {
        let queue = ActionQueue::new(crate::store::ActionStore::new_ephemeral());

        let hash = queue.push(change_guardian_request()).unwrap();
        assert!(queue.remove(&hash));
        assert!(queue.get_all().is_empty());

        let again = queue.push(change_guardian_request()).unwrap();
        assert_eq!(again, hash);
        assert_eq!(queue.get_all().len(), 1);
    }
}
