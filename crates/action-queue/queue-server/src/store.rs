//! Durable, ordered mapping of action hash to queue entry.
//!
//! All mutations go through one mutex, so concurrent pushes and removes from
//! API connections and the processor resolve deterministically: a remove wins
//! only if it lands before the processor claims the entry.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::{
        SystemTime,
        UNIX_EPOCH,
    },
};

use action_queue_core::{
    ActionHash,
    ActionRequest,
    ActionStatus,
    QueuedAction,
};

use tracing::{
    debug,
    info,
    warn,
};

/// Tree name for queued actions.
const ACTIONS_TREE: &str = "actions";

#[derive(thiserror::Error, Debug)]
pub enum ActionStoreError {
    #[error("sled error")]
    Sled(#[source] std::io::Error),
    #[error("codec error")]
    Codec(#[source] serde_json::Error),
    #[error("action not found: {0}")]
    NotFound(ActionHash),
}

/// Storage backend for the action store.
/// Supports both in-memory (ephemeral) and persistent (sled) storage.
enum StoreBackend {
    /// In-memory storage. Entries are lost when the store is dropped.
    InMemory {
        actions: HashMap<ActionHash, QueuedAction>,
    },
    /// Persistent storage using a sled tree. Entries survive restarts.
    Sled { tree: Box<sled::Tree> },
}

impl StoreBackend {
    fn new_in_memory() -> Self {
        Self::InMemory {
            actions: HashMap::new(),
        }
    }

    fn new_sled(db: &sled::Db) -> Result<Self, ActionStoreError> {
        let tree = db.open_tree(ACTIONS_TREE).map_err(ActionStoreError::Sled)?;
        Ok(Self::Sled {
            tree: Box::new(tree),
        })
    }

    fn get(&self, hash: &ActionHash) -> Result<Option<QueuedAction>, ActionStoreError> {
        match self {
            Self::InMemory { actions } => Ok(actions.get(hash).cloned()),
            Self::Sled { tree } => {
                tree.get(hash.as_slice())
                    .map_err(ActionStoreError::Sled)?
                    .map(|bytes| serde_json::from_slice(&bytes))
                    .transpose()
                    .map_err(ActionStoreError::Codec)
            }
        }
    }

    fn insert(&mut self, action: &QueuedAction) -> Result<(), ActionStoreError> {
        match self {
            Self::InMemory { actions } => {
                actions.insert(action.hash, action.clone());
                Ok(())
            }
            Self::Sled { tree } => {
                tree.insert(
                    action.hash.as_slice(),
                    serde_json::to_vec(action).map_err(ActionStoreError::Codec)?,
                )
                .map_err(ActionStoreError::Sled)?;
                Ok(())
            }
        }
    }

    fn remove(&mut self, hash: &ActionHash) -> Result<bool, ActionStoreError> {
        match self {
            Self::InMemory { actions } => Ok(actions.remove(hash).is_some()),
            Self::Sled { tree } => {
                Ok(tree
                    .remove(hash.as_slice())
                    .map_err(ActionStoreError::Sled)?
                    .is_some())
            }
        }
    }

    fn scan(&self) -> Result<Vec<QueuedAction>, ActionStoreError> {
        match self {
            Self::InMemory { actions } => Ok(actions.values().cloned().collect()),
            Self::Sled { tree } => {
                let mut entries = Vec::new();
                for item in tree.iter() {
                    let (_, bytes) = item.map_err(ActionStoreError::Sled)?;
                    entries.push(serde_json::from_slice(&bytes).map_err(ActionStoreError::Codec)?);
                }
                Ok(entries)
            }
        }
    }
}

struct StoreInner {
    backend: StoreBackend,
    next_seq: u64,
}

/// Process-wide store of queued actions, keyed by action hash, insertion
/// order preserved through a monotonic sequence counter.
#[derive(Clone)]
pub struct ActionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl std::fmt::Debug for ActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        let backend_name = match &inner.backend {
            StoreBackend::InMemory { .. } => "InMemory",
            StoreBackend::Sled { .. } => "Sled",
        };
        f.debug_struct("ActionStore")
            .field("backend", &backend_name)
            .field("next_seq", &inner.next_seq)
            .finish()
    }
}

impl ActionStore {
    /// Opens the persistent store inside the given sled database and runs the
    /// crash-recovery scan: entries still `Submitting` from an interrupted
    /// process are reset to `Pending`.
    pub fn new(db: &sled::Db) -> Result<Self, ActionStoreError> {
        Self::with_backend(StoreBackend::new_sled(db)?)
    }

    /// Creates a store without persistence (in-memory).
    pub fn new_ephemeral() -> Self {
        Self::with_backend(StoreBackend::new_in_memory())
            .expect("in-memory backend cannot fail to open")
    }

    fn with_backend(mut backend: StoreBackend) -> Result<Self, ActionStoreError> {
        let entries = backend.scan()?;
        let mut next_seq = 0;
        let mut orphaned = 0usize;

        for mut action in entries {
            next_seq = next_seq.max(action.seq + 1);
            if action.status == ActionStatus::Submitting {
                action.status = ActionStatus::Pending;
                backend.insert(&action)?;
                orphaned += 1;
            }
        }

        if orphaned > 0 {
            warn!(
                target: "action_queue::store",
                orphaned,
                "Reset orphaned submitting entries to pending"
            );
        }
        info!(
            target: "action_queue::store",
            next_seq,
            "Opened action store"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner { backend, next_seq })),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Inserts a new `Pending` entry for the hash, or leaves an existing
    /// entry untouched. Returns whether anything was inserted; `false` is the
    /// dedup case that collapses a repeated push into a no-op.
    pub fn append(
        &self,
        hash: ActionHash,
        request: ActionRequest,
    ) -> Result<bool, ActionStoreError> {
        let mut inner = self.lock();

        if inner.backend.get(&hash)?.is_some() {
            debug!(
                target: "action_queue::store",
                %hash,
                "Duplicate push collapsed onto existing entry"
            );
            return Ok(false);
        }

        let action = QueuedAction {
            hash,
            seq: inner.next_seq,
            payload: request.payload,
            meta: request.meta,
            status: ActionStatus::Pending,
            created_at: unix_now(),
        };
        inner.backend.insert(&action)?;
        inner.next_seq += 1;
        Ok(true)
    }

    pub fn get(&self, hash: &ActionHash) -> Result<Option<QueuedAction>, ActionStoreError> {
        self.lock().backend.get(hash)
    }

    /// Deletes the entry if present. Missing hashes are treated as already
    /// removed, never as an error.
    pub fn remove(&self, hash: &ActionHash) -> Result<bool, ActionStoreError> {
        self.lock().backend.remove(hash)
    }

    /// All entries in insertion order.
    pub fn list(&self) -> Result<Vec<QueuedAction>, ActionStoreError> {
        let mut entries = self.lock().backend.scan()?;
        entries.sort_by_key(|action| action.seq);
        Ok(entries)
    }

    /// Claims the oldest `Pending` entry for submission, transitioning it to
    /// `Submitting` under the store lock so a racing remove either wins
    /// before the claim or only erases the record afterwards.
    pub fn claim_next(&self) -> Result<Option<QueuedAction>, ActionStoreError> {
        let mut inner = self.lock();

        let mut oldest: Option<QueuedAction> = None;
        for action in inner.backend.scan()? {
            if action.status != ActionStatus::Pending {
                continue;
            }
            if oldest.as_ref().is_none_or(|current| action.seq < current.seq) {
                oldest = Some(action);
            }
        }

        match oldest {
            Some(mut action) => {
                action.status = ActionStatus::Submitting;
                inner.backend.insert(&action)?;
                Ok(Some(action))
            }
            None => Ok(None),
        }
    }

    pub fn mark_submitting(&self, hash: &ActionHash) -> Result<(), ActionStoreError> {
        self.set_status(hash, ActionStatus::Submitting)
    }

    pub fn mark_failed(&self, hash: &ActionHash, reason: &str) -> Result<(), ActionStoreError> {
        self.set_status(
            hash,
            ActionStatus::Failed {
                reason: reason.to_string(),
            },
        )
    }

    fn set_status(&self, hash: &ActionHash, status: ActionStatus) -> Result<(), ActionStoreError> {
        let mut inner = self.lock();
        let mut action = inner
            .backend
            .get(hash)?
            .ok_or(ActionStoreError::NotFound(*hash))?;
        action.status = status;
        inner.backend.insert(&action)
    }

    /// Evicts `Failed` entries created before the cutoff. `Pending` and
    /// `Submitting` entries are never pruned.
    pub fn prune_failed_before(&self, cutoff: u64) -> Result<usize, ActionStoreError> {
        let mut inner = self.lock();

        let stale: Vec<ActionHash> = inner
            .backend
            .scan()?
            .into_iter()
            .filter(|action| {
                matches!(action.status, ActionStatus::Failed { .. }) && action.created_at < cutoff
            })
            .map(|action| action.hash)
            .collect();

        for hash in &stale {
            inner.backend.remove(hash)?;
        }

        if !stale.is_empty() {
            debug!(
                target: "action_queue::store",
                pruned = stale.len(),
                cutoff,
                "Pruned stale failed entries"
            );
        }
        Ok(stale.len())
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub fn ping(&self) -> bool {
        self.lock().backend.get(&ActionHash::ZERO).is_ok()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
