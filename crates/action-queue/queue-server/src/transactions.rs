//! Transaction record sink: one record per successful submission.
//!
//! Fire-and-forget by contract. The sink is not part of the queue's own
//! durability guarantee, so write failures are logged and swallowed.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

use action_queue_core::{
    ActionMeta,
    QueuedAction,
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::warn;

use crate::store::unix_now;

/// Tree name for submitted transaction records.
const TRANSACTIONS_TREE: &str = "transactions";

/// The record handed to the sink once per successful submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_hash: String,
    pub account_address: String,
    pub meta: ActionMeta,
    pub submitted_at: u64,
}

impl TransactionRecord {
    pub fn from_submission(action: &QueuedAction, transaction_hash: &str) -> Self {
        Self {
            transaction_hash: transaction_hash.to_string(),
            account_address: action.payload.account_address().to_string(),
            meta: action.meta.clone(),
            submitted_at: unix_now(),
        }
    }
}

/// Consumer of successful submissions, e.g. the wallet's transaction history.
pub trait TransactionSink: Send + Sync + 'static {
    fn add_transaction(&self, record: TransactionRecord);
}

enum LogBackend {
    InMemory {
        records: Mutex<HashMap<String, TransactionRecord>>,
    },
    Sled {
        tree: Mutex<Box<sled::Tree>>,
    },
}

/// Durable transaction history keyed by transaction hash.
pub struct TransactionLog {
    backend: LogBackend,
}

impl TransactionLog {
    pub fn new(db: &sled::Db) -> Result<Arc<Self>, std::io::Error> {
        let tree = db.open_tree(TRANSACTIONS_TREE)?;
        Ok(Arc::new(Self {
            backend: LogBackend::Sled {
                tree: Mutex::new(Box::new(tree)),
            },
        }))
    }

    pub fn new_ephemeral() -> Arc<Self> {
        Arc::new(Self {
            backend: LogBackend::InMemory {
                records: Mutex::new(HashMap::new()),
            },
        })
    }

    pub fn get(&self, transaction_hash: &str) -> Option<TransactionRecord> {
        match &self.backend {
            LogBackend::InMemory { records } => {
                records
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(transaction_hash)
                    .cloned()
            }
            LogBackend::Sled { tree } => {
                tree.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(transaction_hash.as_bytes())
                    .ok()
                    .flatten()
                    .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.backend {
            LogBackend::InMemory { records } => {
                records
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .len()
            }
            LogBackend::Sled { tree } => tree
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionSink for TransactionLog {
    fn add_transaction(&self, record: TransactionRecord) {
        match &self.backend {
            LogBackend::InMemory { records } => {
                records
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(record.transaction_hash.clone(), record);
            }
            LogBackend::Sled { tree } => {
                let serialized = match serde_json::to_vec(&record) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(
                            target: "action_queue::transactions",
                            ?err,
                            transaction_hash = %record.transaction_hash,
                            "Failed to serialize transaction record"
                        );
                        return;
                    }
                };
                if let Err(err) = tree
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(record.transaction_hash.as_bytes(), serialized)
                {
                    warn!(
                        target: "action_queue::transactions",
                        ?err,
                        transaction_hash = %record.transaction_hash,
                        "Failed to persist transaction record"
                    );
                }
            }
        }
        metrics::counter!("transactions_recorded_total").increment(1);
    }
}
