//! Shared doubles for worker and queue tests.

use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use action_queue_core::{
    ActionHash,
    ActionMeta,
    ActionPayload,
    ActionRequest,
    QueuedAction,
    TransactionPayload,
};

use tokio::sync::Semaphore;

use crate::{
    executor::{
        ActionExecutor,
        ExecutionError,
        SubmissionReceipt,
    },
    transactions::{
        TransactionRecord,
        TransactionSink,
    },
};

pub(crate) fn invoke_request(contract: &str, entrypoint: &str) -> ActionRequest {
    ActionRequest {
        payload: ActionPayload::Transaction(TransactionPayload {
            contract_address: contract.to_string(),
            entrypoint: entrypoint.to_string(),
            calldata: vec!["0".to_string()],
        }),
        meta: ActionMeta::default(),
    }
}

/// Polls until the condition holds; panics after five seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    records: Mutex<Vec<TransactionRecord>>,
}

impl RecordingSink {
    pub(crate) fn records(&self) -> Vec<TransactionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl TransactionSink for RecordingSink {
    fn add_transaction(&self, record: TransactionRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Executor double: records every submission, optionally blocks on a gate,
/// optionally fails every call.
pub(crate) struct ScriptedExecutor {
    submissions: Mutex<Vec<ActionHash>>,
    gate: Option<Semaphore>,
    fail_with: Option<String>,
}

impl ScriptedExecutor {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            gate: None,
            fail_with: None,
        })
    }

    pub(crate) fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            gate: None,
            fail_with: Some(reason.to_string()),
        })
    }

    /// Submissions park until `release` hands out a permit.
    pub(crate) fn blocking() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
            fail_with: None,
        })
    }

    pub(crate) fn release(&self) {
        self.gate
            .as_ref()
            .expect("release on a non-blocking executor")
            .add_permits(1);
    }

    pub(crate) fn submissions(&self) -> Vec<ActionHash> {
        self.submissions.lock().unwrap().clone()
    }
}

impl ActionExecutor for ScriptedExecutor {
    async fn submit(&self, action: &QueuedAction) -> Result<SubmissionReceipt, ExecutionError> {
        self.submissions.lock().unwrap().push(action.hash);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if let Some(reason) = &self.fail_with {
            return Err(ExecutionError::Rpc {
                code: -32000,
                message: reason.clone(),
            });
        }

        Ok(SubmissionReceipt {
            transaction_hash: format!("0x{}", hex::encode(&action.hash[..8])),
        })
    }
}
