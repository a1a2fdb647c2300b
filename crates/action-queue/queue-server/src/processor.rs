//! The single submission worker.
//!
//! One worker per process: submissions are strictly serialized, which keeps
//! actions against the same account in nonce order. The worker drains every
//! claimable entry, then parks until a push wakes it or shutdown is signalled.

use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::{
    executor::{
        ActionExecutor,
        ExecutionError,
    },
    queue::{
        ActionQueue,
        QueueEvent,
    },
    store::{
        ActionStoreError,
        unix_now,
    },
    transactions::{
        TransactionRecord,
        TransactionSink,
    },
};

/// Drives submissions until the cancellation token fires.
pub async fn run<E: ActionExecutor>(
    queue: ActionQueue,
    executor: Arc<E>,
    sink: Arc<dyn TransactionSink>,
    submit_timeout: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let wake = queue.wake_handle();
    loop {
        drain(&queue, executor.as_ref(), sink.as_ref(), submit_timeout).await;

        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "action_queue::processor", "Processor received cancellation signal, shutting down...");
                break;
            }
            () = wake.notified() => {}
        }
    }
    Ok(())
}

/// Submits every claimable action, oldest first, one at a time.
async fn drain<E: ActionExecutor>(
    queue: &ActionQueue,
    executor: &E,
    sink: &dyn TransactionSink,
    submit_timeout: Duration,
) {
    loop {
        let action = match queue.store().claim_next() {
            Ok(Some(action)) => action,
            Ok(None) => break,
            Err(err) => {
                error!(target: "action_queue::processor", ?err, "Failed to claim next action");
                break;
            }
        };

        let hash = action.hash;
        debug!(
            target: "action_queue::processor",
            %hash,
            account = action.payload.account_address(),
            "Submitting action"
        );

        let result = match tokio::time::timeout(submit_timeout, executor.submit(&action)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout),
        };

        match result {
            Ok(receipt) => match queue.store().remove(&hash) {
                Ok(true) => {
                    info!(
                        target: "action_queue::processor",
                        %hash,
                        transaction_hash = %receipt.transaction_hash,
                        "Action submitted"
                    );
                    metrics::counter!("actions_submitted_total").increment(1);
                    sink.add_transaction(TransactionRecord::from_submission(
                        &action,
                        &receipt.transaction_hash,
                    ));
                    let _ = queue.events_sender().send(QueueEvent::Submitted {
                        action_hash: hash,
                        transaction_hash: receipt.transaction_hash,
                    });
                }
                Ok(false) => {
                    // Removed mid-flight; the submission stands on-chain but
                    // nobody is waiting for it anymore.
                    warn!(
                        target: "action_queue::processor",
                        %hash,
                        transaction_hash = %receipt.transaction_hash,
                        "Action removed while submitting, discarding receipt"
                    );
                }
                Err(err) => {
                    error!(target: "action_queue::processor", ?err, %hash, "Failed to remove submitted action");
                }
            },
            Err(err) => {
                let reason = err.to_string();
                warn!(target: "action_queue::processor", %hash, %reason, "Action submission failed");
                metrics::counter!("actions_failed_total").increment(1);
                match queue.store().mark_failed(&hash, &reason) {
                    Ok(()) => {
                        let _ = queue.events_sender().send(QueueEvent::Failed {
                            action_hash: hash,
                            reason,
                        });
                    }
                    Err(ActionStoreError::NotFound(_)) => {
                        debug!(target: "action_queue::processor", %hash, "Failure for an already removed action");
                    }
                    Err(err) => {
                        error!(target: "action_queue::processor", ?err, %hash, "Failed to record submission failure");
                    }
                }
            }
        }
    }
}

/// Periodically evicts stale failed entries.
pub async fn run_pruner(
    queue: ActionQueue,
    interval: Duration,
    failed_retention: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "action_queue::processor", "Pruner received cancellation signal, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let cutoff = unix_now().saturating_sub(failed_retention.as_secs());
                match queue.store().prune_failed_before(cutoff) {
                    Ok(0) => {}
                    Ok(pruned) => {
                        metrics::counter!("actions_pruned_total").increment(pruned as u64);
                    }
                    Err(err) => {
                        error!(target: "action_queue::processor", ?err, "Prune pass failed");
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::ActionStore,
        test_support::{
            RecordingSink,
            ScriptedExecutor,
            invoke_request,
            wait_until,
        },
    };
    use action_queue_core::ActionStatus;

    struct Harness {
        queue: ActionQueue,
        executor: Arc<ScriptedExecutor>,
        sink: Arc<RecordingSink>,
        cancel_token: CancellationToken,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    impl Harness {
        fn start(executor: Arc<ScriptedExecutor>) -> Self {
            Self::start_with_timeout(executor, Duration::from_secs(5))
        }

        fn start_with_timeout(executor: Arc<ScriptedExecutor>, submit_timeout: Duration) -> Self {
            let queue = ActionQueue::new(ActionStore::new_ephemeral());
            let sink = Arc::new(RecordingSink::default());
            let cancel_token = CancellationToken::new();
            let handle = tokio::spawn(run(
                queue.clone(),
                Arc::clone(&executor),
                sink.clone() as Arc<dyn TransactionSink>,
                submit_timeout,
                cancel_token.clone(),
            ));
            Self {
                queue,
                executor,
                sink,
                cancel_token,
                handle,
            }
        }

        async fn shutdown(self) {
            self.cancel_token.cancel();
            self.handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn successful_submission_removes_entry_and_records_once() {
        let harness = Harness::start(ScriptedExecutor::succeeding());

        let hash = harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        wait_until(|| harness.queue.get_all().is_empty()).await;

        let records = harness.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].account_address, "0xabc");
        assert_eq!(harness.executor.submissions(), vec![hash]);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn submitted_event_carries_the_transaction_hash() {
        let executor = ScriptedExecutor::succeeding();
        let harness = Harness::start(Arc::clone(&executor));
        let mut events = harness.queue.subscribe();

        let hash = harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();

        let event = events.recv().await.unwrap();
        match event {
            QueueEvent::Submitted {
                action_hash,
                transaction_hash,
            } => {
                assert_eq!(action_hash, hash);
                assert!(!transaction_hash.is_empty());
            }
            other => panic!("Expected Submitted event, got: {other:?}"),
        }

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn failed_submission_is_kept_and_not_retried() {
        let harness = Harness::start(ScriptedExecutor::failing("account already deployed"));

        let hash = harness.queue.push(invoke_request("0xabc", "deploy")).unwrap();
        wait_until(|| {
            matches!(
                harness.queue.get_all().first().map(|a| a.status.clone()),
                Some(ActionStatus::Failed { .. })
            )
        })
        .await;

        let entries = harness.queue.get_all();
        assert_eq!(entries.len(), 1);
        match &entries[0].status {
            ActionStatus::Failed { reason } => {
                assert!(reason.contains("account already deployed"));
            }
            other => panic!("Expected Failed status, got: {other:?}"),
        }
        assert!(harness.sink.records().is_empty());

        // No auto-retry: the executor saw exactly one attempt.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.executor.submissions().len(), 1);

        // Explicit remove + re-push is the retry path.
        assert!(harness.queue.remove(&hash));
        harness.queue.push(invoke_request("0xabc", "deploy")).unwrap();
        wait_until(|| harness.executor.submissions().len() == 2).await;

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_push_while_in_flight_submits_once() {
        let executor = ScriptedExecutor::blocking();
        let harness = Harness::start(Arc::clone(&executor));

        harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        wait_until(|| executor.submissions().len() == 1).await;

        // Second push of the same logical action while the first is
        // submitting: still one entry, still one submission.
        harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        assert_eq!(harness.queue.get_all().len(), 1);

        executor.release();
        wait_until(|| harness.queue.get_all().is_empty()).await;
        assert_eq!(executor.submissions().len(), 1);
        assert_eq!(harness.sink.records().len(), 1);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn remove_during_submission_discards_the_receipt() {
        let executor = ScriptedExecutor::blocking();
        let harness = Harness::start(Arc::clone(&executor));

        let hash = harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        wait_until(|| executor.submissions().len() == 1).await;
        assert_eq!(
            harness.queue.get_all()[0].status,
            ActionStatus::Submitting
        );

        assert!(harness.queue.remove(&hash));
        assert!(harness.queue.get_all().is_empty());

        // The in-flight call still completes; its receipt is dropped and no
        // transaction record is written.
        executor.release();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.sink.records().is_empty());
        assert!(harness.queue.get_all().is_empty());

        // No ghost entry: the same action can be pushed from scratch.
        let again = harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        assert_eq!(again, hash);
        wait_until(|| executor.submissions().len() == 2).await;

        // Unblock the second submission so the worker can park and shut down.
        executor.release();
        wait_until(|| harness.queue.get_all().is_empty()).await;

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn same_account_actions_submit_in_push_order() {
        let executor = ScriptedExecutor::succeeding();
        let harness = Harness::start(Arc::clone(&executor));

        let first = harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        let second = harness.queue.push(invoke_request("0xabc", "cancelEscape")).unwrap();
        let third = harness.queue.push(invoke_request("0xabc", "upgrade")).unwrap();

        wait_until(|| harness.queue.get_all().is_empty()).await;
        assert_eq!(executor.submissions(), vec![first, second, third]);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn stuck_submission_times_out_as_failed() {
        let executor = ScriptedExecutor::blocking();
        let harness =
            Harness::start_with_timeout(Arc::clone(&executor), Duration::from_millis(50));

        harness.queue.push(invoke_request("0xabc", "changeGuardian")).unwrap();
        wait_until(|| {
            matches!(
                harness.queue.get_all().first().map(|a| a.status.clone()),
                Some(ActionStatus::Failed { .. })
            )
        })
        .await;

        match &harness.queue.get_all()[0].status {
            ActionStatus::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("Expected Failed status, got: {other:?}"),
        }

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn recovered_backlog_drains_without_a_push() {
        // Entries already pending at startup (e.g. after crash recovery) are
        // submitted on the first drain pass.
        let store = ActionStore::new_ephemeral();
        let queue = ActionQueue::new(store);
        let request = invoke_request("0xabc", "changeGuardian");
        let hash = action_queue_core::action_hash(&request.payload);
        queue.store().append(hash, request).unwrap();

        let executor = ScriptedExecutor::succeeding();
        let sink = Arc::new(RecordingSink::default());
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run(
            queue.clone(),
            Arc::clone(&executor),
            sink.clone() as Arc<dyn TransactionSink>,
            Duration::from_secs(5),
            cancel_token.clone(),
        ));

        wait_until(|| queue.get_all().is_empty()).await;
        assert_eq!(executor.submissions(), vec![hash]);

        cancel_token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn pruner_evicts_stale_failures() {
        let harness = Harness::start(ScriptedExecutor::failing("node rejected"));
        let pruner_cancel = CancellationToken::new();
        let pruner = tokio::spawn(run_pruner(
            harness.queue.clone(),
            Duration::from_millis(20),
            Duration::ZERO,
            pruner_cancel.clone(),
        ));

        harness.queue.push(invoke_request("0xabc", "deploy")).unwrap();
        wait_until(|| {
            matches!(
                harness.queue.get_all().first().map(|a| a.status.clone()),
                Some(ActionStatus::Failed { .. })
            )
        })
        .await;

        // Zero retention: the failed entry disappears on the next pass. The
        // cutoff is created_at < now, so step past the creation second.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        wait_until(|| harness.queue.get_all().is_empty()).await;

        pruner_cancel.cancel();
        pruner.await.unwrap().unwrap();
        harness.shutdown().await;
    }
}
