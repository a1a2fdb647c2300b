use anyhow::Result;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    executor::ActionExecutor,
    processor,
    queue::ActionQueue,
    store::ActionStore,
    transactions::TransactionSink,
};

/// The assembled daemon: API listener, durable store and the submission
/// worker's collaborators.
pub struct QueueServer<E: ActionExecutor> {
    pub listener: TcpListener,
    pub store: ActionStore,
    pub executor: Arc<E>,
    pub sink: Arc<dyn TransactionSink>,
    pub submit_timeout: Duration,
    pub prune_interval: Duration,
    pub failed_retention: Duration,
}

// Type alias for boxed future
pub type BoxedFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

impl<E: ActionExecutor> QueueServer<E> {
    /// Start the server.
    /// Returns the queue handle plus the API and worker futures; both run
    /// until the cancellation token fires.
    pub fn start(self, cancel_token: CancellationToken) -> (ActionQueue, BoxedFuture, BoxedFuture) {
        let queue = ActionQueue::new(self.store);

        // Start the API server
        let api_handle = crate::api::serve(self.listener, queue.clone(), cancel_token.clone());
        tracing::info!("Started API server");

        // Start the submission worker and the prune task
        let worker_handle = {
            let processor_handle = processor::run(
                queue.clone(),
                self.executor,
                self.sink,
                self.submit_timeout,
                cancel_token.clone(),
            );
            let pruner_handle = processor::run_pruner(
                queue.clone(),
                self.prune_interval,
                self.failed_retention,
                cancel_token,
            );
            async move {
                tokio::try_join!(processor_handle, pruner_handle)?;
                anyhow::Ok(())
            }
        };
        tracing::debug!("Started submission worker");

        (queue, Box::pin(api_handle), Box::pin(worker_handle))
    }

    /// Run the server until the cancellation token is cancelled.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let (_queue, mut api_handle, mut worker_handle) = self.start(cancel_token.clone());

        tokio::select! {
            res = &mut api_handle => {
                match res {
                    Ok(()) => {
                        tracing::info!("Api stopped.");
                        worker_handle.await?;
                        tracing::info!("Worker stopped.");
                    }
                    Err(e) => {
                        tracing::error!("API server encountered an error: {:?}", e);
                        cancel_token.cancel();
                        let _ = worker_handle.await;
                        return Err(e);
                    }
                }
            }
            res = &mut worker_handle => {
                match res {
                    Ok(()) => {
                        tracing::info!("Worker stopped.");
                        api_handle.await?;
                        tracing::info!("Api stopped.");
                    }
                    Err(e) => {
                        tracing::error!("Worker encountered an error: {:?}", e);
                        cancel_token.cancel();
                        let _ = api_handle.await;
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }
}
