//! # `api`
//!
//! The `api` mod serves UI clients with the queue's push/remove/list
//! surface over JSON-RPC 2.0.
//!
//! ## JSON-RPC Methods
//!
//! ### `queue_pushAction`
//!
//! Queues an action for submission. Pushing an action that is already
//! queued returns the same hash without creating a second entry.
//!
//! #### Request
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "method": "queue_pushAction",
//!     "params": [{
//!         "payload": {
//!             "kind": "TRANSACTION",
//!             "payload": {
//!                 "contractAddress": "0xabc",
//!                 "entrypoint": "changeGuardian",
//!                 "calldata": ["0"]
//!             }
//!         },
//!         "meta": { "title": "Change account guardian" }
//!     }],
//!     "id": 1
//! }
//! ```
//!
//! #### Success Response
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "result": "0x49d2…",
//!     "id": 1
//! }
//! ```
//!
//! ### `queue_removeAction`
//!
//! Removes a queued action by hash. Returns whether anything was removed;
//! removing an unknown hash is not an error.
//!
//! #### Request
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "method": "queue_removeAction",
//!     "params": ["0x49d2…"],
//!     "id": 2
//! }
//! ```
//!
//! ### `queue_getActions`
//!
//! Returns every queued action in insertion order, with status.
//!
//! ## Error Codes
//!
//! - -32700: Parse error
//! - -32600: Invalid request / request too large
//! - -32601: Method not found
//! - -32602: Invalid parameters / malformed action
//! - -32603: Internal error

pub mod accept;
pub mod json_validation;
pub mod process_request;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use hyper_util::rt::TokioIo;
use tokio::net::{
    TcpListener,
    TcpStream,
};

use anyhow::Result;

use crate::queue::ActionQueue;

/// Start the API server
pub async fn serve(
    listener: TcpListener,
    queue: ActionQueue,
    cancel_token: CancellationToken,
) -> Result<()> {
    // We start a loop to continuously accept incoming connections
    loop {
        tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("Api received cancellation signal, shutting down...");
                    break;
                }
                res = listener.accept() => {
                    match res {
                        Ok((stream, socketaddr)) => {
                            serve_connection(socketaddr, queue.clone(), stream);
                        }
                        Err(err) => {
                            tracing::error!(?err, "Error accepting connection");
                        }
                    }
                }
        }
    }

    Ok(())
}

fn serve_connection(socketaddr: SocketAddr, queue: ActionQueue, stream: TcpStream) {
    tracing::debug!("Connection from: {}", socketaddr);

    // Use an adapter to access something implementing `tokio::io` traits as if they implement
    // `hyper::rt` IO traits.
    let io = TokioIo::new(stream);

    // Spawn a tokio task to serve multiple connections concurrently
    tokio::task::spawn(async move {
        crate::accept!(io, queue, socketaddr);
    });
}
