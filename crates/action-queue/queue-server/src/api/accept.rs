use crate::{
    api::process_request::match_method,
    queue::ActionQueue,
};

use core::convert::Infallible;

use http_body_util::Full;
use hyper::{
    Error,
    Method,
    Request,
    StatusCode,
    body::Bytes,
};

macro_rules! rpc_response {
    (
        $status:expr,
        $body:expr
    ) => {
        Ok(hyper::Response::builder()
            .status($status)
            .body($body)
            .unwrap())
    };
}

/// Accepts an incoming HTTP request, which it responds with
/// the appropriate api call.
#[tracing::instrument(level = "debug", skip_all, target = "api::accept_request")]
pub async fn accept_request<B>(
    req: Request<B>,
    queue: ActionQueue,
    client_addr: std::net::SocketAddr,
) -> Result<hyper::Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Error = Error>,
{
    let path = req.uri().path();
    let method = req.method().clone();

    if path == "/health" && method == Method::GET {
        return rpc_response!(StatusCode::OK, Full::new(Bytes::from("ok")));
    }

    if path == "/ready" && method == Method::GET {
        let status = if queue.store().ping() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        let body = if status == StatusCode::OK {
            "ready"
        } else {
            "not ready"
        };

        return rpc_response!(status, Full::new(Bytes::from(body)));
    }

    tracing::debug!(target = "api::accept_request", "Incoming request");
    let resp = match match_method(req, &queue, client_addr).await {
        Ok(rax) => rax,
        Err(e) => {
            let e = e.to_string();
            return rpc_response!(400, Full::new(Bytes::from(e)));
        }
    };
    rpc_response!(200, Full::new(Bytes::from(resp)))
}

/// Macros for accepting requests
#[macro_export]
macro_rules! accept {
    (
        $io:expr,
        $queue:expr,
        $client_addr:expr
    ) => {
        let queue = $queue.clone();
        let client_addr = $client_addr;
        // Bind the incoming connection to our service
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            // `service_fn` converts our function in a `Service`
            .serve_connection(
                $io,
                hyper::service::service_fn(move |req| {
                    let queue = queue.clone();
                    async move {
                        $crate::api::accept::accept_request(req, queue, client_addr).await
                    }
                }),
            )
            .await
        {
            tracing::error!(?err, "Error serving connection");
        }
    };
}
