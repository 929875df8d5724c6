//! Panic recovery for pipe chains.

use futures::FutureExt;
use http::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use crate::body::{self, Response};
use crate::capability::{Handler, Middleware};

/// Build a middleware that turns a panic anywhere downstream into the
/// response produced by `on_panic`.
///
/// Panics raised while the handler is being called and panics raised while
/// its future is polled are both caught.
pub fn catch_panic<F>(on_panic: F) -> Middleware
where
    F: Fn(String) -> Response + Send + Sync + 'static,
{
    let on_panic = Arc::new(on_panic);
    Middleware::new(move |next: Handler| {
        let on_panic = Arc::clone(&on_panic);
        Handler::new(move |req| {
            let next = next.clone();
            let on_panic = Arc::clone(&on_panic);
            async move {
                let downstream = async move { next.call(req).await };
                match AssertUnwindSafe(downstream).catch_unwind().await {
                    Ok(response) => response,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(panic = %message, "Recovered from panic in pipe chain");
                        on_panic(message)
                    }
                }
            }
        })
    })
}

/// Plain `500 Internal Server Error` response.
pub fn internal_error(_message: String) -> Response {
    body::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
