//! Request and response body types shared by the gateway and its pipes.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};

/// Boxed error type carried by bodies flowing through a pipe chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type used on both sides of every pipe chain.
pub type Body = BoxBody<Bytes, BoxError>;

/// Request type handed to pipes.
pub type Request = http::Request<Body>;

/// Response type produced by pipes.
pub type Response = http::Response<Body>;

/// An empty body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// A body holding a single chunk.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// A plain text response.
pub fn text(status: StatusCode, message: impl Into<Bytes>) -> Response {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// A JSON response.
pub fn json(status: StatusCode, value: &serde_json::Value) -> Response {
    let mut response = Response::new(full(value.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Buffer a whole body in memory.
pub async fn collect(body: Body) -> Result<Bytes, BoxError> {
    Ok(body.collect().await?.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_response() {
        let response = text(StatusCode::NOT_FOUND, "404 page not found\n");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let bytes = collect(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"404 page not found\n");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let bytes = collect(empty()).await.unwrap();
        assert!(bytes.is_empty());
    }
}
