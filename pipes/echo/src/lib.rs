//! Echo pipe for Pipeway.
//!
//! Reference pipe used by the sample configuration and the gateway's
//! integration tests. It offers:
//!
//! - `Default`: middleware tagging the forwarded request and the returned
//!   response with `<prefix>-pipe: echo`
//! - `NotFound`: handler answering 404 with the requested host and path
//! - `Recover`: panic recovery answering 500

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use pipeway_pipe_api::pipe::parse_config;
use pipeway_pipe_api::recover::{catch_panic, internal_error};
use pipeway_pipe_api::{body, Capabilities, Handler, Middleware, Pipe, PipeConfig, PipeError};

const DEFAULT_PREFIX: &str = "x-echo";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EchoConfig {
    /// Prefix of the headers the pipe adds.
    #[serde(default = "default_prefix")]
    pub header_prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            header_prefix: default_prefix(),
        }
    }
}

pub struct EchoPipe {
    pipe_header: HeaderName,
    path_header: HeaderName,
}

/// Construct the pipe from its configuration block.
pub fn new(config: PipeConfig) -> Result<EchoPipe, PipeError> {
    let config: EchoConfig = parse_config(config)?;
    EchoPipe::from_config(&config)
}

impl EchoPipe {
    pub fn from_config(config: &EchoConfig) -> Result<Self, PipeError> {
        let prefix = config.header_prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(PipeError::configuration("header-prefix must not be empty"));
        }

        let header = |suffix: &str| {
            HeaderName::from_bytes(format!("{}-{}", prefix, suffix).as_bytes()).map_err(|e| {
                PipeError::configuration(format!("invalid header-prefix '{}': {}", prefix, e))
            })
        };

        info!(prefix = %prefix, "Echo pipe configured");
        Ok(Self {
            pipe_header: header("pipe")?,
            path_header: header("path")?,
        })
    }

    fn tagging_middleware(&self) -> Middleware {
        let pipe_header = self.pipe_header.clone();
        let path_header = self.path_header.clone();

        Middleware::new(move |next: Handler| {
            let pipe_header = pipe_header.clone();
            let path_header = path_header.clone();
            Handler::new(move |mut req| {
                let next = next.clone();
                let pipe_header = pipe_header.clone();
                let path_header = path_header.clone();
                async move {
                    let path = req.uri().path().to_string();
                    debug!(path = %path, "Echo pipe tagging request");
                    req.headers_mut()
                        .insert(pipe_header.clone(), HeaderValue::from_static("echo"));

                    let mut response = next.call(req).await;
                    let headers = response.headers_mut();
                    headers.insert(pipe_header, HeaderValue::from_static("echo"));
                    if let Ok(value) = HeaderValue::from_str(&path) {
                        headers.insert(path_header, value);
                    }
                    response
                }
            })
        })
    }

    fn not_found_handler(&self) -> Handler {
        let pipe_header = self.pipe_header.clone();
        Handler::new(move |req| {
            let pipe_header = pipe_header.clone();
            async move {
                let host = req
                    .headers()
                    .get(http::header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .or_else(|| req.uri().host())
                    .unwrap_or_default()
                    .to_string();

                let mut response = body::json(
                    StatusCode::NOT_FOUND,
                    &json!({
                        "error": "no route",
                        "host": host,
                        "path": req.uri().path(),
                    }),
                );
                response
                    .headers_mut()
                    .insert(pipe_header, HeaderValue::from_static("echo"));
                response
            }
        })
    }
}

#[async_trait]
impl Pipe for EchoPipe {
    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .middleware("Default", self.tagging_middleware())
            .handler("NotFound", self.not_found_handler())
            .middleware("Recover", catch_panic(internal_error))
    }
}

impl std::fmt::Debug for EchoPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoPipe")
            .field("pipe_header", &self.pipe_header)
            .finish()
    }
}
