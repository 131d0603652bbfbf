//! Conditional forwarding to the dev server.
//!
//! # Responsibilities
//! - Match requests against the configured path prefix (root matches all)
//! - Classify each request as streaming or buffered from its Accept header
//! - Forward matched requests to the fixed destination
//! - Decline on 404 so the next handler gets its turn
//! - Pass every other response through verbatim
//!
//! # Design Decisions
//! - Forwarding copies method, path+query and headers but no request body;
//!   the inbound request survives untouched for the fall-through path
//! - Streaming requests get no timeout: server-sent-event connections are
//!   long lived by design
//! - Only 404 declines. 5xx from a dev server that is still compiling
//!   passes through; readiness detection is the 404 boundary, nothing wider
//! - One forwarding attempt per request; transport failure is 502

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::uri::{Authority, Scheme};
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tower::{Layer, Service};

use crate::proxy::streaming::{CopyMode, RelayBody};

/// Media type whose presence in the Accept header marks a streaming request.
const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Immutable descriptor of the upstream dev server.
#[derive(Debug, Clone)]
pub struct ProxyDestination {
    /// URI scheme, "http" or "https".
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Chunk bound for the buffered response copy.
    pub buffer_size: usize,
    /// Timeout for buffered requests. Streaming requests are unbounded.
    pub request_timeout: Duration,
}

impl From<&crate::config::ProxyConfig> for ProxyDestination {
    fn from(config: &crate::config::ProxyConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            host: config.host.clone(),
            port: config.port,
            buffer_size: config.buffer_size,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to build forwarded request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
}

/// Layer that wraps the host's handler stack with the conditional proxy.
#[derive(Clone)]
pub struct ConditionalProxyLayer {
    state: Arc<ProxyState>,
}

impl ConditionalProxyLayer {
    /// Build the layer for a path prefix and destination. The prefix is
    /// normalized to carry a leading slash; "/" intercepts every request.
    pub fn new(path_prefix: &str, destination: ProxyDestination) -> Result<Self, ProxyError> {
        let (prefix, prefix_is_root) = normalize_prefix(path_prefix);

        let scheme = Scheme::try_from(destination.scheme.as_str())
            .map_err(axum::http::Error::from)?;
        let authority =
            Authority::try_from(format!("{}:{}", destination.host, destination.port).as_str())
                .map_err(axum::http::Error::from)?;
        let host_header = HeaderValue::from_str(authority.as_str())
            .map_err(axum::http::Error::from)?;

        // One client serves both classifications; the timeout policy is what
        // differs per request. Development-only traffic, so no tuned pool.
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            state: Arc::new(ProxyState {
                prefix,
                prefix_is_root,
                destination,
                scheme,
                authority,
                host_header,
                client,
            }),
        })
    }
}

impl<S> Layer<S> for ConditionalProxyLayer {
    type Service = ConditionalProxy<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConditionalProxy {
            inner,
            state: self.state.clone(),
        }
    }
}

struct ProxyState {
    prefix: String,
    prefix_is_root: bool,
    destination: ProxyDestination,
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
    client: Client<HttpConnector, Body>,
}

impl ProxyState {
    fn matches(&self, path: &str) -> bool {
        self.prefix_is_root || path.starts_with(&self.prefix)
    }
}

/// Per-request decision after forwarding.
enum ProxyVerdict {
    /// The destination answered; its response goes back verbatim.
    Completed(Response),
    /// The destination has nothing for this path; let the next handler try.
    Declined,
}

/// Service produced by [`ConditionalProxyLayer`]. Holds no per-request
/// state; the shared state is read-only.
#[derive(Clone)]
pub struct ConditionalProxy<S> {
    inner: S,
    state: Arc<ProxyState>,
}

impl<S> Service<Request<Body>> for ConditionalProxy<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let clone = self.inner.clone();
        // The original service is the one poll_ready was called on.
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !state.matches(request.uri().path()) {
                return inner.call(request).await;
            }

            let path = request.uri().path().to_string();
            match forward(&state, request.method(), request.uri(), request.headers()).await {
                Ok(ProxyVerdict::Completed(response)) => Ok(response),
                Ok(ProxyVerdict::Declined) => inner.call(request).await,
                Err(error) => {
                    tracing::error!(path = %path, error = %error, "Upstream error");
                    Ok((StatusCode::BAD_GATEWAY, "Upstream request failed").into_response())
                }
            }
        })
    }
}

/// Forward one matched request and reconcile the destination's response.
async fn forward(
    state: &ProxyState,
    method: &Method,
    request_uri: &Uri,
    request_headers: &HeaderMap,
) -> Result<ProxyVerdict, ProxyError> {
    let streaming = is_streaming_request(request_headers);
    let request_path = request_uri.path().to_string();

    // Destination scheme/authority, inbound path+query.
    let mut uri_parts = request_uri.clone().into_parts();
    uri_parts.scheme = Some(state.scheme.clone());
    uri_parts.authority = Some(state.authority.clone());
    let uri = Uri::from_parts(uri_parts).map_err(axum::http::Error::from)?;

    let mut outbound = Request::builder()
        .method(method.clone())
        .uri(uri)
        .body(Body::empty())?;

    let headers = outbound.headers_mut();
    for (name, value) in request_headers {
        headers.append(name.clone(), value.clone());
    }
    headers.insert(header::HOST, state.host_header.clone());

    tracing::debug!(
        method = %method,
        path = %request_path,
        streaming,
        "Forwarding request to dev server"
    );

    // The client future resolves once response headers are in; the body
    // arrives lazily through the relay below.
    let response = if streaming {
        state.client.request(outbound).await?
    } else {
        let timeout = state.destination.request_timeout;
        tokio::time::timeout(timeout, state.client.request(outbound))
            .await
            .map_err(|_| ProxyError::Timeout(timeout))??
    };

    if response.status() == StatusCode::NOT_FOUND {
        tracing::debug!(path = %request_path, "Dev server has no answer for this path; falling through");
        return Ok(ProxyVerdict::Declined);
    }

    let (mut parts, upstream) = response.into_parts();
    // The relay performs its own framing negotiation.
    parts.headers.remove(header::TRANSFER_ENCODING);

    let mode = if streaming {
        CopyMode::Streaming
    } else {
        CopyMode::Buffered {
            buffer_size: state.destination.buffer_size,
        }
    };
    let body = Body::new(RelayBody::new(upstream, mode));

    Ok(ProxyVerdict::Completed(Response::from_parts(parts, body)))
}

/// A request is streaming iff any comma-separated item of an Accept header
/// names the server-sent-events media type (parameters ignored, case
/// ignored).
fn is_streaming_request(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| {
            item.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case(EVENT_STREAM_MEDIA_TYPE)
        })
}

fn normalize_prefix(prefix: &str) -> (String, bool) {
    let normalized = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    let is_root = normalized == "/";
    (normalized, is_root)
}
