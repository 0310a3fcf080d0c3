use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method};

use crate::headers::Headers;

/// Wall-clock bound on reaching response headers (and on buffering a
/// non-streamed body). Once a stream is flowing there is no per-chunk
/// deadline; long generations are expected.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(55);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct UpstreamHttpRequest {
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    /// When true and the upstream answers 2xx, the body is relayed chunk by
    /// chunk instead of buffered.
    pub want_stream: bool,
}

pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(tokio::sync::mpsc::Receiver<Bytes>),
}

pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream fetch failed: {message}")]
    Transport { message: String },
}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    config: UpstreamClientConfig,
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        // No client-level total timeout: it would cut off streams that
        // legitimately run longer than the response deadline.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut builder = self.client.request(Method::POST, &req.url);
            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }
            builder = builder.body(req.body);

            let resp = tokio::time::timeout(self.config.response_timeout, builder.send())
                .await
                .map_err(|_| UpstreamFailure::Timeout)?
                .map_err(map_wreq_error)?;

            convert_response(resp, req.want_stream, self.config.response_timeout).await
        })
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    response_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status().as_u16();
    let headers = headers_from_wreq(resp.headers());

    let is_success = (200..300).contains(&status);
    if !is_success || !want_stream {
        let body = tokio::time::timeout(response_timeout, resp.bytes())
            .await
            .map_err(|_| UpstreamFailure::Timeout)?
            .map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::debug!(error = %err, "upstream stream ended with error");
                    break;
                }
            };
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (name, value) in map {
        if let Ok(text) = value.to_str() {
            out.push((name.as_str().to_string(), text.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    if err.is_timeout() {
        return UpstreamFailure::Timeout;
    }
    UpstreamFailure::Transport {
        message: err.to_string(),
    }
}

/// Maps an inbound request path onto the upstream base URL, preserving the
/// remainder after the public base path and any query string.
pub fn rewrite_target_url(
    public_base_path: &str,
    upstream_base_url: &str,
    path: &str,
    query: Option<&str>,
) -> String {
    let rest = path
        .strip_prefix(public_base_path.trim_end_matches('/'))
        .unwrap_or(path);
    let mut url = format!(
        "{}/{}",
        upstream_base_url.trim_end_matches('/'),
        rest.trim_start_matches('/')
    );
    if let Some(query) = query
        && !query.is_empty()
    {
        url.push('?');
        url.push_str(query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_path_under_public_base() {
        let url = rewrite_target_url(
            "/v1",
            "https://api.upstream.example/v1",
            "/v1/chat/completions",
            None,
        );
        assert_eq!(url, "https://api.upstream.example/v1/chat/completions");
    }

    #[test]
    fn preserves_query_string() {
        let url = rewrite_target_url(
            "/v1",
            "https://api.upstream.example/v1",
            "/v1/responses",
            Some("stream=true"),
        );
        assert_eq!(url, "https://api.upstream.example/v1/responses?stream=true");
    }

    #[test]
    fn tolerates_trailing_slashes() {
        let url = rewrite_target_url(
            "/v1/",
            "https://api.upstream.example/v1/",
            "/v1/chat/completions",
            None,
        );
        assert_eq!(url, "https://api.upstream.example/v1/chat/completions");
    }
}
