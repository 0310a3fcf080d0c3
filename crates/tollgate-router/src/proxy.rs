use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures_util::StreamExt;
use time::OffsetDateTime;
use tokio_stream::wrappers::ReceiverStream;

use tollgate_common::GlobalConfig;
use tollgate_core::headers::is_hop_by_hop_or_framing_header;
use tollgate_core::{
    GateContext, GateError, Headers, MeterTicket, QuotaGate, UpstreamBody, UpstreamClient,
    UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse, UsageMeter, rewrite_target_url,
    sanitize_forward_headers, tee_usage_stream,
};
use tollgate_protocol::{PayloadKind, UsageScanner};

const MAX_REQUEST_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Liveness of the backing store, checked by `/healthz`.
pub trait HealthProbe: Send + Sync {
    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

#[derive(Clone)]
pub struct ProxyState {
    pub gate: Arc<QuotaGate>,
    pub meter: Arc<UsageMeter>,
    pub client: Arc<dyn UpstreamClient>,
    pub health: Arc<dyn HealthProbe>,
    pub config: Arc<GlobalConfig>,
}

#[derive(Clone)]
struct RequestTraceId(String);

pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/{*rest}", post(relay))
        .layer(middleware::from_fn_with_state(state.clone(), gate_auth))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn gate_auth(
    State(state): State<ProxyState>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();
    let secret = extract_bearer(req.headers());
    req.extensions_mut().insert(RequestTraceId(trace_id.clone()));

    let Some(secret) = secret else {
        tracing::info!(trace_id, "request without credential");
        return gate_notice_response(&GateError::KeyInvalid);
    };

    match state.gate.check(&secret, OffsetDateTime::now_utc()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => {
            tracing::info!(trace_id, code = err.code(), "gate rejected request");
            gate_notice_response(&err)
        }
    }
}

/// Bearer credential from `authorization` (preferred) or `x-api-key`.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        let trimmed = value.trim();
        if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
            let key = trimmed[7..].trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Gate failures answer 200 with a completion-shaped body: the callers are
/// AI coding assistants that surface assistant text to the user, while a bare
/// 4xx would be retried or swallowed.
fn gate_notice_response(err: &GateError) -> Response {
    let body = serde_json::json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        "object": "chat.completion",
        "created": OffsetDateTime::now_utc().unix_timestamp(),
        "model": "tollgate",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": err.notice() },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 }
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn healthz(State(state): State<ProxyState>) -> Response {
    if state.health.check().await {
        (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded"})),
        )
            .into_response()
    }
}

async fn relay(
    State(state): State<ProxyState>,
    Extension(ctx): Extension<GateContext>,
    Extension(trace_id): Extension<RequestTraceId>,
    req: axum::http::Request<Body>,
) -> Response {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let inbound_headers = headers_to_vec(req.headers());

    let body = match axum::body::to_bytes(req.into_body(), MAX_REQUEST_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request_body_too_large").into_response();
        }
    };
    let model = probe_model(&body);

    let url = rewrite_target_url(
        &state.config.public_base_path,
        &state.config.upstream_base_url,
        &path,
        query.as_deref(),
    );
    let headers = sanitize_forward_headers(&inbound_headers, &state.config.upstream_api_key);

    tracing::debug!(trace_id = %trace_id.0, url, user_id = ctx.user.user_id, "forwarding");
    let response = match state
        .client
        .send(UpstreamHttpRequest {
            url,
            headers,
            body,
            want_stream: true,
        })
        .await
    {
        Ok(response) => response,
        Err(UpstreamFailure::Timeout) => {
            tracing::warn!(trace_id = %trace_id.0, "upstream timed out");
            return (
                StatusCode::GATEWAY_TIMEOUT,
                Json(serde_json::json!({"error": "upstream_timeout"})),
            )
                .into_response();
        }
        Err(UpstreamFailure::Transport { message }) => {
            tracing::warn!(trace_id = %trace_id.0, error = %message, "upstream fetch failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "upstream_fetch_failed"})),
            )
                .into_response();
        }
    };

    let ticket = MeterTicket::from_context(&ctx, model, OffsetDateTime::now_utc());
    to_axum_response(response, &state, ticket)
}

#[derive(serde::Deserialize)]
struct ModelProbe {
    model: Option<String>,
}

fn probe_model(body: &Bytes) -> Option<String> {
    serde_json::from_slice::<ModelProbe>(body)
        .ok()
        .and_then(|probe| probe.model)
}

fn to_axum_response(resp: UpstreamHttpResponse, state: &ProxyState, ticket: MeterTicket) -> Response {
    let is_success = (200..300).contains(&resp.status);
    let sse_stream =
        has_sse_content_type(&resp.headers) && matches!(&resp.body, UpstreamBody::Stream(_));

    let mut builder = Response::builder().status(resp.status);
    if let Some(map) = builder.headers_mut() {
        for (name, value) in resp.headers {
            // Hyper sets framing itself.
            if is_hop_by_hop_or_framing_header(&name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                map.append(name, value);
            }
        }
        if sse_stream {
            // Hint common reverse proxies to avoid buffering SSE responses.
            map.entry(header::CACHE_CONTROL)
                .or_insert(HeaderValue::from_static("no-cache"));
            map.entry(HeaderName::from_static("x-accel-buffering"))
                .or_insert(HeaderValue::from_static("no"));
        }
    }

    let body = match resp.body {
        UpstreamBody::Bytes(bytes) => {
            if is_success {
                let mut scanner = UsageScanner::new(PayloadKind::Json);
                scanner.push_bytes(&bytes);
                let meter = state.meter.clone();
                tokio::spawn(async move {
                    meter.record(&ticket, scanner.finish()).await;
                });
            }
            Body::from(bytes)
        }
        UpstreamBody::Stream(rx) => {
            let rx = if is_success {
                let kind = if sse_stream {
                    PayloadKind::EventStream
                } else {
                    PayloadKind::Json
                };
                tee_usage_stream(rx, kind, UsageScanner::new(kind), state.meter.clone(), ticket)
            } else {
                rx
            };
            let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
            Body::from_stream(stream)
        }
    };

    builder.body(body).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
    })
}

fn has_sse_content_type(headers: &Headers) -> bool {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

fn headers_to_vec(headers: &HeaderMap) -> Headers {
    let mut out: Headers = Vec::new();
    for (name, value) in headers {
        if let Ok(text) = value.to_str() {
            out.push((name.as_str().to_string(), text.to_string()));
        }
    }
    out
}
