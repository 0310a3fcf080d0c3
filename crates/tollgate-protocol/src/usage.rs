use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sse::DataLineBuffer;

/// Raw token counts extracted from upstream telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cached_tokens: i64,
}

impl TokenUsage {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.cached_tokens == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// `text/event-stream`: usage is probed per `data:` line.
    EventStream,
    /// Anything else: the whole body is buffered and parsed once at the end.
    Json,
}

#[derive(Debug, Clone, Deserialize)]
struct UsageObject {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    input_tokens_details: InputTokensDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ResponseWrapper {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    usage: UsageObject,
}

#[derive(Debug, Deserialize)]
struct TopLevel {
    usage: UsageObject,
}

/// Known telemetry envelopes, tried in order; anything else is `Unknown`
/// and carries no usage.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UsageEnvelope {
    TopLevel(TopLevel),
    Response(ResponseWrapper),
    Unknown(serde_json::Value),
}

impl UsageEnvelope {
    fn into_usage(self) -> Option<TokenUsage> {
        let usage = match self {
            UsageEnvelope::TopLevel(body) => body.usage,
            UsageEnvelope::Response(wrapper) => wrapper.response.usage,
            UsageEnvelope::Unknown(_) => return None,
        };
        Some(TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_tokens: usage.input_tokens_details.cached_tokens,
        })
    }
}

/// Scans one response body for usage telemetry without interfering with the
/// byte pass-through.
///
/// Only the most recently seen usage object is retained: providers emit a
/// cumulative total on the final stream event, so last-write-wins is the
/// billing snapshot.
#[derive(Debug)]
pub struct UsageScanner {
    kind: PayloadKind,
    lines: DataLineBuffer,
    body: Vec<u8>,
    latest: Option<TokenUsage>,
}

impl UsageScanner {
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            lines: DataLineBuffer::new(),
            body: Vec::new(),
            latest: None,
        }
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) {
        self.push(chunk.as_ref());
    }

    pub fn push(&mut self, chunk: &[u8]) {
        match self.kind {
            PayloadKind::EventStream => {
                for payload in self.lines.push(chunk) {
                    self.probe_line(&payload);
                }
            }
            PayloadKind::Json => self.body.extend_from_slice(chunk),
        }
    }

    /// Consumes the scanner at end-of-stream (or client disconnect) and
    /// returns the billing snapshot, if any telemetry was seen.
    pub fn finish(mut self) -> Option<TokenUsage> {
        match self.kind {
            PayloadKind::EventStream => {
                for payload in self.lines.finish() {
                    self.probe_line(&payload);
                }
            }
            PayloadKind::Json => {
                if !self.body.is_empty() {
                    match serde_json::from_slice::<UsageEnvelope>(&self.body) {
                        Ok(envelope) => {
                            if let Some(usage) = envelope.into_usage() {
                                self.latest = Some(usage);
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "unparseable upstream response body, no usage recorded");
                        }
                    }
                }
            }
        }
        self.latest
    }

    fn probe_line(&mut self, payload: &str) {
        match serde_json::from_str::<UsageEnvelope>(payload) {
            Ok(envelope) => {
                if let Some(usage) = envelope.into_usage() {
                    self.latest = Some(usage);
                }
            }
            Err(err) => {
                // Malformed telemetry is skipped, never fatal.
                tracing::debug!(error = %err, "skipping malformed usage telemetry line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_usage_object_wins() {
        let mut scanner = UsageScanner::new(PayloadKind::EventStream);
        scanner.push(b"data: {\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}\n");
        scanner.push(b"data: {\"choices\":[]}\n");
        scanner.push(b"data: {\"usage\":{\"input_tokens\":42,\"output_tokens\":7}}\n");
        let usage = scanner.finish().unwrap();
        assert_eq!(usage.input_tokens, 42);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.cached_tokens, 0);
    }

    #[test]
    fn malformed_line_does_not_abort_extraction() {
        let mut scanner = UsageScanner::new(PayloadKind::EventStream);
        scanner.push(b"data: {not valid json\n");
        scanner.push(b"data: {\"usage\":{\"input_tokens\":5,\"output_tokens\":3}}\n");
        let usage = scanner.finish().unwrap();
        assert_eq!(usage.input_tokens, 5);
    }

    #[test]
    fn response_envelope_is_resolved() {
        let mut scanner = UsageScanner::new(PayloadKind::EventStream);
        scanner.push(
            b"data: {\"response\":{\"usage\":{\"input_tokens\":9,\"output_tokens\":2,\"input_tokens_details\":{\"cached_tokens\":4}}}}\n",
        );
        let usage = scanner.finish().unwrap();
        assert_eq!(usage.input_tokens, 9);
        assert_eq!(usage.cached_tokens, 4);
    }

    #[test]
    fn top_level_envelope_takes_precedence() {
        // A body carrying both shapes resolves to the top-level usage.
        let mut scanner = UsageScanner::new(PayloadKind::Json);
        scanner.push(
            b"{\"usage\":{\"input_tokens\":1,\"output_tokens\":1},\"response\":{\"usage\":{\"input_tokens\":99,\"output_tokens\":99}}}",
        );
        assert_eq!(scanner.finish().unwrap().input_tokens, 1);
    }

    #[test]
    fn buffered_json_body_is_parsed_once() {
        let mut scanner = UsageScanner::new(PayloadKind::Json);
        scanner.push(b"{\"id\":\"resp_1\",\"usage\":{\"input_tokens\":100,");
        scanner.push(b"\"output_tokens\":50,\"input_tokens_details\":{\"cached_tokens\":20}}}");
        let usage = scanner.finish().unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 50);
        assert_eq!(usage.cached_tokens, 20);
    }

    #[test]
    fn stream_without_usage_yields_none() {
        let mut scanner = UsageScanner::new(PayloadKind::EventStream);
        scanner.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n");
        scanner.push(b"data: [DONE]\n");
        assert!(scanner.finish().is_none());
    }

    #[test]
    fn partial_stream_keeps_telemetry_seen_so_far() {
        let mut scanner = UsageScanner::new(PayloadKind::EventStream);
        scanner.push(b"data: {\"usage\":{\"input_tokens\":12,\"output_tokens\":0}}\n");
        scanner.push(b"data: {\"cho");
        // Disconnect: finish without the rest of the stream.
        let usage = scanner.finish().unwrap();
        assert_eq!(usage.input_tokens, 12);
    }
}
