use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use tollgate_protocol::{PayloadKind, UsageScanner};

use crate::meter::{MeterTicket, UsageMeter};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// SSE comment frame, ignored by event-stream parsers.
const SSE_HEARTBEAT: &[u8] = b": keep-alive\n\n";
/// For non-SSE bodies the only safe filler is whitespace, and only before the
/// first real byte; JSON parsers tolerate leading whitespace.
const PREAMBLE_KEEPALIVE: &[u8] = b"\n";

/// Relays upstream chunks to the client while feeding a copy to the usage
/// scanner, emitting heartbeats across idle gaps.
///
/// The returned receiver is the client-facing body. Metering happens inside
/// the spawned task so it completes even when the client disconnects mid
/// stream: whatever telemetry was observed up to that point is committed.
pub fn tee_usage_stream(
    mut upstream: mpsc::Receiver<Bytes>,
    kind: PayloadKind,
    mut scanner: UsageScanner,
    meter: Arc<UsageMeter>,
    ticket: MeterTicket,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(16);

    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seen_data = false;
        let mut client_gone = false;

        loop {
            tokio::select! {
                chunk = upstream.recv() => {
                    let Some(chunk) = chunk else {
                        break;
                    };
                    scanner.push_bytes(&chunk);
                    seen_data = true;
                    heartbeat.reset();
                    if tx.send(chunk).await.is_err() {
                        client_gone = true;
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    let frame = match kind {
                        PayloadKind::EventStream => SSE_HEARTBEAT,
                        // Once real body bytes went out, injecting filler
                        // would corrupt the payload; rely on the bytes
                        // themselves to keep the connection alive.
                        PayloadKind::Json if seen_data => continue,
                        PayloadKind::Json => PREAMBLE_KEEPALIVE,
                    };
                    if tx.send(Bytes::from_static(frame)).await.is_err() {
                        client_gone = true;
                        break;
                    }
                }
            }
        }

        if client_gone {
            tracing::debug!(
                api_key_id = ticket.api_key_id,
                "client disconnected mid stream, committing partial usage"
            );
            // Drain what the upstream already produced so the billing
            // snapshot reflects everything it sent before we drop it.
            while let Ok(chunk) = upstream.try_recv() {
                scanner.push_bytes(&chunk);
            }
        }

        meter.record(&ticket, scanner.finish()).await;
    });

    rx
}
