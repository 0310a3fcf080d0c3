//! The metering pipeline: key validation, quota gate, upstream forwarding,
//! usage extraction hand-off, and counter accumulation.
//!
//! This crate owns the correctness-sensitive parts and stays independent of
//! axum; the router crate adapts it to HTTP.

pub mod cache;
pub mod error;
pub mod forward;
pub mod gate;
pub mod headers;
pub mod meter;
pub mod quota;
pub mod store;
pub mod types;
pub mod upstream;

pub use cache::TtlCache;
pub use error::GateError;
pub use forward::{HEARTBEAT_INTERVAL, tee_usage_stream};
pub use gate::QuotaGate;
pub use headers::{Headers, header_get, sanitize_forward_headers};
pub use meter::{MeterTicket, UsageMeter};
pub use quota::{BilledUsage, calculate_quota};
pub use store::{CounterStore, KeyUserStore, StoreError, StoreResult, UsageCounters};
pub use types::{
    GateContext, KeyRecord, KeySnapshot, MicroUsd, UsageDeltas, UserDetail, decimal_from_micros,
    micros_from_decimal,
};
pub use upstream::{
    UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, WreqUpstreamClient, rewrite_target_url,
};
