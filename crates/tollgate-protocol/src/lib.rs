//! Wire-level parsing for the metering pipeline.
//!
//! This crate intentionally does **not** depend on axum or any concrete HTTP
//! client. It consumes raw response bytes and yields token-usage telemetry;
//! a higher layer performs IO and accounting.

pub mod sse;
pub mod usage;

pub use sse::DataLineBuffer;
pub use usage::{PayloadKind, TokenUsage, UsageScanner};
