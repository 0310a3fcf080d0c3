//! HTTP adapter: axum routes, the auth middleware in front of the quota
//! gate, and the streaming response bridge.

pub mod proxy;

pub use proxy::{HealthProbe, ProxyState, proxy_router};
