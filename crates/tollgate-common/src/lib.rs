pub mod pricing;

pub use pricing::{LevelDiscount, ModelPrice, PricingTable};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Database DSN used for this process.
    pub dsn: String,
    /// Base URL of the upstream completion API, e.g. `https://api.openai.com`.
    pub upstream_base_url: String,
    /// Public path prefix this service answers on; it is replaced by the
    /// upstream base URL when forwarding.
    pub public_base_path: String,
    /// Service credential injected into forwarded requests.
    pub upstream_api_key: String,
    /// Optional path to a pricing table JSON file.
    pub pricing_file: Option<String>,
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dsn: Option<String>,
    pub upstream_base_url: Option<String>,
    pub public_base_path: Option<String>,
    pub upstream_api_key: Option<String>,
    pub pricing_file: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        if other.upstream_base_url.is_some() {
            self.upstream_base_url = other.upstream_base_url;
        }
        if other.public_base_path.is_some() {
            self.public_base_path = other.public_base_path;
        }
        if other.upstream_api_key.is_some() {
            self.upstream_api_key = other.upstream_api_key;
        }
        if other.pricing_file.is_some() {
            self.pricing_file = other.pricing_file;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8788),
            dsn: self.dsn.ok_or(GlobalConfigError::MissingField("dsn"))?,
            upstream_base_url: self
                .upstream_base_url
                .ok_or(GlobalConfigError::MissingField("upstream_base_url"))?,
            public_base_path: self.public_base_path.unwrap_or_else(|| "/v1".to_string()),
            upstream_api_key: self
                .upstream_api_key
                .ok_or(GlobalConfigError::MissingField("upstream_api_key"))?,
            pricing_file: self.pricing_file,
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            dsn: Some(value.dsn),
            upstream_base_url: Some(value.upstream_base_url),
            public_base_path: Some(value.public_base_path),
            upstream_api_key: Some(value.upstream_api_key),
            pricing_file: value.pricing_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_patch() -> GlobalConfigPatch {
        GlobalConfigPatch {
            dsn: Some("sqlite::memory:".to_string()),
            upstream_base_url: Some("https://api.example.com".to_string()),
            upstream_api_key: Some("svc-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn overlay_prefers_later_layer() {
        let mut patch = base_patch();
        patch.overlay(GlobalConfigPatch {
            port: Some(9000),
            upstream_api_key: Some("override".to_string()),
            ..Default::default()
        });
        let config = patch.into_config().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.upstream_api_key, "override");
        assert_eq!(config.public_base_path, "/v1");
    }

    #[test]
    fn missing_upstream_url_is_an_error() {
        let mut patch = base_patch();
        patch.upstream_base_url = None;
        assert!(patch.into_config().is_err());
    }
}
