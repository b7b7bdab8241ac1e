use serde::{Deserialize, Serialize};
use std::time::Duration;

use pulse_core::error::{DiagError, DiagResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTargetConfig {
    pub connection_url: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Bounds connection setup and server selection for every query.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Talk to the given host only, without discovering the topology.
    #[serde(default)]
    pub direct_connection: bool,
}

fn default_app_name() -> String {
    "pulse".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl MongoTargetConfig {
    pub fn new(connection_url: impl Into<String>) -> Self {
        Self {
            connection_url: connection_url.into(),
            app_name: default_app_name(),
            connect_timeout: default_connect_timeout(),
            direct_connection: false,
        }
    }

    pub fn from_yaml(value: &serde_yaml::Value) -> DiagResult<Self> {
        serde_yaml::from_value(value.clone())
            .map_err(|e| DiagError::Config(format!("Invalid MongoDB config: {e}")))
    }
}

/// Strip user info from a connection string so it can be shown in reports.
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &uri[..scheme_end + 3], &rest[at + 1..]),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("connection_url: mongodb://localhost:27017").unwrap();
        let config = MongoTargetConfig::from_yaml(&value).unwrap();
        assert_eq!(config.app_name, "pulse");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.direct_connection);
    }

    #[test]
    fn parses_humantime_timeout() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "{connection_url: 'mongodb://h', connect_timeout: 750ms, direct_connection: true}",
        )
        .unwrap();
        let config = MongoTargetConfig::from_yaml(&value).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(750));
        assert!(config.direct_connection);
    }

    #[test]
    fn missing_url_is_config_error() {
        let value: serde_yaml::Value = serde_yaml::from_str("app_name: x").unwrap();
        assert!(matches!(
            MongoTargetConfig::from_yaml(&value),
            Err(DiagError::Config(_))
        ));
    }

    #[test]
    fn redacts_credentials() {
        assert_eq!(
            redact_uri("mongodb://admin:s3cr@t@db1:27017,db2:27017/social?replicaSet=rs0"),
            "mongodb://db1:27017,db2:27017/social?replicaSet=rs0"
        );
        assert_eq!(
            redact_uri("mongodb+srv://u:p@cluster0.example.net"),
            "mongodb+srv://cluster0.example.net"
        );
        assert_eq!(redact_uri("mongodb://localhost:27017"), "mongodb://localhost:27017");
        assert_eq!(redact_uri("not a uri"), "not a uri");
    }
}
