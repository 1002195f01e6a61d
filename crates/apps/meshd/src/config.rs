use std::fs;
use std::path::Path;

use mesh_core::HostConfig;
use serde::Deserialize;

/// On-disk shape of a `meshd` config file. Mirrors [`HostConfig`] plus the
/// local identity fields the binary needs but the core has no opinion on.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    pub app_identifier: String,
    #[serde(default = "default_context")]
    pub context: String,
    pub ack_timeout_ms: Option<u64>,
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

fn default_context() -> String {
    "meshd".to_string()
}

fn default_device_id() -> String {
    "local".to_string()
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::new(self.app_identifier.clone(), self.context.clone());
        if let Some(ack_timeout_ms) = self.ack_timeout_ms {
            config.ack_timeout_ms = ack_timeout_ms;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let config = DaemonConfig::from_toml(r#"app_identifier = "A0A1A2A3""#).unwrap();
        assert_eq!(config.context, "meshd");
        assert_eq!(config.device_id, "local");
        assert_eq!(config.host_config().app_identifier, "A0A1A2A3");
    }

    #[test]
    fn ack_timeout_override_carries_through() {
        let config = DaemonConfig::from_toml(
            r#"
            app_identifier = "A0A1A2A3"
            ack_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.host_config().ack_timeout_ms, 5000);
    }
}
