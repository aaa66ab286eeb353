//! Configuration handling for the MRCPv2 server.
//!
//! Settings come from the shared YAML config file (the `services.mrcp`
//! block) and are then overridden by environment variables.

use anyhow::Result;
use mrcp_wire::{ResourceType, DEFAULT_MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{info, warn};

/// IANA-registered MRCPv2 port
pub const DEFAULT_PORT: u16 = 1544;

/// MRCPv2 server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrcpConfig {
    /// Address the control listener binds to
    pub listen_addr: SocketAddr,
    /// Largest message accepted or sent, in bytes
    pub max_message_size: usize,
    /// Resource types served by this process
    pub resources: Vec<ResourceType>,
}

impl Default for MrcpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            resources: ResourceType::ALL.to_vec(),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    mrcp: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

impl MrcpConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();
        let path = config_path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root);
                    info!("Loaded configuration from {:?}", path);
                }
                Err(e) => warn!("Failed to parse config file {:?}, using defaults: {}", path, e),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_environment_overrides();

        info!(
            "Final MRCPv2 configuration: listen={}, max_message_size={}, resources={}",
            config.listen_addr,
            config.max_message_size,
            config.resource_list()
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let values = root
            .services
            .and_then(|s| s.mrcp)
            .and_then(|m| m.config)
            .unwrap_or_default();
        for (key, value) in values {
            match key.strip_prefix("services.mrcp.") {
                Some(setting) => self.apply_setting(setting, &value),
                None => warn!("Ignoring configuration key outside services.mrcp: {}", key),
            }
        }
    }

    /// Apply one `name = value` setting; bad values are logged and skipped
    fn apply_setting(&mut self, name: &str, value: &str) {
        match name {
            "listen_addr" => match value.parse() {
                Ok(addr) => self.listen_addr = addr,
                Err(_) => warn!("Invalid listen address {:?}, keeping {}", value, self.listen_addr),
            },
            "max_message_size" => match value.parse::<usize>() {
                Ok(size) if size > 0 => self.max_message_size = size,
                _ => warn!("Invalid max_message_size {:?}, keeping {}", value, self.max_message_size),
            },
            "resources" => match parse_resources(value) {
                Ok(resources) => self.resources = resources,
                Err(e) => warn!("Invalid resource list {:?}: {}", value, e),
            },
            _ => {
                // Ignore unknown configuration keys
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        const OVERRIDES: [(&str, &str); 2] = [
            ("MRCP_LISTEN_ADDR", "listen_addr"),
            ("MRCP_MAX_MESSAGE_SIZE", "max_message_size"),
        ];
        for (variable, setting) in OVERRIDES {
            if let Some(value) = lookup(variable) {
                info!("{} overridden by environment: {}", setting, value);
                self.apply_setting(setting, &value);
            }
        }
    }

    /// Comma-separated resource names, for logging
    pub fn resource_list(&self) -> String {
        self.resources
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a comma-separated list of resource type names
pub fn parse_resources(value: &str) -> Result<Vec<ResourceType>> {
    let mut resources = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let resource: ResourceType = name
            .parse()
            .map_err(|e| anyhow::anyhow!("resource {:?}: {}", name, e))?;
        if !resources.contains(&resource) {
            resources.push(resource);
        }
    }
    if resources.is_empty() {
        anyhow::bail!("no resource types given");
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = MrcpConfig::default();
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.resources.len(), 6);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  mrcp:
    enabled: true
    executable: ./mrcp-server
    config:
      services.mrcp.listen_addr: "127.0.0.1:6075"
      services.mrcp.max_message_size: "65536"
      services.mrcp.resources: "speechsynth, speechrecog"
      services.mrcp.unknown_key: "ignored"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = MrcpConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:6075".parse().unwrap());
        assert_eq!(config.max_message_size, 65536);
        assert_eq!(
            config.resources,
            vec![ResourceType::SpeechSynth, ResourceType::SpeechRecog]
        );
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let mut config = MrcpConfig::default();
        config.apply_setting("listen_addr", "not-an-address");
        config.apply_setting("max_message_size", "0");
        config.apply_setting("resources", "speechsynth,telepathy");
        let defaults = MrcpConfig::default();
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.max_message_size, defaults.max_message_size);
        assert_eq!(config.resources, defaults.resources);
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"services: [unclosed").unwrap();
        let config = MrcpConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = MrcpConfig::default();
        config.apply_overrides(|name| match name {
            "MRCP_LISTEN_ADDR" => Some("10.0.0.1:1554".to_string()),
            "MRCP_MAX_MESSAGE_SIZE" => Some("4096".to_string()),
            _ => None,
        });
        assert_eq!(config.listen_addr, "10.0.0.1:1554".parse().unwrap());
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.resources, MrcpConfig::default().resources);
    }

    #[test]
    fn test_parse_resources() {
        assert_eq!(
            parse_resources("SPEECHRECOG,recorder,speechrecog").unwrap(),
            vec![ResourceType::SpeechRecog, ResourceType::Recorder]
        );
        assert!(parse_resources(" , ").is_err());
    }
}
