pub mod types;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used, so the gateway can start with zero configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config: file not found, using defaults, path={}", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RTUN_TENANCY_ENABLED") {
            self.tenancy.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("RTUN_TENANCY_HEADER") {
            self.tenancy.header_name = v;
        }
        if let Ok(v) = std::env::var("RTUN_OUTBOX_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                self.tunnel.outbox_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("RTUN_RESPONSE_TIMEOUT_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.tunnel.response_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("RTUN_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("RTUN_LOG_JSON") {
            self.logging.json = v == "true" || v == "1";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tunnel.outbox_capacity == 0 {
            anyhow::bail!("tunnel.outbox_capacity must be greater than zero");
        }
        if self.tunnel.response_timeout_secs == 0 {
            anyhow::bail!("tunnel.response_timeout_secs must be greater than zero");
        }
        if self.tenancy.enabled && self.tenancy.header_name.trim().is_empty() {
            anyhow::bail!("tenancy.header_name cannot be empty when tenancy is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tunnel.outbox_capacity, 64);
        assert!(!config.tenancy.enabled);
    }

    #[test]
    fn zero_outbox_capacity_is_rejected() {
        let mut config = GatewayConfig::default();
        config.tunnel.outbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabling_tenancy_with_blank_header_is_rejected() {
        let mut config = GatewayConfig::default();
        config.tenancy.enabled = true;
        config.tenancy.header_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = GatewayConfig::load(Path::new("/nonexistent/rtun.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
