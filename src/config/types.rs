use serde::{Deserialize, Serialize};

/// Top-level gateway configuration: the ambient settings that are not part
/// of the CLI-level listen addresses (those stay as `clap` flags since they
/// are per-invocation, not per-deployment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub tenancy: TenancyConfig,

    #[serde(default)]
    pub tunnel: TunnelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controls how the tenant portion of a peer/request identity is resolved
/// (§4.1, §9 open questions). Disabled by default: every peer and request
/// belongs to the sentinel tenant `"none"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tenancy_header")]
    pub header_name: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: default_tenancy_header(),
        }
    }
}

fn default_tenancy_header() -> String {
    "x-scope-orgid".to_string()
}

/// Tunable limits on the multiplexing core itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Bound on each Proxier's outbox channel (requests waiting to be sent
    /// to a peer that hasn't read them yet).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// How long the front-door waits for a peer's response before failing
    /// the request with a `504` (§9: stands in for client-context
    /// cancellation, which the core has no notion of on its own).
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            response_timeout_secs: default_response_timeout_secs(),
        }
    }
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_response_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit newline-delimited JSON instead of human-readable text. Useful
    /// under a log shipper; noisy on an interactive terminal.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
