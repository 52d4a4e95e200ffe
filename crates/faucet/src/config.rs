//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Faucet service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// JSON-RPC endpoint of the ledger
    pub rpc_url: String,

    /// Commitment level requested for airdrops
    pub commitment: String,

    /// Timeout for a single RPC call (seconds)
    pub rpc_timeout_secs: u64,

    /// Maximum number of wallets tracked by the quota store
    pub quota_capacity: usize,

    /// Lifetime of a quota record after its last write (seconds)
    pub quota_ttl_secs: u64,

    /// Rate limit: time window in seconds
    pub rate_limit_window_secs: u64,

    /// Rate limit: maximum requests per wallet per window
    pub max_requests_per_window: u32,

    /// Interval of the background expiry sweep (seconds)
    pub sweep_interval_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Expose Prometheus metrics on /metrics
    pub metrics_enabled: bool,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            rpc_timeout_secs: 30,
            quota_capacity: 500,
            quota_ttl_secs: 3600, // 1 hour
            rate_limit_window_secs: 3600, // 1 hour
            max_requests_per_window: 2,
            sweep_interval_secs: 60,
            cors_enabled: true,
            metrics_enabled: true,
        }
    }
}

impl FaucetConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load a JSON config file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> FaucetResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FaucetError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| FaucetError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Some(rpc_url) = var("FAUCET_RPC_URL") {
            self.rpc_url = rpc_url;
        }

        if let Some(commitment) = var("FAUCET_COMMITMENT") {
            self.commitment = commitment;
        }

        if let Some(timeout) = var("FAUCET_RPC_TIMEOUT") {
            self.rpc_timeout_secs = timeout.parse().unwrap_or(self.rpc_timeout_secs);
        }

        if let Some(capacity) = var("FAUCET_QUOTA_CAPACITY") {
            self.quota_capacity = capacity.parse().unwrap_or(self.quota_capacity);
        }

        if let Some(ttl) = var("FAUCET_QUOTA_TTL") {
            self.quota_ttl_secs = ttl.parse().unwrap_or(self.quota_ttl_secs);
        }

        if let Some(window) = var("FAUCET_RATE_LIMIT_WINDOW") {
            self.rate_limit_window_secs = window.parse().unwrap_or(self.rate_limit_window_secs);
        }

        if let Some(max_req) = var("FAUCET_MAX_REQUESTS") {
            self.max_requests_per_window = max_req.parse().unwrap_or(self.max_requests_per_window);
        }

        if let Some(interval) = var("FAUCET_SWEEP_INTERVAL") {
            self.sweep_interval_secs = interval.parse().unwrap_or(self.sweep_interval_secs);
        }

        if let Some(enabled) = var("FAUCET_CORS_ENABLED") {
            self.cors_enabled = enabled.to_lowercase() == "true";
        }

        if let Some(enabled) = var("FAUCET_METRICS_ENABLED") {
            self.metrics_enabled = enabled.to_lowercase() == "true";
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> FaucetResult<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(FaucetError::Config("rpc_url must not be empty".to_string()));
        }
        if self.quota_capacity == 0 {
            return Err(FaucetError::Config("quota_capacity must be at least 1".to_string()));
        }
        if self.max_requests_per_window == 0 {
            return Err(FaucetError::Config(
                "max_requests_per_window must be at least 1".to_string(),
            ));
        }
        if self.rate_limit_window_secs == 0 || self.quota_ttl_secs == 0 {
            return Err(FaucetError::Config(
                "rate limit window and quota ttl must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(FaucetError::Config("sweep_interval_secs must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Get rate limit duration
    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Get quota record lifetime
    pub fn quota_ttl(&self) -> Duration {
        Duration::from_secs(self.quota_ttl_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
