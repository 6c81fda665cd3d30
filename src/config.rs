//! Environment-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

/// Which gateway implementation to wire in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// In-process stand-in that never performs a network hop.
    #[default]
    Mock,
    /// Real remote gateway reached over HTTP.
    Remote { base_url: String },
}

impl std::str::FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "internal-mock" | "mock" => Ok(GatewayMode::Mock),
            url if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(GatewayMode::Remote {
                    base_url: url.trim_end_matches('/').to_string(),
                })
            }
            other => Err(format!(
                "invalid gateway base '{}', expected 'internal-mock' or an http(s) URL",
                other
            )),
        }
    }
}

/// Gateway client configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    /// Bearer token for the remote gateway. Never logged.
    pub api_token: SecretString,
    /// Per-request timeout for remote calls.
    pub request_timeout: Duration,
    /// Bounds for the stand-in's XP roll.
    pub xp_min: u64,
    pub xp_max: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Mock,
            api_token: SecretString::from("CHANGE_ME"),
            request_timeout: Duration::from_secs(30),
            xp_min: 50,
            xp_max: 250,
        }
    }
}

/// Supervisor loop timing.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait between submitting work and polling its outcome.
    pub cycle_wait: Duration,
    /// Short pause between cycles.
    pub yield_wait: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_wait: Duration::from_secs(180),
            yield_wait: Duration::from_secs(1),
        }
    }
}

/// Top-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_accounts: usize,
    pub gateway: GatewayConfig,
    pub supervisor: SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_accounts: 20,
            gateway: GatewayConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Ok(bind) = std::env::var("LEVELPILOT_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid LEVELPILOT_BIND '{}': {}", bind, e))?;
        }
        if let Ok(base) = std::env::var("GATEWAY_BASE") {
            config.gateway.mode = base.parse().map_err(|e| anyhow::anyhow!("{}", e))?;
        }
        if let Ok(token) = std::env::var("GATEWAY_TOKEN") {
            config.gateway.api_token = SecretString::from(token);
        }
        if let Some(secs) = env_u64("XP_PERIOD_SECONDS") {
            config.supervisor.cycle_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("XP_YIELD_SECONDS") {
            config.supervisor.yield_wait = Duration::from_secs(secs);
        }
        if let Some(min) = env_u64("XP_MIN") {
            config.gateway.xp_min = min;
        }
        if let Some(max) = env_u64("XP_MAX") {
            config.gateway.xp_max = max;
        }
        if config.gateway.xp_max < config.gateway.xp_min {
            anyhow::bail!(
                "XP_MAX ({}) must not be below XP_MIN ({})",
                config.gateway.xp_max,
                config.gateway.xp_min
            );
        }
        if let Some(max) = env_u64("MAX_ACCOUNTS") {
            config.max_accounts = max as usize;
        }

        Ok(config)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
