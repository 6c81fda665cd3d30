//! Work gateway integration.
//!
//! Supports two modes:
//! - **Mock** (`internal-mock`): in-process stand-in, no network hop,
//!   never times out.
//! - **Remote**: real gateway over HTTP with bearer-token auth and a
//!   bounded per-request timeout.

mod mock;
mod remote;

pub use mock::MockGateway;
pub use remote::RemoteGateway;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::{GatewayConfig, GatewayMode};
use crate::error::GatewayError;

/// Outcome of one polled work cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOutcome {
    /// XP gained this cycle. Never negative; a gateway outcome cannot
    /// subtract progress.
    pub gained_xp: u64,
}

/// The two-operation contract the account loop depends on.
///
/// Neither operation retries; backoff is not this layer's concern.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Submit a work request for an account.
    async fn start_work(
        &self,
        uid: &str,
        credential: &SecretString,
        target_level: Option<u32>,
    ) -> Result<(), GatewayError>;

    /// Poll the outcome of the account's current work.
    async fn poll_outcome(&self, uid: &str) -> Result<WorkOutcome, GatewayError>;
}

/// Create a gateway client based on configuration.
pub fn create_gateway(config: &GatewayConfig) -> Arc<dyn GatewayClient> {
    match &config.mode {
        GatewayMode::Mock => {
            tracing::info!(
                xp_min = config.xp_min,
                xp_max = config.xp_max,
                "Using internal mock gateway"
            );
            Arc::new(MockGateway::new(config.xp_min, config.xp_max))
        }
        GatewayMode::Remote { base_url } => {
            tracing::info!(base_url = %base_url, "Using remote gateway");
            Arc::new(RemoteGateway::new(
                base_url.clone(),
                config.api_token.clone(),
                config.request_timeout,
            ))
        }
    }
}
