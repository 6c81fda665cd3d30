//! In-process gateway stand-in.

use async_trait::async_trait;
use rand::Rng;
use secrecy::SecretString;

use crate::error::GatewayError;
use crate::gateway::{GatewayClient, WorkOutcome};

/// Stand-in gateway that fulfils the contract without a network hop.
///
/// Submissions always succeed and each poll rolls a uniform XP gain
/// in `[xp_min, xp_max]`.
pub struct MockGateway {
    xp_min: u64,
    xp_max: u64,
}

impl MockGateway {
    pub fn new(xp_min: u64, xp_max: u64) -> Self {
        debug_assert!(xp_min <= xp_max);
        Self { xp_min, xp_max }
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn start_work(
        &self,
        uid: &str,
        _credential: &SecretString,
        _target_level: Option<u32>,
    ) -> Result<(), GatewayError> {
        tracing::debug!(uid = %uid, "Mock gateway queued work");
        Ok(())
    }

    async fn poll_outcome(&self, uid: &str) -> Result<WorkOutcome, GatewayError> {
        let gained_xp = rand::thread_rng().gen_range(self.xp_min..=self.xp_max);
        tracing::debug!(uid = %uid, gained_xp, "Mock gateway rolled outcome");
        Ok(WorkOutcome { gained_xp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_stays_within_bounds() {
        let gateway = MockGateway::new(50, 250);
        for _ in 0..100 {
            let outcome = gateway.poll_outcome("u1").await.unwrap();
            assert!((50..=250).contains(&outcome.gained_xp));
        }
    }

    #[tokio::test]
    async fn start_work_never_fails() {
        let gateway = MockGateway::new(0, 0);
        let credential = SecretString::from("tok");
        gateway.start_work("u1", &credential, Some(3)).await.unwrap();
        assert_eq!(
            gateway.poll_outcome("u1").await.unwrap(),
            WorkOutcome { gained_xp: 0 }
        );
    }
}
