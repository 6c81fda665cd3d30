//! Remote gateway client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::gateway::{GatewayClient, WorkOutcome};

/// HTTP client for a real work gateway.
///
/// Every request carries the configured bearer token and is bounded by
/// the request timeout; a timed-out call surfaces as `GatewayError`.
pub struct RemoteGateway {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

#[derive(Serialize)]
struct StartWorkRequest<'a> {
    uid: &'a str,
    account_token: &'a str,
    target_level: Option<u32>,
}

#[derive(Deserialize)]
struct PollResponse {
    #[serde(default)]
    gained_xp: u64,
}

impl RemoteGateway {
    pub fn new(base_url: String, api_token: SecretString, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_token,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GatewayClient for RemoteGateway {
    async fn start_work(
        &self,
        uid: &str,
        credential: &SecretString,
        target_level: Option<u32>,
    ) -> Result<(), GatewayError> {
        let url = self.api_url("queue/start");
        tracing::debug!(uid = %uid, "Submitting work to gateway");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&StartWorkRequest {
                uid,
                account_token: credential.expose_secret(),
                target_level,
            })
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn poll_outcome(&self, uid: &str) -> Result<WorkOutcome, GatewayError> {
        let url = self.api_url("queue/status");
        tracing::debug!(uid = %uid, "Polling gateway for outcome");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_token.expose_secret())
            .query(&[("uid", uid)])
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let poll: PollResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        Ok(WorkOutcome {
            gained_xp: poll.gained_xp,
        })
    }
}
