//! Outbound call that opens the door.
//!
//! The relay is a webhook (typically a home automation endpoint). The webhook
//! URL usually embeds its own secret, so it is never logged or echoed: errors
//! are stripped of the URL and `Debug` only shows the host.

use crate::APP_USER_AGENT;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::{fmt, time::Duration};
use tracing::{debug, error, instrument};
use url::Url;

pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Success,
    RelayRejected(String),
    RelayUnreachable(String),
}

#[async_trait]
pub trait RelayNotifier: Send + Sync {
    /// Trigger the relay once. Never fails; transport problems become an outcome.
    async fn notify(&self) -> RelayOutcome;
}

#[derive(Clone)]
pub struct WebhookRelay {
    client: Client,
    url: Url,
}

impl WebhookRelay {
    /// Build a relay client with a bounded request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build relay HTTP client")?;

        Ok(Self { client, url })
    }
}

impl fmt::Debug for WebhookRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRelay")
            .field("host", &self.url.host_str().unwrap_or(""))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RelayNotifier for WebhookRelay {
    #[instrument]
    async fn notify(&self) -> RelayOutcome {
        match self.client.post(self.url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("relay accepted: {}", response.status());
                RelayOutcome::Success
            }
            Ok(response) => {
                let status = response.status();
                error!("relay rejected the request: {status}");
                RelayOutcome::RelayRejected(format!("relay responded with status {status}"))
            }
            Err(err) => {
                let timed_out = err.is_timeout();
                let err = err.without_url();
                error!("relay request failed: {err}");
                if timed_out {
                    RelayOutcome::RelayUnreachable("relay request timed out".to_string())
                } else {
                    RelayOutcome::RelayUnreachable("relay unreachable".to_string())
                }
            }
        }
    }
}
