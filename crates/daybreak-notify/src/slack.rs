//! Slack incoming-webhook sink.

use std::time::Duration;

use daybreak_telemetry::Metrics;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{NotifyError, NotifyResult};
use crate::message::Notification;
use crate::sink::Notifier;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Incoming-webhook URL. Falls back to `SLACK_WEBHOOK_URL` when unset.
    pub webhook_url: Option<String>,
    pub username: String,
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "daybreak".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SlackConfig {
    /// Configured URL, then the environment.
    #[must_use]
    pub fn resolved_url(&self) -> Option<String> {
        self.webhook_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var("SLACK_WEBHOOK_URL").ok())
            .filter(|u| !u.trim().is_empty())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    username: &'a str,
}

/// Posts each notification on its own task. Delivery failures are logged
/// and counted, never returned.
#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    url: String,
    username: String,
}

impl SlackNotifier {
    pub fn new(url: impl Into<String>, config: &SlackConfig) -> NotifyResult<Self> {
        let url = url.into();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(NotifyError::Config(format!("webhook URL must be http(s): {url}")));
        }
        if config.timeout_secs == 0 {
            return Err(NotifyError::Config("timeout_secs must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            username: config.username.clone(),
        })
    }

    /// Build from config, `None` when no URL is configured.
    pub fn from_config(config: &SlackConfig) -> NotifyResult<Option<Self>> {
        config
            .resolved_url()
            .map(|url| Self::new(url, config))
            .transpose()
    }

    /// Deliver one message and wait for the response.
    pub async fn send(&self, text: &str) -> NotifyResult<()> {
        let payload = WebhookPayload {
            text,
            username: &self.username,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, notification: Notification) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime for Slack delivery, notification dropped");
            Metrics::notify_failed();
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            let text = notification.render();
            match this.send(&text).await {
                Ok(()) => debug!("Slack notification delivered"),
                Err(e) => {
                    Metrics::notify_failed();
                    warn!(error = %e, "Slack notification failed");
                }
            }
        });
    }
}
