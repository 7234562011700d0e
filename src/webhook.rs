use anyhow::{Context, Result};
use tracing::{error, info};

use crate::api::ApiClient;
use crate::secret::SecretToken;

/// A webhook currently registered with the Bot API.
///
/// Call [`RegisteredWebhook::release`] once the server has stopped so the
/// registration is removed. Release never fails: problems are only logged.
#[must_use = "a registered webhook should be released on shutdown"]
pub struct RegisteredWebhook {
    api: ApiClient,
    url: String,
}

/// Register `url` as the delivery target, authenticated by `secret`.
pub async fn register(
    api: &ApiClient,
    url: &str,
    secret: &SecretToken,
) -> Result<RegisteredWebhook> {
    api.set_webhook(url, secret)
        .await
        .context("error setting webhook")?;

    info!("Webhook registered for {}", url);

    Ok(RegisteredWebhook {
        api: api.clone(),
        url: url.to_string(),
    })
}

impl RegisteredWebhook {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn release(self) {
        match self.api.delete_webhook().await {
            Ok(()) => info!("Webhook for {} deleted", self.url),
            Err(e) => error!("Failed to delete webhook for {}: {:#}", self.url, e),
        }
    }
}
