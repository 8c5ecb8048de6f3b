#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ActionEndpoint;
use crate::domain::models::ActionRequest;
use crate::domain::models::Message;

/// Server action that turns a conversation into one reply.
pub struct HttpActionEndpoint {
    url: String,
    timeout: String,
}

impl Default for HttpActionEndpoint {
    fn default() -> HttpActionEndpoint {
        return HttpActionEndpoint {
            url: Config::get(ConfigKey::ActionURL),
            timeout: Config::get(ConfigKey::RemoteTimeout),
        };
    }
}

#[async_trait]
impl ActionEndpoint for HttpActionEndpoint {
    #[allow(clippy::implicit_return)]
    async fn chat(&self, request: ActionRequest) -> Result<Message> {
        let res = reqwest::Client::new()
            .post(&self.url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .json(&request)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                project_id = %request.project_id,
                index = request.component_index,
                "Chat action failed"
            );
            bail!(format!("Chat action failed with status {}", res.status().as_u16()));
        }

        let message = res.json::<Message>().await?;
        return Ok(message);
    }
}
