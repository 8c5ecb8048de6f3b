#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Collection;
use crate::domain::models::RecordPayload;
use crate::domain::models::RemoteRecord;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AddResponse {
    id: String,
}

/// Collection served over HTTP at `{url}/collections/{collection}`.
pub struct HttpCollection {
    url: String,
    collection: String,
    token: String,
    timeout: String,
}

impl Default for HttpCollection {
    fn default() -> HttpCollection {
        return HttpCollection {
            url: Config::get(ConfigKey::RemoteURL),
            collection: Config::get(ConfigKey::RemoteCollection),
            token: Config::get(ConfigKey::RemoteToken),
            timeout: Config::get(ConfigKey::RemoteTimeout),
        };
    }
}

impl HttpCollection {
    fn endpoint(&self) -> String {
        return format!(
            "{url}/collections/{collection}",
            url = self.url.trim_end_matches('/'),
            collection = self.collection
        );
    }

    fn client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .build()?;

        return Ok(client);
    }
}

#[async_trait]
impl Collection for HttpCollection {
    #[allow(clippy::implicit_return)]
    async fn get_all(&self) -> Result<Vec<RemoteRecord>> {
        let res = self
            .client()?
            .get(self.endpoint())
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                collection = %self.collection,
                "Failed to list remote records"
            );
            bail!(format!(
                "Failed to list remote records, status {}",
                res.status().as_u16()
            ));
        }

        let records = res.json::<Vec<RemoteRecord>>().await?;
        return Ok(records);
    }

    #[allow(clippy::implicit_return)]
    async fn add(&self, record: RecordPayload) -> Result<String> {
        let res = self
            .client()?
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(&record)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                local_id = %record.local_id,
                "Failed to create remote record"
            );
            bail!(format!(
                "Failed to create remote record, status {}",
                res.status().as_u16()
            ));
        }

        let body = res.json::<AddResponse>().await?;
        return Ok(body.id);
    }

    #[allow(clippy::implicit_return)]
    async fn update(&self, id: &str, record: RecordPayload) -> Result<()> {
        let res = self
            .client()?
            .put(format!("{endpoint}/{id}", endpoint = self.endpoint()))
            .bearer_auth(&self.token)
            .json(&record)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                remote_id = id,
                "Failed to update remote record"
            );
            bail!(format!(
                "Failed to update remote record {id}, status {}",
                res.status().as_u16()
            ));
        }

        return Ok(());
    }
}
