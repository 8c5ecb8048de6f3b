pub mod http;
#[cfg(test)]
pub mod memory;

use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::AuthSession;
use crate::domain::models::CollectionBox;
use crate::domain::models::CollectionName;

pub struct CollectionManager {}

impl CollectionManager {
    pub fn get(name: CollectionName) -> Result<CollectionBox> {
        if name == CollectionName::Http {
            return Ok(Arc::<http::HttpCollection>::default());
        }

        bail!(format!("No collection implemented for {name}"))
    }

    /// Signed in only when a remote backend, URL and token are all configured.
    pub fn session_from_config() -> Result<AuthSession> {
        let backend = Config::get(ConfigKey::RemoteBackend);
        let name = match CollectionName::parse(backend.to_string()) {
            Some(name) => name,
            None => bail!(format!("Unknown remote backend {backend}")),
        };

        if name == CollectionName::None {
            return Ok(AuthSession::signed_out());
        }

        if Config::get(ConfigKey::RemoteURL).is_empty()
            || Config::get(ConfigKey::RemoteToken).is_empty()
        {
            tracing::debug!(backend = %name, "Remote URL or token missing, syncing disabled");
            return Ok(AuthSession::signed_out());
        }

        return Ok(AuthSession::signed_in(CollectionManager::get(name)?));
    }
}
