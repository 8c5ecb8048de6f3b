#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use serde_json::Value;

use super::LocalStore;
use super::RemoteBridge;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ActionEndpointBox;
use crate::domain::models::ActionRequest;
use crate::domain::models::ChatData;
use crate::domain::models::ComponentType;
use crate::domain::models::Message;
use crate::domain::models::SyncOutcome;

/// Hosts a `Chat` component: sends prompts to the action endpoint and stores
/// each reply through the component's bridge.
pub struct ChatComponent {
    store: LocalStore,
    endpoint: ActionEndpointBox,
    model: String,
    provider: String,
}

impl ChatComponent {
    pub fn new(store: LocalStore, endpoint: ActionEndpointBox) -> ChatComponent {
        return ChatComponent {
            store,
            endpoint,
            model: Config::get(ConfigKey::Model),
            provider: Config::get(ConfigKey::Provider),
        };
    }

    pub fn with_settings(mut self, model: &str, provider: &str) -> ChatComponent {
        self.model = model.to_string();
        self.provider = provider.to_string();
        return self;
    }

    /// Raw payload of the chat behind `bridge`.
    fn current(&self, bridge: &RemoteBridge) -> Result<Value> {
        let component = bridge.component();
        if component.kind != ComponentType::Chat {
            bail!(format!("Component is a {}, not a Chat", component.kind));
        }

        match self.store.resolve_component(component) {
            Some(config) => return Ok(config.data),
            None => {
                bail!(format!(
                    "Chat component {} of project {} no longer exists",
                    component.index, component.project_id
                ));
            }
        }
    }

    /// Asks the endpoint for a reply and appends it. The chat is read again
    /// after the reply arrives, so anything merged in the meantime is kept.
    /// A chat whose stored messages can't be read is left alone.
    pub async fn submit(
        &self,
        bridge: &mut RemoteBridge,
        prompt: &str,
    ) -> Result<(Message, SyncOutcome)> {
        if prompt.trim().is_empty() {
            bail!("Prompt is empty");
        }

        let history = ChatData::from_value(&self.current(bridge)?)?.history(prompt);
        let request = ActionRequest {
            model: self.model.to_string(),
            provider: self.provider.to_string(),
            project_id: bridge.component().project_id.to_string(),
            component_index: bridge.component().index,
            messages: history,
        };

        let message = self.endpoint.chat(request).await?;

        let next = ChatData::append_to(&self.current(bridge)?, &message)?;
        let outcome = bridge.update_data(next).await;

        return Ok((message, outcome));
    }
}
