use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTurn {
    pub role: String,
    pub content: String,
}

impl ActionTurn {
    pub fn user(content: &str) -> ActionTurn {
        return ActionTurn {
            role: "user".to_string(),
            content: content.to_string(),
        };
    }

    pub fn assistant(content: &str) -> ActionTurn {
        return ActionTurn {
            role: "assistant".to_string(),
            content: content.to_string(),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub model: String,
    pub provider: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "componentIndex")]
    pub component_index: usize,
    pub messages: Vec<ActionTurn>,
}

#[async_trait]
pub trait ActionEndpoint {
    /// Sends the conversation so far and returns the single message the
    /// service produced for the last user turn.
    async fn chat(&self, request: ActionRequest) -> Result<Message>;
}

pub type ActionEndpointBox = Box<dyn ActionEndpoint + Send + Sync>;
