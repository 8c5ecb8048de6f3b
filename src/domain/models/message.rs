#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;

use super::ActionTurn;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSettings {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub provider: String,
}

/// Older writers stored timestamps as floats.
fn epoch_millis<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = <f64 as serde::Deserialize>::deserialize(deserializer)?;
    return Ok(millis.round() as i64);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub settings: MessageSettings,
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "epoch_millis")]
    pub timestamp: i64,
}

impl Message {
    /// One line summary used by the CLI when listing a chat.
    pub fn summary(&self) -> String {
        let mut response = self
            .response
            .split('\n')
            .next()
            .unwrap_or_default()
            .to_string();

        if response.chars().count() >= 70 {
            response = format!("{}...", response.chars().take(67).collect::<String>());
        }

        return format!(
            "> {}\n  {} ({}/{})",
            self.prompt, response, self.settings.provider, self.settings.model
        );
    }
}

/// Payload owned by `Chat` components.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ChatData {
    /// Reads a chat payload. A fresh component holds `{}`, which reads as an
    /// empty chat. Anything else that doesn't parse is an error, so callers
    /// never mistake unreadable history for no history.
    pub fn from_value(data: &Value) -> Result<ChatData> {
        if data.is_null() {
            return Ok(ChatData::default());
        }

        return serde_json::from_value::<ChatData>(data.clone())
            .context("Chat payload can't be read");
    }

    /// Appends `message` to a raw chat payload. Earlier entries are carried
    /// over exactly as stored, so the store never rewrites a past message.
    pub fn append_to(data: &Value, message: &Message) -> Result<Value> {
        let mut next = if data.is_null() {
            json!({})
        } else {
            data.clone()
        };

        let entry = serde_json::to_value(message)?;
        let object = match next.as_object_mut() {
            Some(object) => object,
            None => bail!("Chat payload is not an object"),
        };

        let messages = object.entry("messages").or_insert_with(|| return json!([]));
        if messages.is_null() {
            *messages = json!([]);
        }

        match messages.as_array_mut() {
            Some(messages) => messages.push(entry),
            None => bail!("Chat payload has no message list"),
        }

        return Ok(next);
    }

    /// Conversation sent to the action endpoint: every stored exchange as a
    /// user/assistant pair, followed by the new prompt.
    ///
    /// Turns are interleaved in the order they happened rather than sending
    /// every prompt ahead of every response, so the endpoint sees each reply
    /// next to the prompt it answered.
    pub fn history(&self, prompt: &str) -> Vec<ActionTurn> {
        let mut turns: Vec<ActionTurn> = vec![];
        for message in self.messages.iter() {
            turns.push(ActionTurn::user(&message.prompt));
            turns.push(ActionTurn::assistant(&message.response));
        }

        turns.push(ActionTurn::user(prompt.trim()));

        return turns;
    }
}
