#[cfg(test)]
#[path = "component_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumVariantNames, strum::Display,
)]
pub enum ComponentType {
    TypeA,
    TypeB,
    TypeC,
    Chat,
    StreamChat,
    CodeGen,
    LocalChat,
    LocalSpeech,
    Emojis,
    #[serde(rename = "Notebook Page")]
    #[strum(serialize = "Notebook Page")]
    NotebookPage,
}

impl ComponentType {
    pub fn parse(text: &str) -> Option<ComponentType> {
        return ComponentType::iter().find(|e| return e.to_string() == text);
    }

    /// Payload a freshly assigned component starts with. Every kind currently
    /// starts empty and fills its own shape on first write.
    pub fn default_data(&self) -> Value {
        return json!({});
    }
}

fn empty_data() -> Value {
    return json!({});
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default = "empty_data")]
    pub data: Value,
}

impl ComponentConfig {
    pub fn new(kind: ComponentType) -> ComponentConfig {
        return ComponentConfig {
            kind,
            data: kind.default_data(),
        };
    }
}

/// Positional handle to a component, captured by whoever renders or syncs it.
///
/// Components have no id of their own, so a handle goes stale as soon as the
/// project's component list is reordered or shrunk. The captured `kind` lets
/// `LocalStore::resolve_component` notice that the slot now holds something
/// else. Re-resolve after every await instead of holding on to the resolved
/// value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    pub project_id: String,
    pub index: usize,
    pub kind: ComponentType,
}

impl ComponentRef {
    pub fn new(project_id: &str, index: usize, kind: ComponentType) -> ComponentRef {
        return ComponentRef {
            project_id: project_id.to_string(),
            index,
            kind,
        };
    }

    pub fn key(&self) -> (String, usize) {
        return (self.project_id.to_string(), self.index);
    }
}
