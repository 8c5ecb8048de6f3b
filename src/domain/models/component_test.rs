use anyhow::Result;
use serde_json::json;

use super::ComponentConfig;
use super::ComponentRef;
use super::ComponentType;

#[test]
fn it_parses_component_types() {
    assert_eq!(ComponentType::parse("Chat"), Some(ComponentType::Chat));
    assert_eq!(
        ComponentType::parse("Notebook Page"),
        Some(ComponentType::NotebookPage)
    );
    assert_eq!(ComponentType::parse("NotebookPage"), None);
    assert_eq!(ComponentType::parse("chat"), None);
}

#[test]
fn it_starts_components_with_empty_data() {
    let config = ComponentConfig::new(ComponentType::CodeGen);
    assert_eq!(config.kind, ComponentType::CodeGen);
    assert_eq!(config.data, json!({}));
}

#[test]
fn it_serializes_with_display_names() -> Result<()> {
    let config = ComponentConfig::new(ComponentType::NotebookPage);
    let value = serde_json::to_value(&config)?;
    assert_eq!(value, json!({ "type": "Notebook Page", "data": {} }));

    return Ok(());
}

#[test]
fn it_defaults_missing_data() -> Result<()> {
    let config: ComponentConfig = serde_json::from_value(json!({ "type": "Chat" }))?;
    assert_eq!(config.data, json!({}));

    return Ok(());
}

#[test]
fn it_rejects_unknown_types() {
    let res = serde_json::from_value::<ComponentConfig>(json!({ "type": "Spreadsheet" }));
    assert!(res.is_err());
}

#[test]
fn it_keys_refs_by_position() {
    let component = ComponentRef::new("p1", 2, ComponentType::Chat);
    assert_eq!(component.key(), ("p1".to_string(), 2));
}
