use serde_json::json;
use serde_json::Value;

pub fn message_fixture(id: &str, prompt: &str, response: &str) -> Value {
    return json!({
        "id": id,
        "prompt": prompt,
        "response": response,
        "settings": {
            "model": "llama-3.1-8b-instant",
            "provider": "groq"
        },
        "timestamp": 1700000000000_i64
    });
}

pub fn chat_data_fixture() -> Value {
    return json!({
        "messages": [
            message_fixture("m1", "What is a canvas?", "A surface you arrange components on."),
            message_fixture("m2", "And a project?", "A named list of components."),
        ]
    });
}

/// Remote record body shaped like the collection API returns it, holding a
/// single project with one chat component.
pub fn remote_record_fixture(
    remote_id: &str,
    local_id: &str,
    component_data: Value,
    last_modified: i64,
) -> Value {
    return json!({
        "id": remote_id,
        "localId": local_id,
        "data": {
            "type": "project",
            "id": local_id,
            "name": "Demo",
            "components": [
                {
                    "type": "Chat",
                    "data": component_data
                }
            ]
        },
        "lastModified": last_modified
    });
}
