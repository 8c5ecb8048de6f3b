use std::collections::HashMap;
use std::sync::Arc;

use super::Node;
use super::Project;
use super::PushMarker;

/// Everything the local store holds at one point in time.
///
/// Nodes sit behind `Arc` so that a mutation only allocates the node it
/// touches. Every other entry in the next snapshot points at the same
/// allocation as before.
#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
    pub items: HashMap<String, Arc<Node>>,
    pub selected_id: Option<String>,
    /// Keyed by project id.
    pub push_markers: HashMap<String, PushMarker>,
    pub loading: bool,
    pub error: Option<String>,
    pub initialized: bool,
}

impl StoreSnapshot {
    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        return self.items.get(id);
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        return self.items.get(id).and_then(|node| return node.as_project());
    }

    pub fn push_marker(&self, project_id: &str) -> Option<PushMarker> {
        return self.push_markers.get(project_id).copied();
    }

    /// Selection is never validated, so a dangling id resolves to `None`.
    pub fn selected_project(&self) -> Option<&Project> {
        return self
            .selected_id
            .as_deref()
            .and_then(|id| return self.project(id));
    }
}
