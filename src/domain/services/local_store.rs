#[cfg(test)]
#[path = "local_store_test.rs"]
mod tests;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use super::Persistence;
use super::ProjectTree;
use crate::domain::models::ComponentConfig;
use crate::domain::models::ComponentRef;
use crate::domain::models::ComponentType;
use crate::domain::models::Folder;
use crate::domain::models::Node;
use crate::domain::models::Project;
use crate::domain::models::PushMarker;
use crate::domain::models::StoreSnapshot;

/// Single owner of the project tree and the UI lifecycle flags.
///
/// Handles are cheap to clone and all point at the same state. Every
/// mutation builds a new `StoreSnapshot` and publishes it in one step, so a
/// reader sees either the old snapshot or the new one, never a mix. Only the
/// node being changed is reallocated. All other nodes are shared with the
/// previous snapshot.
#[derive(Clone)]
pub struct LocalStore {
    tx: Arc<watch::Sender<Arc<StoreSnapshot>>>,
}

impl Default for LocalStore {
    fn default() -> LocalStore {
        return LocalStore::new(StoreSnapshot::default());
    }
}

impl LocalStore {
    pub fn new(initial: StoreSnapshot) -> LocalStore {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        return LocalStore { tx: Arc::new(tx) };
    }

    pub fn get_snapshot(&self) -> Arc<StoreSnapshot> {
        return self.tx.borrow().clone();
    }

    pub fn set_snapshot(&self, next: StoreSnapshot) {
        self.tx.send_replace(Arc::new(next));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        return self.tx.subscribe();
    }

    /// Read-modify-write under the channel lock so concurrent mutations
    /// can't drop each other's changes. `f` returns `None` to leave the store
    /// untouched, in which case subscribers aren't notified.
    pub(super) fn mutate<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&StoreSnapshot) -> Option<(StoreSnapshot, R)>,
    {
        let mut res: Option<R> = None;
        self.tx.send_if_modified(|current| {
            if let Some((next, out)) = f(current) {
                *current = Arc::new(next);
                res = Some(out);
                return true;
            }

            return false;
        });

        return res;
    }

    fn insert_node<F>(&self, parent_id: Option<&str>, build: F) -> Option<String>
    where
        F: FnOnce(&str) -> Node,
    {
        return self.mutate(|current| {
            let tree = ProjectTree::new(&current.items);
            if let Some(parent) = parent_id {
                if !tree.is_folder(parent) {
                    tracing::warn!(parent_id = parent, "Parent is not a folder, skipping insert");
                    return None;
                }
            }

            let id = tree.unused_id();
            let mut next = current.clone();
            next.items.insert(id.to_string(), Arc::new(build(&id)));

            return Some((next, id));
        });
    }

    /// Creates an empty project at the root and returns its id.
    pub fn add_project(&self, name: &str) -> String {
        return self
            .insert_node(None, |id| return Node::Project(Project::new(id, name, None)))
            .unwrap_or_default();
    }

    pub fn add_project_in(&self, name: &str, parent_id: Option<&str>) -> Option<String> {
        return self.insert_node(parent_id, |id| {
            return Node::Project(Project::new(id, name, parent_id));
        });
    }

    pub fn add_folder(&self, name: &str, parent_id: Option<&str>) -> Option<String> {
        return self.insert_node(parent_id, |id| {
            return Node::Folder(Folder::new(id, name, parent_id));
        });
    }

    /// The id isn't checked against the tree; see `StoreSnapshot::selected_project`.
    pub fn select_project(&self, id: Option<&str>) {
        let selected_id = id.map(|e| return e.to_string());
        self.mutate(|current| {
            let mut next = current.clone();
            next.selected_id = selected_id;
            return Some((next, ()));
        });
    }

    /// Appends a component with the kind's default payload and returns its
    /// index. Does nothing when `project_id` isn't a project.
    pub fn assign_component_to_project(
        &self,
        project_id: &str,
        kind: ComponentType,
    ) -> Option<usize> {
        let res = self.mutate(|current| {
            let mut project = current.project(project_id)?.clone();
            project.components.push(ComponentConfig::new(kind));
            let index = project.components.len() - 1;

            let mut next = current.clone();
            next.items
                .insert(project_id.to_string(), Arc::new(Node::Project(project)));

            return Some((next, index));
        });

        if res.is_none() {
            tracing::warn!(project_id, kind = %kind, "Project not found or invalid type");
        }

        return res;
    }

    /// Swaps one component's payload. The touched project becomes a new
    /// allocation and every other node stays shared with the previous
    /// snapshot. Returns false when the project or index doesn't resolve.
    pub fn update_component_data(&self, project_id: &str, index: usize, data: Value) -> bool {
        let res = self.mutate(|current| {
            let project = current.project(project_id)?.with_component_data(index, data)?;

            let mut next = current.clone();
            next.items
                .insert(project_id.to_string(), Arc::new(Node::Project(project)));

            return Some((next, ()));
        });

        if res.is_none() {
            tracing::warn!(project_id, index, "Component not found, skipping update");
            return false;
        }

        return true;
    }

    /// Looks a captured handle up again. Gives `None` when the slot is gone
    /// or now holds a different kind of component.
    pub fn resolve_component(&self, component: &ComponentRef) -> Option<ComponentConfig> {
        let snapshot = self.get_snapshot();
        let config = snapshot
            .project(&component.project_id)?
            .component(component.index)?;

        if config.kind != component.kind {
            return None;
        }

        return Some(config.clone());
    }

    pub fn component_refs(&self, project_id: &str) -> Vec<ComponentRef> {
        let snapshot = self.get_snapshot();
        if let Some(project) = snapshot.project(project_id) {
            return project
                .components
                .iter()
                .enumerate()
                .map(|(idx, config)| return ComponentRef::new(project_id, idx, config.kind))
                .collect::<Vec<ComponentRef>>();
        }

        return vec![];
    }

    pub fn push_marker(&self, project_id: &str) -> Option<PushMarker> {
        return self.get_snapshot().push_marker(project_id);
    }

    /// Records the last push for a project. Ignored for ids that aren't
    /// projects, and subscribers aren't notified when nothing changed.
    pub fn set_push_marker(&self, project_id: &str, marker: PushMarker) {
        self.mutate(|current| {
            current.project(project_id)?;
            if current.push_marker(project_id) == Some(marker) {
                return None;
            }

            let mut next = current.clone();
            next.push_markers.insert(project_id.to_string(), marker);
            return Some((next, ()));
        });
    }

    fn set_flags<F>(&self, f: F)
    where
        F: FnOnce(&mut StoreSnapshot),
    {
        self.mutate(|current| {
            let mut next = current.clone();
            f(&mut next);
            return Some((next, ()));
        });
    }

    /// Loads the persisted tree. A load or validation failure is kept in
    /// the snapshot's `error` field, which is the only error the store
    /// surfaces to users.
    pub async fn init(&self, persistence: &Persistence) {
        self.set_flags(|next| {
            next.loading = true;
            next.error = None;
        });

        let res = persistence.load().await.and_then(|stored| {
            if let Some(stored) = &stored {
                ProjectTree::new(&stored.items).validate()?;
            }
            return Ok(stored);
        });

        match res {
            Ok(stored) => {
                self.set_flags(|next| {
                    if let Some(stored) = stored {
                        next.items = stored.items;
                        next.selected_id = stored.selected_id;
                        next.push_markers = stored.push_markers;
                    }
                    next.loading = false;
                    next.initialized = true;
                });
                persistence.mark_synced(&self.get_snapshot()).await;
            }
            Err(err) => {
                tracing::error!(error = ?err, path = ?persistence.path(), "Failed to load projects");
                self.set_flags(|next| {
                    next.loading = false;
                    next.initialized = true;
                    next.error = Some(err.to_string());
                });
            }
        }
    }
}
