#[cfg(test)]
#[path = "remote_bridge_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;

use super::LocalStore;
use crate::domain::models::AuthSession;
use crate::domain::models::CollectionBox;
use crate::domain::models::ComponentRef;
use crate::domain::models::LinkState;
use crate::domain::models::Project;
use crate::domain::models::PushMarker;
use crate::domain::models::RecordPayload;
use crate::domain::models::RemoteRecord;
use crate::domain::models::SyncOutcome;

/// Set once the owning component is gone. Work that resolves afterwards is
/// dropped instead of being applied.
#[derive(Clone, Default)]
pub struct DetachHandle {
    detached: Arc<AtomicBool>,
}

impl DetachHandle {
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    pub fn is_detached(&self) -> bool {
        return self.detached.load(Ordering::SeqCst);
    }
}

fn now_millis() -> i64 {
    return Utc::now().timestamp_millis();
}

/// Keeps one component's payload in step with the remote record of its
/// project.
///
/// The first upload takes the local payload as is. After that the remote
/// record wins any disagreement, unless the record is older than the last
/// push made for the project. That push is tracked as a `PushMarker` in the
/// store, so a bridge built later, or by another run, still honours it.
/// Pushes always send the whole project.
pub struct RemoteBridge {
    store: LocalStore,
    session: AuthSession,
    component: ComponentRef,
    state: LinkState,
    detach: DetachHandle,
}

impl RemoteBridge {
    pub fn new(store: LocalStore, session: AuthSession, component: ComponentRef) -> RemoteBridge {
        return RemoteBridge {
            store,
            session,
            component,
            state: LinkState::Unlinked,
            detach: DetachHandle::default(),
        };
    }

    pub fn component(&self) -> &ComponentRef {
        return &self.component;
    }

    pub fn state(&self) -> &LinkState {
        return &self.state;
    }

    pub fn detach_handle(&self) -> DetachHandle {
        return self.detach.clone();
    }

    pub fn set_session(&mut self, session: AuthSession) {
        if !session.is_active() {
            self.state = LinkState::Unlinked;
        }
        self.session = session;
    }

    fn mark_push(&self, marker: PushMarker) {
        self.store.set_push_marker(&self.component.project_id, marker);
    }

    fn active_collection(&self) -> Option<CollectionBox> {
        return self.session.collection().cloned();
    }

    fn local_project(&self) -> Option<Project> {
        if self.store.resolve_component(&self.component).is_none() {
            tracing::warn!(
                project_id = %self.component.project_id,
                index = self.component.index,
                "Component no longer resolves locally"
            );
            return None;
        }

        return self
            .store
            .get_snapshot()
            .project(&self.component.project_id)
            .cloned();
    }

    async fn fetch(&self, collection: &CollectionBox) -> Result<Option<RemoteRecord>> {
        let records = collection.get_all().await?;
        return Ok(records
            .into_iter()
            .find(|record| return record.local_id == self.component.project_id));
    }

    /// Fetches the remote record and brings both sides together: uploads
    /// when the record doesn't exist yet, otherwise lets a differing remote
    /// payload replace the local one. Running it again with nothing changed
    /// makes no writes.
    pub async fn reconcile(&mut self) -> SyncOutcome {
        let collection = match self.active_collection() {
            Some(collection) => collection,
            None => {
                self.state = LinkState::Unlinked;
                return SyncOutcome::Inert;
            }
        };

        if self.detach.is_detached() {
            return SyncOutcome::Discarded;
        }

        let previous = std::mem::replace(&mut self.state, LinkState::Linking);
        let res = self.fetch(&collection).await;
        if self.detach.is_detached() {
            self.state = previous;
            return SyncOutcome::Discarded;
        }

        match res {
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    project_id = %self.component.project_id,
                    "Failed to fetch remote project"
                );
                self.state = previous;
                return SyncOutcome::Failed(err.to_string());
            }
            Ok(None) => {
                self.state = LinkState::Uploading;
                return self.upload(&collection).await;
            }
            Ok(Some(record)) => {
                self.state = LinkState::Linked(record.id.to_string());
                return self.pull(&collection, &record).await;
            }
        }
    }

    async fn upload(&mut self, collection: &CollectionBox) -> SyncOutcome {
        let project = match self.local_project() {
            Some(project) => project,
            None => return SyncOutcome::NotFound,
        };

        let last_modified = now_millis();
        let payload = match RecordPayload::from_project(&project, last_modified) {
            Ok(payload) => payload,
            Err(err) => return SyncOutcome::Failed(err.to_string()),
        };

        match collection.add(payload).await {
            Ok(remote_id) => {
                tracing::info!(
                    project_id = %self.component.project_id,
                    remote_id = %remote_id,
                    "Uploaded project to remote"
                );
                self.state = LinkState::Linked(remote_id);
                self.mark_push(PushMarker::acknowledged(last_modified));
                if self.detach.is_detached() {
                    return SyncOutcome::Discarded;
                }
                return SyncOutcome::Uploaded;
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    project_id = %self.component.project_id,
                    "Failed to upload project to remote"
                );
                return SyncOutcome::Failed(err.to_string());
            }
        }
    }

    async fn pull(&mut self, collection: &CollectionBox, record: &RemoteRecord) -> SyncOutcome {
        let marker = self.store.push_marker(&self.component.project_id);
        if let Some(marker) = marker {
            if record.last_modified < marker.last_push {
                if marker.pending {
                    return self.write(collection, &record.id).await;
                }

                tracing::debug!(
                    project_id = %self.component.project_id,
                    remote_modified = record.last_modified,
                    last_push = marker.last_push,
                    "Ignoring remote record older than the last push"
                );
                return SyncOutcome::Stale;
            }

            // Remote moved on after our last push, so it wins even if that
            // push never landed.
            if marker.pending {
                self.mark_push(PushMarker::acknowledged(marker.last_push));
            }
        }

        let local = match self.store.resolve_component(&self.component) {
            Some(local) => local,
            None => {
                tracing::warn!(
                    project_id = %self.component.project_id,
                    index = self.component.index,
                    "Component no longer resolves locally"
                );
                return SyncOutcome::NotFound;
            }
        };

        let remote_data = match record.component_data(self.component.index) {
            Some(data) => data,
            // Added locally since the last push, so there's nothing remote to
            // win with yet.
            None => return self.write(collection, &record.id).await,
        };

        if record.component_kind(self.component.index) != Some(self.component.kind) {
            tracing::warn!(
                project_id = %self.component.project_id,
                index = self.component.index,
                kind = %self.component.kind,
                "Remote component at this index is a different kind, skipping pull"
            );
            return SyncOutcome::NotFound;
        }

        if local.data == *remote_data {
            return SyncOutcome::InSync;
        }

        tracing::info!(
            project_id = %self.component.project_id,
            index = self.component.index,
            "Syncing local component to match remote"
        );
        if !self.store.update_component_data(
            &self.component.project_id,
            self.component.index,
            remote_data.clone(),
        ) {
            return SyncOutcome::NotFound;
        }

        return SyncOutcome::Pulled;
    }

    async fn write(&mut self, collection: &CollectionBox, remote_id: &str) -> SyncOutcome {
        let project = match self.local_project() {
            Some(project) => project,
            None => return SyncOutcome::NotFound,
        };

        let last_modified = now_millis();
        let payload = match RecordPayload::from_project(&project, last_modified) {
            Ok(payload) => payload,
            Err(err) => return SyncOutcome::Failed(err.to_string()),
        };

        // Recorded before the write so a pull racing it is already guarded.
        self.mark_push(PushMarker::pending(last_modified));

        match collection.update(remote_id, payload).await {
            Ok(()) => {
                self.mark_push(PushMarker::acknowledged(last_modified));
                if self.detach.is_detached() {
                    return SyncOutcome::Discarded;
                }
                return SyncOutcome::Pushed;
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    project_id = %self.component.project_id,
                    remote_id = %remote_id,
                    "Failed to push project to remote"
                );
                return SyncOutcome::Failed(err.to_string());
            }
        }
    }

    /// Sends the current local project to the remote record. A bridge that
    /// hasn't linked yet looks the record up first, so a second record is
    /// never created.
    pub async fn push(&mut self) -> SyncOutcome {
        let collection = match self.active_collection() {
            Some(collection) => collection,
            None => return SyncOutcome::Inert,
        };

        if self.detach.is_detached() {
            return SyncOutcome::Discarded;
        }

        let remote_id = match &self.state {
            LinkState::Linked(remote_id) => remote_id.to_string(),
            _ => match self.fetch(&collection).await {
                Ok(Some(record)) => {
                    self.state = LinkState::Linked(record.id.to_string());
                    record.id
                }
                Ok(None) => {
                    self.state = LinkState::Uploading;
                    return self.upload(&collection).await;
                }
                Err(err) => {
                    tracing::error!(
                        error = ?err,
                        project_id = %self.component.project_id,
                        "Failed to fetch remote project"
                    );
                    return SyncOutcome::Failed(err.to_string());
                }
            },
        };

        return self.write(&collection, &remote_id).await;
    }

    /// Writes locally first, then pushes. The local write stands even when
    /// the push fails or syncing is off, and stays marked as pending until a
    /// push lands, so whichever reconcile comes next retries it instead of
    /// pulling the older remote payload over it.
    pub async fn update_data(&mut self, data: Value) -> SyncOutcome {
        if self.store.resolve_component(&self.component).is_none()
            || !self.store.update_component_data(
                &self.component.project_id,
                self.component.index,
                data,
            )
        {
            return SyncOutcome::NotFound;
        }
        self.mark_push(PushMarker::pending(now_millis()));

        return self.push().await;
    }
}
