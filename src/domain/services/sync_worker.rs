#[cfg(test)]
#[path = "sync_worker_test.rs"]
mod tests;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time;

use super::LocalStore;
use super::Persistence;
use super::RemoteBridge;
use crate::domain::models::Action;
use crate::domain::models::AuthSession;
use crate::domain::models::ComponentRef;
use crate::domain::models::Event;
use crate::domain::models::SyncOutcome;

/// Owns one bridge per component slot and runs every sync request through a
/// single loop, so a slot never has a push and a pull in flight at once.
pub struct SyncWorker {
    store: LocalStore,
    session: AuthSession,
    bridges: HashMap<(String, usize), RemoteBridge>,
    persistence: Option<Persistence>,
}

impl SyncWorker {
    pub fn new(store: LocalStore, session: AuthSession) -> SyncWorker {
        return SyncWorker {
            store,
            session,
            bridges: HashMap::new(),
            persistence: None,
        };
    }

    /// Refreshes the store from disk before every tick, so projects other
    /// canvas commands saved in the meantime are reconciled too.
    pub fn with_persistence(mut self, persistence: Persistence) -> SyncWorker {
        self.persistence = Some(persistence);
        return self;
    }

    pub fn session(&self) -> &AuthSession {
        return &self.session;
    }

    fn bridge(&mut self, component: &ComponentRef) -> &mut RemoteBridge {
        let key = component.key();
        let replaced = self
            .bridges
            .get(&key)
            .map(|bridge| return bridge.component().kind != component.kind)
            .unwrap_or(false);

        if replaced {
            if let Some(old) = self.bridges.remove(&key) {
                tracing::debug!(
                    project_id = %component.project_id,
                    index = component.index,
                    "Component type changed, replacing bridge"
                );
                old.detach_handle().detach();
            }
        }

        let store = self.store.clone();
        let session = self.session.clone();
        return self.bridges.entry(key).or_insert_with(|| {
            return RemoteBridge::new(store, session, component.clone());
        });
    }

    fn detach(&mut self, component: &ComponentRef) {
        if let Some(bridge) = self.bridges.remove(&component.key()) {
            bridge.detach_handle().detach();
        }
    }

    async fn reconcile_refs(&mut self, refs: Vec<ComponentRef>) -> Vec<(ComponentRef, SyncOutcome)> {
        let mut res: Vec<(ComponentRef, SyncOutcome)> = vec![];
        for component in refs {
            let outcome = self.bridge(&component).reconcile().await;
            res.push((component, outcome));
        }

        return res;
    }

    /// Every component of every project, in a stable order.
    async fn reconcile_all(&mut self) -> Vec<(ComponentRef, SyncOutcome)> {
        let snapshot = self.store.get_snapshot();
        let mut project_ids = snapshot
            .items
            .values()
            .filter_map(|node| return node.as_project().map(|p| return p.id.to_string()))
            .collect::<Vec<String>>();
        project_ids.sort();

        let refs = project_ids
            .iter()
            .flat_map(|id| return self.store.component_refs(id))
            .collect::<Vec<ComponentRef>>();

        return self.reconcile_refs(refs).await;
    }

    async fn reconcile_selected(&mut self) -> Vec<(ComponentRef, SyncOutcome)> {
        if let Some(persistence) = &self.persistence {
            if let Err(err) = persistence.refresh(&self.store).await {
                tracing::error!(error = ?err, "Failed to refresh projects from disk");
            }
        }

        let selected_id = self.store.get_snapshot().selected_id.clone();
        if let Some(project_id) = selected_id {
            let refs = self.store.component_refs(&project_id);
            return self.reconcile_refs(refs).await;
        }

        return vec![];
    }

    pub async fn handle(&mut self, action: Action) -> Vec<(ComponentRef, SyncOutcome)> {
        match action {
            Action::Reconcile(component) => {
                return self.reconcile_refs(vec![component]).await;
            }
            Action::ReconcileProject(project_id) => {
                let refs = self.store.component_refs(&project_id);
                return self.reconcile_refs(refs).await;
            }
            Action::Push(component, data) => {
                let outcome = self.bridge(&component).update_data(data).await;
                return vec![(component, outcome)];
            }
            Action::SignIn(session) => {
                self.session = session;
                for bridge in self.bridges.values_mut() {
                    bridge.set_session(self.session.clone());
                }
                return self.reconcile_all().await;
            }
            Action::SignOut() => {
                self.session = AuthSession::signed_out();
                for bridge in self.bridges.values_mut() {
                    bridge.set_session(AuthSession::signed_out());
                }
                return vec![];
            }
            Action::Detach(component) => {
                self.detach(&component);
                return vec![];
            }
        }
    }

    /// Runs until every action sender is dropped. With an interval, the
    /// selected project is also reconciled on each tick, starting right away.
    pub async fn start(
        mut self,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
        interval: Option<Duration>,
    ) -> Result<()> {
        let mut ticker = interval.map(time::interval);

        loop {
            let tick = async {
                match ticker.as_mut() {
                    Some(ticker) => {
                        ticker.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            let outcomes = tokio::select! {
                action = rx.recv() => {
                    match action {
                        Some(action) => self.handle(action).await,
                        None => return Ok(()),
                    }
                }
                _ = tick => self.reconcile_selected().await,
            };

            for (component, outcome) in outcomes {
                match &outcome {
                    SyncOutcome::Failed(_) => {
                        tracing::warn!(
                            project_id = %component.project_id,
                            index = component.index,
                            outcome = %outcome,
                            "Sync failed, will retry on next trigger"
                        );
                    }
                    _ => {
                        tracing::debug!(
                            project_id = %component.project_id,
                            index = component.index,
                            outcome = %outcome,
                            "Sync completed"
                        );
                    }
                }

                tx.send(Event::SyncCompleted(component, outcome))?;
            }
        }
    }
}
