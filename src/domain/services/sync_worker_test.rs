use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use test_utils::chat_data_fixture;
use tokio::sync::mpsc;

use super::SyncWorker;
use crate::domain::models::Action;
use crate::domain::models::AuthSession;
use crate::domain::models::CollectionBox;
use crate::domain::models::ComponentRef;
use crate::domain::models::ComponentType;
use crate::domain::models::Event;
use crate::domain::models::SyncOutcome;
use crate::domain::services::LocalStore;
use crate::domain::services::Persistence;
use crate::infrastructure::collections::memory::MemoryCollection;

fn session() -> (Arc<MemoryCollection>, AuthSession) {
    let memory = Arc::new(MemoryCollection::default());
    let collection: CollectionBox = memory.clone();

    return (memory, AuthSession::signed_in(collection));
}

fn store_with_project(components: Vec<ComponentType>) -> (LocalStore, String) {
    let store = LocalStore::default();
    let id = store.add_project("Demo");
    for kind in components {
        store.assign_component_to_project(&id, kind);
    }

    return (store, id);
}

mod handle {
    use super::*;

    #[tokio::test]
    async fn it_stays_local_until_signed_in() -> Result<()> {
        let (memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let mut worker = SyncWorker::new(store, AuthSession::signed_out());
        let component = ComponentRef::new(&id, 0, ComponentType::Chat);

        let outcomes = worker.handle(Action::Reconcile(component.clone())).await;
        assert_eq!(outcomes, vec![(component.clone(), SyncOutcome::Inert)]);
        assert_eq!(memory.get_all_count(), 0);

        let outcomes = worker.handle(Action::SignIn(session)).await;
        assert_eq!(outcomes, vec![(component, SyncOutcome::Uploaded)]);
        assert!(worker.session().is_active());
        assert_eq!(memory.add_count(), 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_creates_one_record_per_project() -> Result<()> {
        let (memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat, ComponentType::CodeGen]);
        let mut worker = SyncWorker::new(store, session);

        let outcomes = worker.handle(Action::ReconcileProject(id.to_string())).await;

        assert_eq!(
            outcomes,
            vec![
                (
                    ComponentRef::new(&id, 0, ComponentType::Chat),
                    SyncOutcome::Uploaded
                ),
                (
                    ComponentRef::new(&id, 1, ComponentType::CodeGen),
                    SyncOutcome::InSync
                ),
            ]
        );
        assert_eq!(memory.len(), 1);
        assert_eq!(worker.bridges.len(), 2);

        return Ok(());
    }

    #[tokio::test]
    async fn it_pushes_through_the_bridge() -> Result<()> {
        let (memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let mut worker = SyncWorker::new(store.clone(), session);
        let component = ComponentRef::new(&id, 0, ComponentType::Chat);

        worker.handle(Action::Reconcile(component.clone())).await;
        let outcomes = worker
            .handle(Action::Push(component.clone(), chat_data_fixture()))
            .await;

        assert_eq!(outcomes, vec![(component.clone(), SyncOutcome::Pushed)]);
        assert_eq!(
            store.resolve_component(&component).unwrap().data,
            chat_data_fixture()
        );
        assert_eq!(
            memory.record_for(&id).unwrap().component_data(0),
            Some(&chat_data_fixture())
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_replaces_bridges_when_the_type_changes() -> Result<()> {
        let (_memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let mut worker = SyncWorker::new(store, session);
        let chat = ComponentRef::new(&id, 0, ComponentType::Chat);
        let emojis = ComponentRef::new(&id, 0, ComponentType::Emojis);

        worker.handle(Action::Reconcile(chat.clone())).await;
        let old_handle = worker.bridges[&chat.key()].detach_handle();

        let outcomes = worker.handle(Action::Reconcile(emojis.clone())).await;

        assert_eq!(outcomes, vec![(emojis.clone(), SyncOutcome::NotFound)]);
        assert!(old_handle.is_detached());
        assert_eq!(worker.bridges.len(), 1);
        assert_eq!(worker.bridges[&emojis.key()].component(), &emojis);

        return Ok(());
    }

    #[tokio::test]
    async fn it_detaches_and_signs_out() -> Result<()> {
        let (memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let mut worker = SyncWorker::new(store, session);
        let component = ComponentRef::new(&id, 0, ComponentType::Chat);

        worker.handle(Action::Reconcile(component.clone())).await;
        let handle = worker.bridges[&component.key()].detach_handle();

        assert!(worker.handle(Action::Detach(component.clone())).await.is_empty());
        assert!(handle.is_detached());
        assert!(worker.bridges.is_empty());

        assert!(worker.handle(Action::SignOut()).await.is_empty());
        let outcomes = worker
            .handle(Action::Push(component.clone(), json!({ "messages": [] })))
            .await;
        assert_eq!(outcomes, vec![(component, SyncOutcome::Inert)]);
        assert_eq!(memory.write_count(), 1);

        return Ok(());
    }
}

mod start {
    use super::*;

    #[tokio::test]
    async fn it_emits_outcomes_until_the_channel_closes() -> Result<()> {
        let (_memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let component = ComponentRef::new(&id, 0, ComponentType::Chat);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
        action_tx.send(Action::Reconcile(component.clone()))?;
        action_tx.send(Action::Reconcile(component.clone()))?;
        drop(action_tx);

        SyncWorker::new(store, session)
            .start(event_tx, &mut action_rx, None)
            .await?;

        let mut outcomes: Vec<SyncOutcome> = vec![];
        while let Some(Event::SyncCompleted(completed, outcome)) = event_rx.recv().await {
            assert_eq!(completed, component);
            outcomes.push(outcome);
        }
        assert_eq!(outcomes, vec![SyncOutcome::Uploaded, SyncOutcome::InSync]);

        return Ok(());
    }

    #[tokio::test]
    async fn it_reconciles_the_selected_project_on_each_tick() -> Result<()> {
        let (memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        store.add_project("Unselected");
        store.select_project(Some(&id));

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
        let worker = tokio::spawn(async move {
            return SyncWorker::new(store, session)
                .start(event_tx, &mut action_rx, Some(Duration::from_millis(10)))
                .await;
        });

        let first = event_rx.recv().await;
        assert!(matches!(
            first,
            Some(Event::SyncCompleted(_, SyncOutcome::Uploaded))
        ));
        let second = event_rx.recv().await;
        assert!(matches!(
            second,
            Some(Event::SyncCompleted(_, SyncOutcome::InSync))
        ));
        assert_eq!(memory.len(), 1);

        drop(action_tx);
        worker.await??;

        return Ok(());
    }

    #[tokio::test]
    async fn it_refreshes_from_disk_before_each_tick() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (_memory, session) = session();
        let (store, id) = store_with_project(vec![ComponentType::Chat]);
        let persistence = Persistence::new(dir.path().to_path_buf());
        persistence.save(&store.get_snapshot()).await?;

        let other_persistence = Persistence::new(dir.path().to_path_buf());
        let other = LocalStore::default();
        other.init(&other_persistence).await;
        other.select_project(Some(&id));
        other_persistence.save(&other.get_snapshot()).await?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
        let worker_store = store.clone();
        let worker = tokio::spawn(async move {
            return SyncWorker::new(worker_store, session)
                .with_persistence(persistence)
                .start(event_tx, &mut action_rx, Some(Duration::from_millis(10)))
                .await;
        });

        let first = event_rx.recv().await;
        assert!(matches!(
            first,
            Some(Event::SyncCompleted(_, SyncOutcome::Uploaded))
        ));
        assert_eq!(store.get_snapshot().selected_id, Some(id));

        drop(action_tx);
        worker.await??;

        return Ok(());
    }
}
