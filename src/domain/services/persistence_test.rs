use std::time::Duration;

use anyhow::Result;
use test_utils::chat_data_fixture;

use super::Persistence;
use crate::domain::models::ComponentType;
use crate::domain::models::PushMarker;
use crate::domain::services::LocalStore;

mod save {
    use super::*;

    #[tokio::test]
    async fn it_writes_items_and_selection() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().join("nested"));

        let store = LocalStore::default();
        let folder = store.add_folder("Work", None).unwrap();
        let id = store.add_project_in("Demo", Some(&folder)).unwrap();
        store.assign_component_to_project(&id, ComponentType::Chat);
        store.update_component_data(&id, 0, chat_data_fixture());
        store.select_project(Some(&id));

        persistence.save(&store.get_snapshot()).await?;

        let stored = persistence.load().await?.unwrap();
        assert_eq!(stored.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(stored.selected_id, Some(id.to_string()));
        assert_eq!(stored.items, store.get_snapshot().items);

        return Ok(());
    }

    #[tokio::test]
    async fn it_skips_lifecycle_flags() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        let store = LocalStore::default();
        store.add_project("Demo");

        persistence.save(&store.get_snapshot()).await?;

        let payload = std::fs::read_to_string(persistence.path())?;
        assert!(payload.contains("selectedId"));
        assert!(!payload.contains("loading"));
        assert!(!payload.contains("initialized"));

        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_push_markers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        let store = LocalStore::default();
        let id = store.add_project("Demo");
        store.set_push_marker(&id, PushMarker::pending(42));

        persistence.save(&store.get_snapshot()).await?;

        let stored = persistence.load().await?.unwrap();
        assert_eq!(stored.push_markers.get(&id), Some(&PushMarker::pending(42)));
        let payload = std::fs::read_to_string(persistence.path())?;
        assert!(payload.contains("pushPending: true"));

        return Ok(());
    }

    #[tokio::test]
    async fn it_replaces_the_file_without_leaving_temp_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        let store = LocalStore::default();
        store.add_project("Demo");
        persistence.save(&store.get_snapshot()).await?;
        store.add_project("Other");
        persistence.save(&store.get_snapshot()).await?;

        let names = std::fs::read_dir(dir.path())?
            .filter_map(|entry| return entry.ok())
            .map(|entry| return entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<String>>();
        assert_eq!(names, vec!["projects.yaml".to_string()]);
        assert_eq!(persistence.load().await?.unwrap().items.len(), 2);

        return Ok(());
    }
}

mod save_merging {
    use super::*;

    /// A project with one chat saved to `dir`, as any earlier run would
    /// leave it.
    async fn seed(dir: &std::path::Path) -> Result<String> {
        let store = LocalStore::default();
        let id = store.add_project("Shared");
        store.assign_component_to_project(&id, ComponentType::Chat);
        Persistence::new(dir.to_path_buf())
            .save(&store.get_snapshot())
            .await?;

        return Ok(id);
    }

    async fn open(dir: &std::path::Path) -> (LocalStore, Persistence) {
        let persistence = Persistence::new(dir.to_path_buf());
        let store = LocalStore::default();
        store.init(&persistence).await;

        return (store, persistence);
    }

    #[tokio::test]
    async fn it_keeps_changes_saved_by_other_processes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shared = seed(dir.path()).await?;
        let (watcher, watcher_persistence) = open(dir.path()).await;

        let (other, other_persistence) = open(dir.path()).await;
        let added = other.add_project("Added");
        other.select_project(Some(&added));
        other_persistence.save(&other.get_snapshot()).await?;

        watcher.update_component_data(&shared, 0, chat_data_fixture());
        watcher_persistence.save(&watcher.get_snapshot()).await?;

        let stored = Persistence::new(dir.path().to_path_buf())
            .load()
            .await?
            .unwrap();
        assert!(stored.items.contains_key(&added));
        assert_eq!(stored.selected_id, Some(added));
        assert_eq!(
            stored.items[&shared].as_project().unwrap().components[0].data,
            chat_data_fixture()
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_refreshes_without_losing_unsaved_changes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shared = seed(dir.path()).await?;
        let (watcher, watcher_persistence) = open(dir.path()).await;

        let (other, other_persistence) = open(dir.path()).await;
        let added = other.add_project("Added");
        other.select_project(Some(&added));
        other_persistence.save(&other.get_snapshot()).await?;

        watcher.update_component_data(&shared, 0, chat_data_fixture());
        watcher_persistence.refresh(&watcher).await?;

        let snapshot = watcher.get_snapshot();
        assert!(snapshot.project(&added).is_some());
        assert_eq!(snapshot.selected_id, Some(added.to_string()));
        assert_eq!(
            snapshot.project(&shared).unwrap().components[0].data,
            chat_data_fixture()
        );

        watcher_persistence.save(&snapshot).await?;
        let stored = Persistence::new(dir.path().to_path_buf())
            .load()
            .await?
            .unwrap();
        assert!(stored.items.contains_key(&added));
        assert_eq!(
            stored.items[&shared].as_project().unwrap().components[0].data,
            chat_data_fixture()
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_refreshes_nothing_when_the_file_is_unchanged() -> Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path()).await?;
        let (store, persistence) = open(dir.path()).await;
        let before = store.get_snapshot();

        persistence.refresh(&store).await?;

        assert!(std::sync::Arc::ptr_eq(&before, &store.get_snapshot()));

        return Ok(());
    }
}

mod load {
    use super::*;

    #[tokio::test]
    async fn it_returns_none_without_a_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());

        assert!(persistence.load().await?.is_none());

        return Ok(());
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn it_removes_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        persistence.save(&LocalStore::default().get_snapshot()).await?;
        assert!(persistence.path().exists());

        persistence.delete().await?;
        assert!(!persistence.path().exists());
        persistence.delete().await?;

        return Ok(());
    }
}

mod start {
    use super::*;

    #[tokio::test]
    async fn it_saves_published_snapshots() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        let store = LocalStore::default();
        store.init(&persistence).await;

        let rx = store.subscribe();
        let worker = tokio::spawn(async move {
            return persistence.start(rx).await;
        });

        let id = store.add_project("Demo");
        let reader = Persistence::new(dir.path().to_path_buf());
        let mut saved = false;
        for _ in 0..50 {
            if let Ok(Some(stored)) = reader.load().await {
                if stored.items.contains_key(&id) {
                    saved = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(saved);

        drop(store);
        worker.await??;

        return Ok(());
    }

    #[tokio::test]
    async fn it_leaves_the_file_alone_after_a_failed_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persistence = Persistence::new(dir.path().to_path_buf());
        std::fs::write(persistence.path(), "items: [not, a, map")?;

        let store = LocalStore::default();
        store.init(&persistence).await;
        let rx = store.subscribe();
        let worker = tokio::spawn(async move {
            return persistence.start(rx).await;
        });

        store.add_project("Demo");
        drop(store);
        worker.await??;

        let payload = std::fs::read_to_string(dir.path().join("projects.yaml"))?;
        assert_eq!(payload, "items: [not, a, map");

        return Ok(());
    }
}
