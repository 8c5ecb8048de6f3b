#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;

use std::collections::HashMap;
use std::collections::HashSet;
use std::path;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::sync::Mutex;

use super::LocalStore;
use super::ProjectTree;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Node;
use crate::domain::models::PushMarker;
use crate::domain::models::StoreSnapshot;

/// On-disk shape of the store. Lifecycle flags are runtime only and never
/// written.
#[derive(Serialize, Deserialize)]
pub struct StoredProjects {
    pub version: String,
    pub timestamp: String,
    #[serde(rename = "selectedId", default)]
    pub selected_id: Option<String>,
    #[serde(default)]
    pub items: HashMap<String, Arc<Node>>,
    #[serde(rename = "pushMarkers", default, skip_serializing_if = "HashMap::is_empty")]
    pub push_markers: HashMap<String, PushMarker>,
}

impl StoredProjects {
    fn from_snapshot(snapshot: &StoreSnapshot) -> StoredProjects {
        return StoredProjects {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            selected_id: snapshot.selected_id.clone(),
            items: snapshot.items.clone(),
            push_markers: snapshot.push_markers.clone(),
        };
    }
}

fn same_node(a: Option<&Arc<Node>>, b: Option<&Arc<Node>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => return Arc::ptr_eq(a, b),
        (None, None) => return true,
        _ => return false,
    }
}

fn marker_ids<'a>(snapshots: &[&'a HashMap<String, PushMarker>]) -> HashSet<&'a String> {
    return snapshots
        .iter()
        .copied()
        .flat_map(|markers| return markers.keys())
        .collect::<HashSet<&String>>();
}

/// Applies what changed between `base` and `local` on top of what's on disk.
/// Entries this process never touched keep whatever the file holds.
fn merge_changes(base: &StoreSnapshot, local: &StoreSnapshot, disk: StoredProjects) -> StoredProjects {
    let mut merged = StoredProjects::from_snapshot(local);
    merged.items = disk.items;
    merged.selected_id = disk.selected_id;
    merged.push_markers = disk.push_markers;

    let ids = base
        .items
        .keys()
        .chain(local.items.keys())
        .collect::<HashSet<&String>>();
    for id in ids {
        if same_node(base.items.get(id), local.items.get(id)) {
            continue;
        }

        match local.items.get(id) {
            Some(node) => {
                merged.items.insert(id.to_string(), node.clone());
            }
            None => {
                merged.items.remove(id);
            }
        }
    }

    if base.selected_id != local.selected_id {
        merged.selected_id = local.selected_id.clone();
    }

    for id in marker_ids(&[&base.push_markers, &local.push_markers]) {
        if base.push_markers.get(id) == local.push_markers.get(id) {
            continue;
        }

        match local.push_markers.get(id) {
            Some(marker) => {
                merged.push_markers.insert(id.to_string(), *marker);
            }
            None => {
                merged.push_markers.remove(id);
            }
        }
    }

    return merged;
}

/// Takes every entry the file changed that `local` hasn't changed since
/// `base`. Returns the next local snapshot and the next base, or `None`
/// when the file holds nothing new.
fn adopt_changes(
    base: &StoreSnapshot,
    local: &StoreSnapshot,
    disk: &StoredProjects,
) -> Option<(StoreSnapshot, StoreSnapshot)> {
    let mut next = local.clone();
    let mut next_base = base.clone();
    let mut changed = false;

    let ids = base
        .items
        .keys()
        .chain(local.items.keys())
        .chain(disk.items.keys())
        .collect::<HashSet<&String>>();
    for id in ids {
        let ours = local.items.get(id);
        if !same_node(base.items.get(id), ours) {
            continue;
        }

        let theirs = disk.items.get(id);
        if ours == theirs {
            continue;
        }

        changed = true;
        match theirs {
            Some(node) => {
                next.items.insert(id.to_string(), node.clone());
                next_base.items.insert(id.to_string(), node.clone());
            }
            None => {
                next.items.remove(id);
                next_base.items.remove(id);
            }
        }
    }

    if base.selected_id == local.selected_id && local.selected_id != disk.selected_id {
        changed = true;
        next.selected_id = disk.selected_id.clone();
        next_base.selected_id = disk.selected_id.clone();
    }

    for id in marker_ids(&[&base.push_markers, &local.push_markers, &disk.push_markers]) {
        let ours = local.push_markers.get(id);
        if base.push_markers.get(id) != ours {
            continue;
        }

        let theirs = disk.push_markers.get(id);
        if ours == theirs {
            continue;
        }

        changed = true;
        match theirs {
            Some(marker) => {
                next.push_markers.insert(id.to_string(), *marker);
                next_base.push_markers.insert(id.to_string(), *marker);
            }
            None => {
                next.push_markers.remove(id);
                next_base.push_markers.remove(id);
            }
        }
    }

    if !changed {
        return None;
    }

    return Some((next, next_base));
}

/// Reads and writes `projects.yaml`.
///
/// Several canvas processes can share the file, so a save only writes what
/// this process changed since it last loaded or saved. Everything else is
/// taken from the file as it is at that moment.
#[derive(Clone)]
pub struct Persistence {
    pub data_dir: path::PathBuf,
    synced: Arc<Mutex<Option<Arc<StoreSnapshot>>>>,
}

impl Default for Persistence {
    fn default() -> Persistence {
        return Persistence::new(path::PathBuf::from(Config::get(ConfigKey::DataDir)));
    }
}

impl Persistence {
    pub fn new(data_dir: path::PathBuf) -> Persistence {
        return Persistence {
            data_dir,
            synced: Arc::new(Mutex::new(None)),
        };
    }

    pub fn path(&self) -> path::PathBuf {
        return self.data_dir.join("projects.yaml");
    }

    /// Returns `None` when nothing has been saved yet.
    pub async fn load(&self) -> Result<Option<StoredProjects>> {
        let file_path = self.path();
        if !file_path.exists() {
            return Ok(None);
        }

        let payload = fs::read_to_string(file_path).await?;
        let stored: StoredProjects = serde_yaml::from_str(&payload)?;

        return Ok(Some(stored));
    }

    /// Remembers `snapshot` as matching the file.
    pub async fn mark_synced(&self, snapshot: &StoreSnapshot) {
        *self.synced.lock().await = Some(Arc::new(snapshot.clone()));
    }

    async fn write(&self, stored: &StoredProjects) -> Result<()> {
        let payload = serde_yaml::to_string(stored)?;

        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).await?;
        }

        // Renamed into place so readers never see a half written file.
        let tmp_path = self
            .data_dir
            .join(format!(".projects.yaml.{}.tmp", process::id()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, self.path()).await?;

        return Ok(());
    }

    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let mut synced = self.synced.lock().await;

        let stored = match synced.as_ref() {
            Some(base) => match self.load().await? {
                Some(disk) => merge_changes(base, snapshot, disk),
                None => StoredProjects::from_snapshot(snapshot),
            },
            None => StoredProjects::from_snapshot(snapshot),
        };

        self.write(&stored).await?;
        *synced = Some(Arc::new(snapshot.clone()));

        return Ok(());
    }

    /// Brings in what other processes saved since this one last loaded or
    /// saved. Local changes that haven't been saved yet are kept.
    pub async fn refresh(&self, store: &LocalStore) -> Result<()> {
        let mut synced = self.synced.lock().await;
        let base = match synced.as_ref() {
            Some(base) => base.clone(),
            None => return Ok(()),
        };

        let disk = match self.load().await? {
            Some(disk) => disk,
            None => return Ok(()),
        };
        ProjectTree::new(&disk.items).validate()?;

        let next_base = store.mutate(|current| {
            return adopt_changes(&base, current, &disk);
        });

        if let Some(next_base) = next_base {
            tracing::debug!(path = ?self.path(), "Loaded changes saved by another process");
            *synced = Some(Arc::new(next_base));
        }

        return Ok(());
    }

    pub async fn delete(&self) -> Result<()> {
        let mut synced = self.synced.lock().await;
        *synced = None;

        let file_path = self.path();
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }

    /// Writes every snapshot the store publishes until the store is dropped.
    /// Snapshots that arrive while a write is in progress are coalesced into
    /// the next write.
    pub async fn start(&self, mut rx: watch::Receiver<Arc<StoreSnapshot>>) -> Result<()> {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.initialized || snapshot.error.is_some() {
                continue;
            }

            self.save(&snapshot).await?;
            tracing::debug!(path = ?self.path(), items = snapshot.items.len(), "Saved projects");
        }

        return Ok(());
    }
}
