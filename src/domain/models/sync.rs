use std::fmt;

use serde_derive::Deserialize;
use serde_derive::Serialize;

/// Link between one component and its project's remote record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Not signed in, or no fetch has completed yet.
    Unlinked,
    /// Fetch in flight.
    Linking,
    /// Fetch found nothing. The next reconcile creates the record.
    Uploading,
    /// Remote record id.
    Linked(String),
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkState::Unlinked => return write!(f, "unlinked"),
            LinkState::Linking => return write!(f, "linking"),
            LinkState::Uploading => return write!(f, "uploading"),
            LinkState::Linked(id) => return write!(f, "linked ({id})"),
        }
    }
}

/// Last push made for a project, kept with the store so it outlives the
/// bridge that made it. A remote record older than `last_push` is ours or
/// predates ours, so it never overwrites local data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMarker {
    /// Epoch milliseconds of the last local write or push attempt.
    #[serde(rename = "lastPush")]
    pub last_push: i64,
    /// Set until the remote has acknowledged the write.
    #[serde(rename = "pushPending", default)]
    pub pending: bool,
}

impl PushMarker {
    pub fn pending(last_push: i64) -> PushMarker {
        return PushMarker {
            last_push,
            pending: true,
        };
    }

    pub fn acknowledged(last_push: i64) -> PushMarker {
        return PushMarker {
            last_push,
            pending: false,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Syncing is disabled for the current session.
    Inert,
    /// The component went away while the operation was in flight.
    Discarded,
    /// The project or component no longer resolves locally.
    NotFound,
    InSync,
    Uploaded,
    Pulled,
    Pushed,
    /// Remote record predates our last push.
    Stale,
    Failed(String),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncOutcome::Inert => return write!(f, "local only"),
            SyncOutcome::Discarded => return write!(f, "discarded"),
            SyncOutcome::NotFound => return write!(f, "not found"),
            SyncOutcome::InSync => return write!(f, "in sync"),
            SyncOutcome::Uploaded => return write!(f, "uploaded"),
            SyncOutcome::Pulled => return write!(f, "pulled"),
            SyncOutcome::Pushed => return write!(f, "pushed"),
            SyncOutcome::Stale => return write!(f, "stale remote ignored"),
            SyncOutcome::Failed(reason) => return write!(f, "failed: {reason}"),
        }
    }
}
