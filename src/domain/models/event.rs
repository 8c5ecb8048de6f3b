use super::ComponentRef;
use super::SyncOutcome;

#[derive(Debug)]
pub enum Event {
    SyncCompleted(ComponentRef, SyncOutcome),
}
