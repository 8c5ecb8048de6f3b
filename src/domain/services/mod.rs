mod chat;
mod local_store;
mod persistence;
mod project_tree;
mod remote_bridge;
mod sync_worker;

pub use chat::*;
pub use local_store::*;
pub use persistence::*;
pub use project_tree::*;
pub use remote_bridge::*;
pub use sync_worker::*;
