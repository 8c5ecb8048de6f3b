mod action;
mod component;
mod endpoint;
mod event;
mod message;
mod node;
mod remote;
mod snapshot;
mod sync;

pub use action::*;
pub use component::*;
pub use endpoint::*;
pub use event::*;
pub use message::*;
pub use node::*;
pub use remote::*;
pub use snapshot::*;
pub use sync::*;
