use serde_json::Value;

use super::AuthSession;
use super::ComponentRef;

pub enum Action {
    Reconcile(ComponentRef),
    ReconcileProject(String),
    Push(ComponentRef, Value),
    SignIn(AuthSession),
    SignOut(),
    Detach(ComponentRef),
}
