//! Action - one caller's interest in a request
//!
//! An action is owned by the dispatcher while it is pending and is consumed
//! exactly once: delivered through the main sink, or dropped on cancellation.
//! Dropping an action drops its callback, which the waiting caller observes
//! as [`LoadError::Cancelled`].

use std::fmt;
use std::sync::Arc;

use contracts::{
    Fingerprint, Image, LoadError, LoadedFrom, MemoryPolicy, NetworkPolicy, Priority, Request,
    Tag, TargetId,
};
use tokio::sync::oneshot;

/// Unique id of an action, allocated by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// Consumer-target identity
///
/// Paused and failed actions are keyed by slot, so a newer action for the
/// same target replaces the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionSlot {
    /// Bound to a display target
    Target(TargetId),
    /// Fire-and-forget fetch; the action is its own target
    Detached(ActionId),
}

impl ActionSlot {
    pub fn target(self) -> Option<TargetId> {
        match self {
            Self::Target(target) => Some(target),
            Self::Detached(_) => None,
        }
    }
}

/// A successfully loaded image as seen by the caller
#[derive(Debug, Clone)]
pub struct Loaded {
    pub image: Arc<Image>,
    pub from: LoadedFrom,
}

/// Result handed to an action's callback
pub type LoadResult = Result<Loaded, LoadError>;

/// Pending consumer of a request
pub struct Action {
    id: ActionId,
    key: Fingerprint,
    request: Request,
    tag: Option<Tag>,
    slot: ActionSlot,
    callback: Option<oneshot::Sender<LoadResult>>,
    pub(crate) will_replay: bool,
}

impl Action {
    /// Create an action; `target` of `None` makes it a detached fetch
    pub fn new(id: ActionId, request: Request, tag: Option<Tag>, target: Option<TargetId>) -> Self {
        let slot = match target {
            Some(target) => ActionSlot::Target(target),
            None => ActionSlot::Detached(id),
        };
        Self {
            id,
            key: request.fingerprint(),
            request,
            tag,
            slot,
            callback: None,
            will_replay: false,
        }
    }

    /// Attach the channel the result is sent on
    pub fn with_callback(mut self, callback: oneshot::Sender<LoadResult>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn priority(&self) -> Priority {
        self.request.priority
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn slot(&self) -> ActionSlot {
        self.slot
    }

    pub fn memory_policy(&self) -> MemoryPolicy {
        self.request.memory_policy
    }

    pub fn network_policy(&self) -> NetworkPolicy {
        self.request.network_policy
    }

    /// Set once the action is parked for replay after a connectivity loss
    pub fn will_replay(&self) -> bool {
        self.will_replay
    }

    /// Cheap identity used to cancel this action later
    pub fn action_ref(&self) -> ActionRef {
        ActionRef {
            id: self.id,
            key: self.key.clone(),
            slot: self.slot,
            tag: self.tag.clone(),
        }
    }

    /// Send the result to the caller, consuming the action
    pub fn complete(mut self, result: LoadResult) {
        if let Some(callback) = self.callback.take() {
            // Receiver gone means nobody waits any more
            let _ = callback.send(result);
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("slot", &self.slot)
            .field("will_replay", &self.will_replay)
            .finish()
    }
}

/// Identity of a submitted action, kept by the caller to cancel it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub id: ActionId,
    pub key: Fingerprint,
    pub slot: ActionSlot,
    pub tag: Option<Tag>,
}
