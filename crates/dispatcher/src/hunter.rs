//! Hunter - the shared unit of work behind one fingerprint
//!
//! A hunter fetches and decodes one request on a pool worker and reports the
//! outcome back to the dispatcher mailbox. Every action asking for the same
//! fingerprint attaches to the live hunter instead of starting new work.
//!
//! State machine:
//!
//! ```text
//! Created -> Queued -> Running -> Settled -> Completed | Failed | Cancelled
//!              ^                     |
//!              +------- retry -------+
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use contracts::{
    DecodeHints, Decoder, Fetcher, Fingerprint, Image, LoadError, LoadedFrom, LocatorKind,
    MemoryCache, MemoryPolicy, NetworkInfo, NetworkPolicy, Priority, Request, Tag,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};
use worker_pool::Job;

use crate::action::{Action, ActionId};
use crate::dispatcher::Command;

/// Lifecycle of a hunter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunterState {
    Created,
    Queued,
    Running,
    /// Finished a run, waiting for the dispatcher to act on the outcome
    Settled,
    Completed,
    Failed,
    Cancelled,
}

impl HunterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Result of the last run
#[derive(Debug, Clone)]
pub enum HunterOutcome {
    Loaded { image: Arc<Image>, from: LoadedFrom },
    Failed(LoadError),
}

/// What a finished run asks the dispatcher to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunterEvent {
    Complete,
    /// Transient failure, eligible for retry
    Retry,
    Failed,
}

/// Collaborators shared by every hunter of a dispatcher
pub struct HunterContext {
    pub decoder: Arc<dyn Decoder>,
    pub cache: Arc<dyn MemoryCache>,
    pub mailbox: UnboundedSender<Command>,
}

impl HunterContext {
    pub fn new(
        decoder: Arc<dyn Decoder>,
        cache: Arc<dyn MemoryCache>,
        mailbox: UnboundedSender<Command>,
    ) -> Self {
        Self {
            decoder,
            cache,
            mailbox,
        }
    }
}

struct HunterInner {
    state: HunterState,
    actions: IndexMap<ActionId, Action>,
    priority: Priority,
    network_policy: NetworkPolicy,
    outcome: Option<HunterOutcome>,
}

pub struct Hunter {
    sequence: u64,
    key: Fingerprint,
    request: Request,
    memory_policy: MemoryPolicy,
    fetcher: Arc<dyn Fetcher>,
    context: Arc<HunterContext>,
    inner: Mutex<HunterInner>,
    cancelled: AtomicBool,
    retry_budget: AtomicU32,
}

impl Hunter {
    /// Create a hunter for `action`'s request with `action` attached
    pub fn new(
        sequence: u64,
        action: Action,
        fetcher: Arc<dyn Fetcher>,
        context: Arc<HunterContext>,
        retry_budget: u32,
    ) -> Arc<Self> {
        let mut actions = IndexMap::new();
        let priority = action.priority();
        let network_policy = action.network_policy();
        let memory_policy = action.memory_policy();
        let key = action.key().clone();
        let request = action.request().clone();
        actions.insert(action.id(), action);

        Arc::new(Self {
            sequence,
            key,
            request,
            memory_policy,
            fetcher,
            context,
            inner: Mutex::new(HunterInner {
                state: HunterState::Created,
                actions,
                priority,
                network_policy,
                outcome: None,
            }),
            cancelled: AtomicBool::new(false),
            retry_budget: AtomicU32::new(retry_budget),
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn kind(&self) -> LocatorKind {
        self.request.locator.kind()
    }

    pub fn memory_policy(&self) -> MemoryPolicy {
        self.memory_policy
    }

    pub fn network_policy(&self) -> NetworkPolicy {
        self.inner.lock().network_policy
    }

    pub fn state(&self) -> HunterState {
        self.inner.lock().state
    }

    /// Highest priority among the attached actions
    pub fn priority(&self) -> Priority {
        self.inner.lock().priority
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget.load(Ordering::Acquire)
    }

    /// Attach another action for the same fingerprint.
    ///
    /// A terminal hunter hands the action back; the caller must start a new
    /// hunter for it.
    pub fn try_attach(&self, action: Action) -> Result<(), Action> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() || self.is_cancelled() {
            return Err(action);
        }
        inner.priority = inner.priority.max(action.priority());
        inner.actions.insert(action.id(), action);
        Ok(())
    }

    /// Detach one action; priority drops to the highest remaining one
    pub fn detach(&self, id: ActionId) -> Option<Action> {
        let mut inner = self.inner.lock();
        let action = inner.actions.shift_remove(&id)?;
        inner.priority = max_priority(&inner.actions);
        Some(action)
    }

    /// Detach every action carrying `tag`, in attachment order
    pub fn detach_tagged(&self, tag: &Tag) -> Vec<Action> {
        let mut inner = self.inner.lock();
        let ids: Vec<ActionId> = inner
            .actions
            .values()
            .filter(|action| action.tag() == Some(tag))
            .map(Action::id)
            .collect();
        let detached: Vec<Action> = ids
            .iter()
            .filter_map(|id| inner.actions.shift_remove(id))
            .collect();
        if !detached.is_empty() {
            inner.priority = max_priority(&inner.actions);
        }
        detached
    }

    /// Remove and return every attached action
    pub fn take_actions(&self) -> Vec<Action> {
        let mut inner = self.inner.lock();
        inner.actions.drain(..).map(|(_, action)| action).collect()
    }

    pub fn action_count(&self) -> usize {
        self.inner.lock().actions.len()
    }

    /// Created/Settled -> Queued, before (re)submission to the pool
    pub fn mark_queued(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            HunterState::Created | HunterState::Settled => {
                inner.state = HunterState::Queued;
                true
            }
            _ => false,
        }
    }

    /// Queued -> Running; false when cancelled or already running
    pub fn begin(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.state != HunterState::Queued {
            return false;
        }
        inner.state = HunterState::Running;
        true
    }

    fn settle(&self, outcome: HunterOutcome) {
        let mut inner = self.inner.lock();
        inner.state = HunterState::Settled;
        inner.outcome = Some(outcome);
    }

    /// Move to a terminal state
    pub fn finish(&self, state: HunterState) {
        self.inner.lock().state = state;
    }

    /// Flag the hunter cancelled; the worker stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.inner.lock().state = HunterState::Cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn outcome(&self) -> Option<HunterOutcome> {
        self.inner.lock().outcome.clone()
    }

    /// Error of the last run, if it failed
    pub fn error(&self) -> Option<LoadError> {
        match &self.inner.lock().outcome {
            Some(HunterOutcome::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Consume one unit of retry budget, then ask the locator kind.
    ///
    /// Only a transient last failure qualifies.
    pub fn should_retry(&self, airplane_mode: bool, network: Option<&NetworkInfo>) -> bool {
        let had_budget = self
            .retry_budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |budget| {
                budget.checked_sub(1)
            })
            .is_ok();
        if !had_budget {
            return false;
        }
        let transient = self
            .error()
            .is_some_and(|error| error.kind().is_retryable());
        transient && self.kind().should_retry(airplane_mode, network)
    }

    pub fn supports_replay(&self) -> bool {
        self.kind().supports_replay()
    }

    /// Make the next attempt bypass the fetcher's disk cache
    pub fn force_network_refetch(&self) {
        let mut inner = self.inner.lock();
        inner.network_policy.insert(NetworkPolicy::NO_CACHE);
        inner.network_policy.remove(NetworkPolicy::OFFLINE);
    }

    /// One fetch + decode attempt. `None` when cancelled mid-way.
    fn hunt(&self) -> Option<HunterEvent> {
        if self.memory_policy.should_read_from_memory_cache() {
            if let Some(image) = self.context.cache.get(&self.key) {
                trace!(key = %self.key, "Memory cache hit on worker");
                self.settle(HunterOutcome::Loaded {
                    image,
                    from: LoadedFrom::Memory,
                });
                return Some(HunterEvent::Complete);
            }
        }

        let mut policy = self.network_policy();
        if self.retry_budget() == 0 {
            policy.insert(NetworkPolicy::OFFLINE);
        }

        let locator = &self.request.locator;
        let fetched = match self.fetcher.fetch(locator, policy) {
            Ok(fetched) => fetched,
            Err(error) => {
                if self.is_cancelled() {
                    return None;
                }
                let error = LoadError::from_fetch(locator.as_str(), error);
                let event = if error.kind().is_retryable() {
                    HunterEvent::Retry
                } else {
                    HunterEvent::Failed
                };
                debug!(key = %self.key, error = %error, "Fetch failed");
                self.settle(HunterOutcome::Failed(error));
                return Some(event);
            }
        };
        if self.is_cancelled() {
            return None;
        }

        let from = fetched.source;
        let decoded = self
            .context
            .decoder
            .decode(fetched, &DecodeHints::from(&self.request));
        if self.is_cancelled() {
            return None;
        }

        match decoded {
            Ok(image) => {
                self.settle(HunterOutcome::Loaded {
                    image: Arc::new(image),
                    from,
                });
                Some(HunterEvent::Complete)
            }
            Err(error) => {
                debug!(key = %self.key, error = %error, "Decode failed");
                self.settle(HunterOutcome::Failed(error.into()));
                Some(HunterEvent::Failed)
            }
        }
    }
}

impl Job for Hunter {
    fn priority(&self) -> Priority {
        Hunter::priority(self)
    }

    fn is_cancelled(&self) -> bool {
        Hunter::is_cancelled(self)
    }

    fn run(self: Arc<Self>) {
        if !self.begin() {
            return;
        }
        let Some(event) = self.hunt() else {
            trace!(key = %self.key, "Hunter cancelled while running");
            return;
        };
        let mailbox = self.context.mailbox.clone();
        // Closed mailbox: the dispatcher is gone and nobody waits
        let _ = mailbox.send(Command::HunterFinished {
            hunter: self,
            event,
        });
    }
}

impl fmt::Debug for Hunter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Hunter")
            .field("sequence", &self.sequence)
            .field("key", &self.key)
            .field("state", &inner.state)
            .field("actions", &inner.actions.len())
            .field("priority", &inner.priority)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn max_priority(actions: &IndexMap<ActionId, Action>) -> Priority {
    actions
        .values()
        .map(Action::priority)
        .max()
        .unwrap_or_default()
}
