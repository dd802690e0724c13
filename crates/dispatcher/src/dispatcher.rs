//! Dispatcher - the single owner of in-flight state
//!
//! Every mutation of the hunter map, paused and failed actions and the
//! completion batch happens here, one mailbox [`Command`] at a time, inside
//! one Tokio task. Workers and callers only ever post messages.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    DispatcherConfig, Fingerprint, LoadError, LoadedFrom, LoaderConfig, NetworkInfo, Tag,
};
use indexmap::IndexMap;
use observability::metrics;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::action::{Action, ActionRef, ActionSlot};
use crate::delivery::{Delivery, DeliveryItem};
use crate::executor::HunterExecutor;
use crate::hunter::{Hunter, HunterContext, HunterEvent, HunterOutcome, HunterState};
use crate::registry::SourceSet;

/// Mailbox message
#[derive(Debug)]
pub enum Command {
    Submit(Action),
    Cancel(ActionRef),
    PauseTag(Tag),
    ResumeTag(Tag),
    /// Posted by a hunter when a run ends
    HunterFinished {
        hunter: Arc<Hunter>,
        event: HunterEvent,
    },
    /// `None`: the platform reported no active network
    NetworkStateChange(Option<NetworkInfo>),
    AirplaneModeChange(bool),
    Snapshot(oneshot::Sender<DispatcherSnapshot>),
    Shutdown(Option<oneshot::Sender<()>>),
}

/// Diagnostic view of dispatcher state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub live_hunters: usize,
    pub paused_tags: usize,
    pub paused_actions: usize,
    pub failed_actions: usize,
    pub batch_len: usize,
    pub airplane_mode: bool,
    pub network: Option<NetworkInfo>,
    pub is_shutdown: bool,
}

/// State owned by the dispatcher task
pub struct DispatcherCore<E> {
    config: DispatcherConfig,
    network_retry_count: u32,
    executor: E,
    sources: SourceSet,
    context: Arc<HunterContext>,
    delivery: UnboundedSender<Delivery>,
    /// Shared with the connectivity monitor
    registration: Arc<AtomicBool>,

    hunters: HashMap<Fingerprint, Arc<Hunter>>,
    paused_tags: HashSet<Tag>,
    paused_actions: IndexMap<ActionSlot, Action>,
    failed_actions: IndexMap<ActionSlot, Action>,
    batch: Vec<Arc<Hunter>>,
    batch_deadline: Option<Instant>,

    /// False until the first connectivity broadcast arrives
    network_known: bool,
    network: Option<NetworkInfo>,
    airplane_mode: bool,

    next_sequence: u64,
    shut_down: bool,
}

impl<E: HunterExecutor> DispatcherCore<E> {
    pub fn new(
        config: &LoaderConfig,
        executor: E,
        sources: SourceSet,
        context: Arc<HunterContext>,
        delivery: UnboundedSender<Delivery>,
        registration: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config: config.dispatcher.clone(),
            network_retry_count: config.retry.network_retry_count,
            executor,
            sources,
            context,
            delivery,
            registration,
            hunters: HashMap::new(),
            paused_tags: HashSet::new(),
            paused_actions: IndexMap::new(),
            failed_actions: IndexMap::new(),
            batch: Vec::new(),
            batch_deadline: None,
            network_known: false,
            network: None,
            airplane_mode: false,
            next_sequence: 0,
            shut_down: false,
        }
    }

    /// Apply one mailbox command
    pub fn handle(&mut self, command: Command) {
        if self.shut_down {
            match command {
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown(Some(ack)) => {
                    let _ = ack.send(());
                }
                other => trace!(command = ?other, "Dispatcher shut down, command ignored"),
            }
            return;
        }

        match command {
            Command::Submit(action) => self.perform_submit(action, true),
            Command::Cancel(action_ref) => self.perform_cancel(&action_ref),
            Command::PauseTag(tag) => self.perform_pause_tag(tag),
            Command::ResumeTag(tag) => self.perform_resume_tag(&tag),
            Command::HunterFinished { hunter, event } => match event {
                HunterEvent::Complete => self.perform_complete(hunter),
                HunterEvent::Retry => self.perform_retry(hunter),
                HunterEvent::Failed => self.perform_error(hunter, false),
            },
            Command::NetworkStateChange(info) => self.perform_network_state_change(info),
            Command::AirplaneModeChange(enabled) => self.perform_airplane_mode_change(enabled),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(ack) => {
                self.perform_shutdown();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    #[instrument(
        name = "dispatcher_submit",
        skip(self, action),
        fields(key = %action.key(), action = %action.id())
    )]
    fn perform_submit(&mut self, action: Action, dismiss_failed: bool) {
        if action.tag().is_some_and(|tag| self.paused_tags.contains(tag)) {
            debug!("Tag is paused, holding action");
            self.paused_actions.insert(action.slot(), action);
            return;
        }

        let action = match self.hunters.get(action.key()) {
            Some(hunter) => {
                let before = hunter.priority();
                match hunter.try_attach(action) {
                    Ok(()) => {
                        trace!(hunter = hunter.sequence(), "Attached to live hunter");
                        metrics::record_hunter_attached();
                        if hunter.priority() > before {
                            self.executor.reprioritize(hunter);
                        }
                        return;
                    }
                    Err(action) => action,
                }
            }
            None => action,
        };

        if self.executor.is_shutdown() {
            debug!("Worker pool is shut down, dropping action");
            return;
        }

        let kind = action.request().locator.kind();
        let Some(fetcher) = self.sources.fetcher_for(kind).cloned() else {
            warn!(locator = %action.request().locator, "No source handles this locator");
            let error = LoadError::unsupported(action.request().locator.as_str());
            self.deliver(Delivery::Immediate(DeliveryItem::failure(action, error)));
            return;
        };

        let key = action.key().clone();
        let slot = action.slot();
        self.next_sequence += 1;
        let hunter = Hunter::new(
            self.next_sequence,
            action,
            fetcher,
            Arc::clone(&self.context),
            kind.retry_count(self.network_retry_count),
        );
        hunter.mark_queued();
        if let Err(e) = self.executor.submit(Arc::clone(&hunter)) {
            debug!(error = %e, "Worker pool rejected hunter");
            return;
        }

        debug!(hunter = hunter.sequence(), %kind, "Hunter created");
        metrics::record_hunter_created(&kind.to_string());
        self.hunters.insert(key, hunter);
        metrics::record_live_hunters(self.hunters.len());

        if dismiss_failed {
            self.failed_actions.shift_remove(&slot);
        }
    }

    #[instrument(
        name = "dispatcher_cancel",
        skip(self, action_ref),
        fields(key = %action_ref.key, action = %action_ref.id)
    )]
    fn perform_cancel(&mut self, action_ref: &ActionRef) {
        if let Some(hunter) = self.hunters.get(&action_ref.key).cloned() {
            hunter.detach(action_ref.id);
            if hunter.action_count() == 0 {
                debug!(hunter = hunter.sequence(), "Last action gone, cancelling hunter");
                hunter.cancel();
                self.hunters.remove(&action_ref.key);
                metrics::record_hunter_outcome("cancelled");
                metrics::record_live_hunters(self.hunters.len());
            }
        }

        // Finished but not yet delivered
        for hunter in self.batch.iter().filter(|h| h.key() == &action_ref.key) {
            hunter.detach(action_ref.id);
        }

        let tag_paused = action_ref
            .tag
            .as_ref()
            .is_some_and(|tag| self.paused_tags.contains(tag));
        if tag_paused {
            remove_if_same(&mut self.paused_actions, action_ref);
        }
        remove_if_same(&mut self.failed_actions, action_ref);
    }

    #[instrument(name = "dispatcher_complete", skip_all, fields(key = %hunter.key()))]
    fn perform_complete(&mut self, hunter: Arc<Hunter>) {
        if hunter.is_cancelled() {
            trace!("Cancelled hunter completed, dropping result");
            self.remove_hunter(&hunter);
            return;
        }

        if hunter.memory_policy().should_write_to_memory_cache() {
            if let Some(HunterOutcome::Loaded { image, .. }) = hunter.outcome() {
                self.context.cache.set(hunter.key().clone(), image);
            }
        }

        self.remove_hunter(&hunter);
        hunter.finish(HunterState::Completed);
        metrics::record_hunter_outcome("completed");
        self.batch(hunter);
    }

    /// Finish a failed hunter. With `will_replay` its actions are kept for
    /// replay by the caller instead of being delivered.
    fn perform_error(&mut self, hunter: Arc<Hunter>, will_replay: bool) {
        self.remove_hunter(&hunter);
        if hunter.is_cancelled() {
            return;
        }
        hunter.finish(HunterState::Failed);
        if will_replay {
            metrics::record_hunter_outcome("replay");
        } else {
            metrics::record_hunter_outcome("failed");
            self.batch(hunter);
        }
    }

    #[instrument(
        name = "dispatcher_retry",
        skip_all,
        fields(key = %hunter.key(), kind = %hunter.kind())
    )]
    fn perform_retry(&mut self, hunter: Arc<Hunter>) {
        if hunter.is_cancelled() {
            return;
        }
        if self.executor.is_shutdown() {
            self.perform_error(hunter, false);
            return;
        }

        let scans = self.config.scans_network_changes;
        let (network, has_connectivity) = if scans {
            self.connectivity()
        } else {
            (None, false)
        };

        let supports_replay = hunter.supports_replay();
        if !hunter.should_retry(self.airplane_mode, network.as_ref()) {
            let will_replay = scans && supports_replay;
            debug!(will_replay, "Not retrying");
            self.perform_error(Arc::clone(&hunter), will_replay);
            if will_replay {
                self.mark_for_replay(&hunter);
            }
            return;
        }

        if !scans || has_connectivity {
            if hunter.error().is_some_and(|e| e.is_content_length_mismatch()) {
                hunter.force_network_refetch();
            }
            hunter.mark_queued();
            debug!(budget = hunter.retry_budget(), "Retrying hunter");
            metrics::record_hunter_retry(&hunter.kind().to_string());
            if let Err(e) = self.executor.submit(Arc::clone(&hunter)) {
                debug!(error = %e, "Worker pool rejected retry");
                self.perform_error(hunter, false);
            }
            return;
        }

        debug!("No connectivity for retry");
        self.perform_error(Arc::clone(&hunter), supports_replay);
        if supports_replay {
            self.mark_for_replay(&hunter);
        }
    }

    #[instrument(name = "dispatcher_pause_tag", skip(self, tag), fields(tag = %tag))]
    fn perform_pause_tag(&mut self, tag: Tag) {
        if !self.paused_tags.insert(tag.clone()) {
            return;
        }

        let mut emptied = Vec::new();
        for (key, hunter) in &self.hunters {
            for action in hunter.detach_tagged(&tag) {
                self.paused_actions.insert(action.slot(), action);
            }
            if hunter.action_count() == 0 {
                hunter.cancel();
                emptied.push(key.clone());
            }
        }
        for key in &emptied {
            self.hunters.remove(key);
        }

        debug!(
            paused = self.paused_actions.len(),
            cancelled = emptied.len(),
            "Tag paused"
        );
        metrics::record_live_hunters(self.hunters.len());
    }

    #[instrument(name = "dispatcher_resume_tag", skip(self, tag), fields(tag = %tag))]
    fn perform_resume_tag(&mut self, tag: &Tag) {
        if !self.paused_tags.remove(tag) {
            return;
        }

        let slots: Vec<ActionSlot> = self
            .paused_actions
            .iter()
            .filter(|(_, action)| action.tag() == Some(tag))
            .map(|(slot, _)| *slot)
            .collect();
        let resumed: Vec<Action> = slots
            .iter()
            .filter_map(|slot| self.paused_actions.shift_remove(slot))
            .collect();

        debug!(resumed = resumed.len(), "Tag resumed");
        for action in resumed {
            self.resume_action(action);
        }
    }

    fn resume_action(&mut self, action: Action) {
        if action.memory_policy().should_read_from_memory_cache() {
            if let Some(image) = self.context.cache.get(action.key()) {
                let item = DeliveryItem::success(action, image, LoadedFrom::Memory);
                self.deliver(Delivery::Immediate(item));
                return;
            }
        }
        self.perform_submit(action, true);
    }

    #[instrument(name = "dispatcher_network_change", skip(self))]
    fn perform_network_state_change(&mut self, info: Option<NetworkInfo>) {
        self.network_known = true;
        self.network = info;
        self.executor.adjust_thread_count(info.as_ref());

        if info.is_some_and(|info| info.is_connected()) {
            self.flush_failed_actions();
        }
    }

    fn perform_airplane_mode_change(&mut self, enabled: bool) {
        debug!(enabled, "Airplane mode changed");
        self.airplane_mode = enabled;
    }

    #[instrument(name = "dispatcher_shutdown", skip(self))]
    fn perform_shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.flush_batch();
        self.shut_down = true;

        self.executor.shutdown();
        self.sources.shutdown_all();
        self.registration.store(false, Ordering::Release);

        // Pending actions are dropped; their callers observe cancellation
        for hunter in self.hunters.values() {
            hunter.cancel();
        }
        let dropped = self.hunters.len() + self.paused_actions.len() + self.failed_actions.len();
        self.hunters.clear();
        self.paused_actions.clear();
        self.failed_actions.clear();
        metrics::record_live_hunters(0);

        info!(dropped, "Dispatcher shut down");
    }

    fn mark_for_replay(&mut self, hunter: &Hunter) {
        for mut action in hunter.take_actions() {
            action.will_replay = true;
            self.failed_actions.insert(action.slot(), action);
        }
        debug!(failed = self.failed_actions.len(), "Actions parked for replay");
    }

    fn flush_failed_actions(&mut self) {
        if self.failed_actions.is_empty() {
            return;
        }
        let failed = std::mem::take(&mut self.failed_actions);
        info!(count = failed.len(), "Replaying failed actions");
        metrics::record_replay_flushed(failed.len());
        for (_, action) in failed {
            self.perform_submit(action, false);
        }
    }

    fn batch(&mut self, hunter: Arc<Hunter>) {
        if hunter.is_cancelled() {
            return;
        }
        self.batch.push(hunter);
        if self.batch.len() >= self.config.batch_max_size {
            self.flush_batch();
        } else if self.batch_deadline.is_none() {
            let delay = Duration::from_millis(self.config.batch_delay_ms);
            self.batch_deadline = Some(Instant::now() + delay);
        }
    }

    /// Hand the pending batch to the delivery task as one message
    pub fn flush_batch(&mut self) {
        self.batch_deadline = None;
        if self.batch.is_empty() {
            return;
        }

        let hunters = std::mem::take(&mut self.batch);
        metrics::record_batch_flushed(hunters.len());

        let mut items = Vec::new();
        for hunter in hunters {
            let Some(outcome) = hunter.outcome() else {
                continue;
            };
            for action in hunter.take_actions() {
                items.push(match &outcome {
                    HunterOutcome::Loaded { image, from } => {
                        DeliveryItem::success(action, Arc::clone(image), *from)
                    }
                    HunterOutcome::Failed(error) => DeliveryItem::failure(action, error.clone()),
                });
            }
        }
        trace!(items = items.len(), "Batch flushed");
        self.deliver(Delivery::Batch(items));
    }

    /// When the pending batch must be flushed
    pub fn batch_deadline(&self) -> Option<Instant> {
        self.batch_deadline
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            live_hunters: self.hunters.len(),
            paused_tags: self.paused_tags.len(),
            paused_actions: self.paused_actions.len(),
            failed_actions: self.failed_actions.len(),
            batch_len: self.batch.len(),
            airplane_mode: self.airplane_mode,
            network: self.network,
            is_shutdown: self.shut_down,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down
    }

    /// Latest snapshot and whether it counts as connected.
    ///
    /// Before the first broadcast the network is unknown and treated as
    /// connected.
    fn connectivity(&self) -> (Option<NetworkInfo>, bool) {
        if !self.network_known {
            return (None, true);
        }
        let connected = self.network.is_some_and(|info| info.is_connected());
        (self.network, connected)
    }

    /// Remove `hunter` from the map only if it is the live one for its key
    fn remove_hunter(&mut self, hunter: &Arc<Hunter>) {
        let same = self
            .hunters
            .get(hunter.key())
            .is_some_and(|live| Arc::ptr_eq(live, hunter));
        if same {
            self.hunters.remove(hunter.key());
            metrics::record_live_hunters(self.hunters.len());
        }
    }

    fn deliver(&self, delivery: Delivery) {
        if self.delivery.send(delivery).is_err() {
            warn!("Delivery task is gone, result dropped");
        }
    }
}

impl<E: HunterExecutor + 'static> DispatcherCore<E> {
    /// Run the dispatcher until shutdown or until every sender is gone
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run(mut self, mut mailbox: UnboundedReceiver<Command>) {
        info!(
            batch_max_size = self.config.batch_max_size,
            batch_delay_ms = self.config.batch_delay_ms,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        self.handle(Command::Shutdown(ack));
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.perform_shutdown();
                        break;
                    }
                },
                () = sleep_until(self.batch_deadline) => self.flush_batch(),
            }
        }

        info!("Dispatcher stopped");
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self, mailbox: UnboundedReceiver<Command>) -> JoinHandle<()> {
        tokio::spawn(self.run(mailbox))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Remove the entry for `action_ref`'s slot if it is that exact action
fn remove_if_same(actions: &mut IndexMap<ActionSlot, Action>, action_ref: &ActionRef) {
    let same = actions
        .get(&action_ref.slot)
        .is_some_and(|action| action.id() == action_ref.id);
    if same {
        actions.shift_remove(&action_ref.slot);
    }
}
