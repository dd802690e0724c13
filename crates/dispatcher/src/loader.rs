//! Loader - composition root and caller-facing API
//!
//! Owns the memory cache, worker pool, dispatcher task, delivery task and
//! connectivity monitor. Built explicitly through [`Loader::builder`]; there
//! is no process-wide instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{
    Decoder, Image, LoadError, LoadedFrom, LoaderConfig, MemoryCache, Request, Tag, TargetId,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace};
use worker_pool::{PoolSnapshot, WorkerPool};

use crate::action::{Action, ActionId, ActionRef, LoadResult, Loaded};
use crate::cache::LruMemoryCache;
use crate::connectivity::ConnectivityMonitor;
use crate::delivery::{spawn_delivery, CallbackSink, MainSink};
use crate::dispatcher::{DispatcherCore, DispatcherSnapshot};
use crate::error::DispatcherError;
use crate::handle::DispatcherHandle;
use crate::hunter::{Hunter, HunterContext};
use crate::metrics::{DeliveryMetrics, DeliverySnapshot};
use crate::registry::SourceSet;

/// Builder for a [`Loader`]
pub struct LoaderBuilder {
    config: LoaderConfig,
    sources: SourceSet,
    decoder: Option<Arc<dyn Decoder>>,
    cache: Option<Arc<dyn MemoryCache>>,
    sink: Option<Box<dyn MainSink>>,
}

impl LoaderBuilder {
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sources(mut self, sources: SourceSet) -> Self {
        self.sources = sources;
        self
    }

    /// Required
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Defaults to an [`LruMemoryCache`] sized by the cache config
    pub fn cache(mut self, cache: Arc<dyn MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Defaults to [`CallbackSink`], which resolves each [`Ticket`]
    pub fn sink(mut self, sink: impl MainSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Start the worker pool, dispatcher and delivery tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`DispatcherError::MissingComponent`] when no decoder was given.
    #[instrument(name = "loader_build", skip(self), fields(sources = ?self.sources))]
    pub fn build(self) -> Result<Loader, DispatcherError> {
        let decoder = self
            .decoder
            .ok_or_else(|| DispatcherError::missing_component("decoder"))?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(LruMemoryCache::from_config(&self.config.cache)));
        let sink = self.sink.unwrap_or_else(|| Box::new(CallbackSink));

        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let registration = Arc::new(AtomicBool::new(
            self.config.dispatcher.scans_network_changes,
        ));

        let pool: Arc<WorkerPool<Hunter>> = Arc::new(WorkerPool::new(self.config.pool.clone()));
        let context = Arc::new(HunterContext::new(
            decoder,
            Arc::clone(&cache),
            mailbox_tx.clone(),
        ));
        let core = DispatcherCore::new(
            &self.config,
            Arc::clone(&pool),
            self.sources,
            context,
            delivery_tx,
            Arc::clone(&registration),
        );
        core.spawn(mailbox_rx);

        let targets = Arc::new(TargetMap::default());
        let sink = TargetReleasingSink {
            targets: Arc::clone(&targets),
            inner: sink,
        };
        let delivery_metrics = Arc::new(DeliveryMetrics::new());
        spawn_delivery(sink, delivery_rx, Arc::clone(&delivery_metrics));

        let handle = DispatcherHandle::new(mailbox_tx);
        let monitor = ConnectivityMonitor::new(handle.clone(), registration);

        info!(
            threads = pool.thread_count(),
            cache_bytes = self.config.cache.max_bytes,
            "Loader started"
        );

        Ok(Loader {
            handle,
            cache,
            pool,
            monitor,
            delivery_metrics,
            targets,
            next_action_id: AtomicU64::new(1),
        })
    }
}

/// Combined view of every loader component
#[derive(Debug, Clone)]
pub struct LoaderSnapshot {
    pub dispatcher: DispatcherSnapshot,
    pub pool: PoolSnapshot,
    pub delivery: DeliverySnapshot,
    pub cache_entries: usize,
    pub cache_bytes: usize,
    /// Targets with a load still pending
    pub bound_targets: usize,
}

pub struct Loader {
    handle: DispatcherHandle,
    cache: Arc<dyn MemoryCache>,
    pool: Arc<WorkerPool<Hunter>>,
    monitor: ConnectivityMonitor,
    delivery_metrics: Arc<DeliveryMetrics>,
    targets: Arc<TargetMap>,
    next_action_id: AtomicU64,
}

impl Loader {
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder {
            config: LoaderConfig::default(),
            sources: SourceSet::new(),
            decoder: None,
            cache: None,
            sink: None,
        }
    }

    /// Start describing a load
    pub fn load(&self, request: Request) -> LoadBuilder<'_> {
        LoadBuilder {
            loader: self,
            request,
            tag: None,
            target: None,
        }
    }

    /// Fire-and-forget fetch of `request`
    pub fn fetch(&self, request: Request) -> Ticket {
        self.load(request).submit()
    }

    /// Cancel whatever is pending for `target`
    pub fn cancel_target(&self, target: TargetId) {
        if let Some(previous) = self.targets.take(target) {
            self.handle.cancel(previous);
        }
    }

    pub fn pause_tag(&self, tag: impl Into<Tag>) {
        self.handle.pause_tag(tag.into());
    }

    pub fn resume_tag(&self, tag: impl Into<Tag>) {
        self.handle.resume_tag(tag.into());
    }

    /// Entry point for platform connectivity broadcasts
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<dyn MemoryCache> {
        &self.cache
    }

    pub fn handle(&self) -> &DispatcherHandle {
        &self.handle
    }

    /// # Errors
    /// [`DispatcherError::Closed`] after shutdown.
    pub async fn snapshot(&self) -> Result<LoaderSnapshot, DispatcherError> {
        let dispatcher = self.handle.snapshot().await?;
        Ok(LoaderSnapshot {
            dispatcher,
            pool: self.pool.snapshot(),
            delivery: self.delivery_metrics.snapshot(),
            cache_entries: self.cache.len(),
            cache_bytes: self.cache.size_bytes(),
            bound_targets: self.targets.len(),
        })
    }

    /// Stop everything; pending requests resolve as cancelled. Idempotent.
    #[instrument(name = "loader_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
        self.cache.clear();
        self.targets.clear();
        info!("Loader shut down");
    }

    fn next_id(&self) -> ActionId {
        ActionId(self.next_action_id.fetch_add(1, Ordering::Relaxed))
    }

    fn submit(&self, request: Request, tag: Option<Tag>, target: Option<TargetId>) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let action = Action::new(self.next_id(), request, tag, target).with_callback(tx);
        let action_ref = action.action_ref();

        // A new request for a target replaces the previous one
        if let Some(target) = target {
            if let Some(previous) = self.targets.bind(target, action_ref.clone()) {
                trace!(%target, previous = %previous.id, "Replacing pending request");
                self.handle.cancel(previous);
            }
        }

        if action.memory_policy().should_read_from_memory_cache() {
            if let Some(image) = self.cache.get(action.key()) {
                debug!(key = %action.key(), "Memory cache hit");
                self.targets.release(&action_ref);
                action.complete(Ok(Loaded {
                    image,
                    from: LoadedFrom::Memory,
                }));
                return self.ticket(action_ref, rx);
            }
        }

        self.handle.submit(action);
        self.ticket(action_ref, rx)
    }

    fn ticket(&self, action: ActionRef, rx: oneshot::Receiver<LoadResult>) -> Ticket {
        Ticket {
            action,
            rx,
            handle: self.handle.clone(),
            targets: Arc::clone(&self.targets),
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.handle.shutdown_now();
    }
}

/// Request being described; finish with [`submit`](Self::submit)
pub struct LoadBuilder<'a> {
    loader: &'a Loader,
    request: Request,
    tag: Option<Tag>,
    target: Option<TargetId>,
}

impl LoadBuilder<'_> {
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Bind the load to a display target
    pub fn target(mut self, target: TargetId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn submit(self) -> Ticket {
        self.loader.submit(self.request, self.tag, self.target)
    }
}

/// Pending result of a submitted load
pub struct Ticket {
    action: ActionRef,
    rx: oneshot::Receiver<LoadResult>,
    handle: DispatcherHandle,
    targets: Arc<TargetMap>,
}

impl Ticket {
    pub fn action(&self) -> &ActionRef {
        &self.action
    }

    /// Cancel the load; [`wait`](Self::wait) then yields `Cancelled`
    pub fn cancel(&self) {
        self.targets.release(&self.action);
        self.handle.cancel(self.action.clone());
    }

    /// Wait for the result. Cancelled or dropped loads yield
    /// [`LoadError::Cancelled`].
    pub async fn wait(self) -> LoadResult {
        self.rx.await.unwrap_or(Err(LoadError::Cancelled))
    }
}

/// Pending action per display target
///
/// An entry lives from submission until its action is delivered, cancelled
/// or replaced.
#[derive(Debug, Default)]
struct TargetMap(Mutex<HashMap<TargetId, ActionRef>>);

impl TargetMap {
    /// Bind `action` to `target`, returning the action it replaces
    fn bind(&self, target: TargetId, action: ActionRef) -> Option<ActionRef> {
        let id = action.id;
        self.0
            .lock()
            .insert(target, action)
            .filter(|previous| previous.id != id)
    }

    fn take(&self, target: TargetId) -> Option<ActionRef> {
        self.0.lock().remove(&target)
    }

    /// Unbind the action's target unless a newer action holds it
    fn release(&self, action: &ActionRef) {
        release_target(&self.0, action.slot.target(), action.id);
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }

    fn clear(&self) {
        self.0.lock().clear();
    }
}

fn release_target(
    targets: &Mutex<HashMap<TargetId, ActionRef>>,
    target: Option<TargetId>,
    id: ActionId,
) {
    let Some(target) = target else {
        return;
    };
    let mut targets = targets.lock();
    if targets.get(&target).is_some_and(|bound| bound.id == id) {
        targets.remove(&target);
    }
}

/// Unbinds each delivered action's target before handing it on
struct TargetReleasingSink {
    targets: Arc<TargetMap>,
    inner: Box<dyn MainSink>,
}

impl MainSink for TargetReleasingSink {
    fn deliver_success(&mut self, action: Action, image: Arc<Image>, from: LoadedFrom) {
        release_target(&self.targets.0, action.slot().target(), action.id());
        self.inner.deliver_success(action, image, from);
    }

    fn deliver_error(&mut self, action: Action, error: LoadError) {
        release_target(&self.targets.0, action.slot().target(), action.id());
        self.inner.deliver_error(action, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunter::tests::StripDecoder;
    use bytes::Bytes;
    use contracts::{LocatorKind, MemoryPolicy};
    use sources::MemorySource;

    fn loader_with(source: Arc<MemorySource>) -> Loader {
        Loader::builder()
            .sources(SourceSet::new().with(LocatorKind::Network, source))
            .decoder(Arc::new(StripDecoder))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_requires_decoder() {
        let err = Loader::builder().build().err().unwrap();
        assert!(matches!(err, DispatcherError::MissingComponent { .. }));
    }

    #[tokio::test]
    async fn test_fetch_then_memory_hit() {
        let source = Arc::new(MemorySource::new(LoadedFrom::Network));
        source.insert("https://x.io/a", Bytes::from_static(b"abcd"));
        let loader = loader_with(source.clone());

        let first = loader.fetch(Request::new("https://x.io/a")).wait().await.unwrap();
        assert_eq!(first.from, LoadedFrom::Network);
        assert_eq!(first.image.width, 4);

        let second = loader.fetch(Request::new("https://x.io/a")).wait().await.unwrap();
        assert_eq!(second.from, LoadedFrom::Memory);
        assert_eq!(source.fetch_count("https://x.io/a"), 1);

        // Skipping the memory cache goes back to the source
        let third = loader
            .fetch(Request::new("https://x.io/a").memory_policy(MemoryPolicy::NO_CACHE))
            .wait()
            .await
            .unwrap();
        assert_eq!(third.from, LoadedFrom::Network);
        assert_eq!(source.fetch_count("https://x.io/a"), 2);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_request_replaces_target() {
        let source = Arc::new(MemorySource::new(LoadedFrom::Network));
        source.insert("https://x.io/a", Bytes::from_static(b"a"));
        source.insert("https://x.io/b", Bytes::from_static(b"b"));
        source.hold();
        let loader = loader_with(source.clone());

        let old = loader
            .load(Request::new("https://x.io/a"))
            .target(TargetId(1))
            .submit();
        let new = loader
            .load(Request::new("https://x.io/b"))
            .target(TargetId(1))
            .submit();
        source.release();

        assert_eq!(old.wait().await.unwrap_err(), LoadError::Cancelled);
        assert!(new.wait().await.is_ok());
        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_settled_targets_are_released() {
        let source = Arc::new(MemorySource::new(LoadedFrom::Network));
        source.insert("https://x.io/a", Bytes::from_static(b"abcd"));
        let loader = loader_with(source.clone());

        for target in 0..4 {
            let loaded = loader
                .load(Request::new("https://x.io/a"))
                .target(TargetId(target))
                .submit()
                .wait()
                .await;
            assert!(loaded.is_ok());
        }
        // Later loads were memory hits; none leaves a binding behind
        assert_eq!(source.fetch_count("https://x.io/a"), 1);
        assert_eq!(loader.snapshot().await.unwrap().bound_targets, 0);

        let failed = loader
            .load(Request::new("https://x.io/missing"))
            .target(TargetId(7))
            .submit();
        assert!(failed.wait().await.is_err());
        assert_eq!(loader.snapshot().await.unwrap().bound_targets, 0);

        source.hold();
        let pending = loader
            .load(Request::new("https://x.io/b"))
            .target(TargetId(8))
            .submit();
        assert_eq!(loader.snapshot().await.unwrap().bound_targets, 1);
        pending.cancel();
        assert_eq!(loader.snapshot().await.unwrap().bound_targets, 0);
        source.release();
        assert_eq!(pending.wait().await.unwrap_err(), LoadError::Cancelled);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let loader = loader_with(Arc::new(MemorySource::new(LoadedFrom::Network)));
        loader.shutdown().await;
        loader.shutdown().await;

        assert!(!loader.monitor().is_registered());
        assert!(loader.snapshot().await.is_err());
        let ticket = loader.fetch(Request::new("https://x.io/a"));
        assert_eq!(ticket.wait().await.unwrap_err(), LoadError::Cancelled);
    }
}
