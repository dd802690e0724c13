//! Delivery - hands results to the single-threaded consumer
//!
//! The dispatcher never calls consumers itself. It sends [`Delivery`]
//! messages to one delivery task, which calls the [`MainSink`] for each
//! action in order.

use std::sync::Arc;

use contracts::{Image, LoadError, LoadedFrom};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::action::{Action, Loaded};
use crate::metrics::DeliveryMetrics;

/// Result for one action
#[derive(Debug)]
pub struct DeliveryItem {
    pub action: Action,
    pub result: Result<(Arc<Image>, LoadedFrom), LoadError>,
}

impl DeliveryItem {
    pub fn success(action: Action, image: Arc<Image>, from: LoadedFrom) -> Self {
        Self {
            action,
            result: Ok((image, from)),
        }
    }

    pub fn failure(action: Action, error: LoadError) -> Self {
        Self {
            action,
            result: Err(error),
        }
    }
}

/// Message from the dispatcher to the delivery task
#[derive(Debug)]
pub enum Delivery {
    /// Outside the batch: memory hits on resume, unsupported locators
    Immediate(DeliveryItem),
    /// Flushed completion batch
    Batch(Vec<DeliveryItem>),
}

/// Consumer of delivered results, driven only by the delivery task
pub trait MainSink: Send + 'static {
    fn deliver_success(&mut self, action: Action, image: Arc<Image>, from: LoadedFrom);

    fn deliver_error(&mut self, action: Action, error: LoadError);
}

impl<S: MainSink + ?Sized> MainSink for Box<S> {
    fn deliver_success(&mut self, action: Action, image: Arc<Image>, from: LoadedFrom) {
        (**self).deliver_success(action, image, from);
    }

    fn deliver_error(&mut self, action: Action, error: LoadError) {
        (**self).deliver_error(action, error);
    }
}

/// Completes each action's callback
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackSink;

impl MainSink for CallbackSink {
    fn deliver_success(&mut self, action: Action, image: Arc<Image>, from: LoadedFrom) {
        action.complete(Ok(Loaded { image, from }));
    }

    fn deliver_error(&mut self, action: Action, error: LoadError) {
        action.complete(Err(error));
    }
}

/// Spawn the delivery task; it ends when the dispatcher drops its sender
pub fn spawn_delivery<S: MainSink>(
    sink: S,
    rx: mpsc::UnboundedReceiver<Delivery>,
    metrics: Arc<DeliveryMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(delivery_loop(sink, rx, metrics))
}

#[instrument(name = "delivery_loop", skip_all)]
async fn delivery_loop<S: MainSink>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    metrics: Arc<DeliveryMetrics>,
) {
    debug!("Delivery task started");

    while let Some(delivery) = rx.recv().await {
        match delivery {
            Delivery::Immediate(item) => {
                metrics.inc_immediate_count();
                deliver(&mut sink, item, &metrics);
            }
            Delivery::Batch(items) => {
                metrics.inc_batch_count();
                trace!(size = items.len(), "Delivering batch");
                for item in items {
                    deliver(&mut sink, item, &metrics);
                }
            }
        }
    }

    debug!("Delivery task stopped");
}

fn deliver<S: MainSink>(sink: &mut S, item: DeliveryItem, metrics: &DeliveryMetrics) {
    match item.result {
        Ok((image, from)) => {
            metrics.inc_success_count();
            observability::metrics::record_delivery(true);
            sink.deliver_success(item.action, image, from);
        }
        Err(error) => {
            metrics.inc_error_count();
            observability::metrics::record_delivery(false);
            sink.deliver_error(item.action, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionId;
    use contracts::Request;
    use tokio::sync::oneshot;

    fn action_with_callback(id: u64) -> (Action, oneshot::Receiver<crate::action::LoadResult>) {
        let (tx, rx) = oneshot::channel();
        let action = Action::new(ActionId(id), Request::new("file:///a.png"), None, None)
            .with_callback(tx);
        (action, rx)
    }

    #[tokio::test]
    async fn test_batch_delivered_per_action() {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(DeliveryMetrics::new());
        let task = spawn_delivery(CallbackSink, rx, Arc::clone(&metrics));

        let image = Arc::new(Image::new(1, 1, vec![0u8; 4]));
        let (first, first_rx) = action_with_callback(1);
        let (second, second_rx) = action_with_callback(2);
        let (third, third_rx) = action_with_callback(3);

        tx.send(Delivery::Batch(vec![
            DeliveryItem::success(first, Arc::clone(&image), LoadedFrom::Disk),
            DeliveryItem::success(second, image, LoadedFrom::Disk),
        ]))
        .unwrap();
        tx.send(Delivery::Immediate(DeliveryItem::failure(
            third,
            LoadError::unsupported("gopher://x"),
        )))
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(first_rx.await.unwrap().unwrap().from, LoadedFrom::Disk);
        assert_eq!(second_rx.await.unwrap().unwrap().image.width, 1);
        assert!(third_rx.await.unwrap().is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batch_count, 1);
        assert_eq!(snapshot.immediate_count, 1);
        assert_eq!(snapshot.success_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }
}
