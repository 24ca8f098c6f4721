use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use super::{OrderPublisher, PublishError};
use crate::domain::order::Order;
use crate::metrics::Metrics;

// ============================================================================
// Notification Dispatcher - fire-and-forget publishing
// ============================================================================
//
// Every saved order is handed off to a background task that serializes it
// and publishes it under its own deadline. The request that triggered the
// publish never waits for it and never sees its outcome; failures end up in
// the log and in metrics only.
//
// Tasks are spawned on the runtime that built the dispatcher (the main one),
// not on whichever HTTP worker happened to handle the request, so that
// shutdown can still drain them after the workers are gone.
//
// ============================================================================

pub struct NotificationDispatcher {
    publisher: Option<Arc<dyn OrderPublisher>>,
    tracker: TaskTracker,
    runtime: Option<Handle>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    pub fn new(publisher: Arc<dyn OrderPublisher>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            publisher: Some(publisher),
            tracker: TaskTracker::new(),
            runtime: Handle::try_current().ok(),
            timeout,
            metrics,
        }
    }

    /// A dispatcher that drops every notification (publishing turned off).
    pub fn disabled(metrics: Arc<Metrics>) -> Self {
        Self {
            publisher: None,
            tracker: TaskTracker::new(),
            runtime: None,
            timeout: Duration::ZERO,
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Schedule a notification for `order` and return immediately.
    pub fn dispatch(&self, order: Arc<Order>) {
        let Some(publisher) = self.publisher.clone() else {
            return;
        };

        if self.tracker.is_closed() {
            tracing::warn!(
                order_uid = %order.order_uid,
                "Dispatcher is shutting down, dropping notification"
            );
            self.metrics.record_publish("dropped");
            return;
        }

        let limit = self.timeout;
        let metrics = self.metrics.clone();

        let task = async move {
            match publish_order(publisher.as_ref(), &order, limit).await {
                Ok(()) => {
                    tracing::debug!(order_uid = %order.order_uid, "Order notification published");
                    metrics.record_publish("success");
                }
                Err(e) => {
                    tracing::warn!(
                        order_uid = %order.order_uid,
                        error = %e,
                        "Failed to publish order notification"
                    );
                    metrics.record_publish(e.outcome());
                }
            }
        };

        match &self.runtime {
            Some(handle) => self.tracker.spawn_on(task, handle),
            None => self.tracker.spawn(task),
        };
    }

    /// Number of publish tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// `None` when publishing is disabled.
    pub async fn publisher_available(&self) -> Option<bool> {
        match &self.publisher {
            Some(publisher) => Some(publisher.is_available().await),
            None => None,
        }
    }

    /// Stop accepting notifications, wait up to `grace` for in-flight ones,
    /// then flush the publisher. Returns whether every task finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();

        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            tracing::info!("All order notifications drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.len(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace elapsed with notifications still in flight"
            );
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.close().await {
                tracing::warn!(error = %e, "Failed to close publisher");
            }
        }

        drained
    }
}

async fn publish_order(
    publisher: &dyn OrderPublisher,
    order: &Order,
    limit: Duration,
) -> Result<(), PublishError> {
    let payload = serde_json::to_vec(order)?;

    tokio::time::timeout(limit, publisher.publish(&order.order_uid, &payload))
        .await
        .map_err(|_| PublishError::Timeout(limit))?
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_order, RecordingPublisher};

    fn dispatcher(publisher: Arc<RecordingPublisher>, timeout: Duration) -> (NotificationDispatcher, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        (
            NotificationDispatcher::new(publisher, timeout, metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_dispatch_publishes_order_json_keyed_by_uid() {
        let publisher = Arc::new(RecordingPublisher::new());
        let (dispatcher, metrics) = dispatcher(publisher.clone(), Duration::from_secs(10));
        let order = sample_order("b563feb7b2b84b6test");

        dispatcher.dispatch(Arc::new(order.clone()));
        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "b563feb7b2b84b6test");
        let decoded: Order = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(metrics.publish_count("success"), 1);
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_publish() {
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_millis(200)));
        let (dispatcher, _) = dispatcher(publisher.clone(), Duration::from_secs(10));

        dispatcher.dispatch(Arc::new(sample_order("slow")));

        assert_eq!(dispatcher.in_flight(), 1);
        assert!(publisher.published().is_empty());

        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_absorbed() {
        let publisher = Arc::new(RecordingPublisher::new());
        publisher.set_failing(true);
        let (dispatcher, metrics) = dispatcher(publisher.clone(), Duration::from_secs(10));

        dispatcher.dispatch(Arc::new(sample_order("will-fail")));
        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);

        assert!(publisher.published().is_empty());
        assert_eq!(metrics.publish_count("failure"), 1);
    }

    #[tokio::test]
    async fn test_publish_is_bounded_by_timeout() {
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_secs(5)));
        let (dispatcher, metrics) = dispatcher(publisher.clone(), Duration::from_millis(20));

        dispatcher.dispatch(Arc::new(sample_order("too-slow")));
        assert!(dispatcher.shutdown(Duration::from_secs(2)).await);

        assert!(publisher.published().is_empty());
        assert_eq!(metrics.publish_count("timeout"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_grace_is_bounded() {
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_secs(5)));
        let (dispatcher, _) = dispatcher(publisher.clone(), Duration::from_secs(10));

        dispatcher.dispatch(Arc::new(sample_order("in-flight")));
        let drained = dispatcher.shutdown(Duration::from_millis(20)).await;

        assert!(!drained);
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_dropped() {
        let publisher = Arc::new(RecordingPublisher::new());
        let (dispatcher, metrics) = dispatcher(publisher.clone(), Duration::from_secs(10));

        dispatcher.shutdown(Duration::from_secs(1)).await;
        dispatcher.dispatch(Arc::new(sample_order("late")));

        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(metrics.publish_count("dropped"), 1);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_is_noop() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher = NotificationDispatcher::disabled(metrics);

        dispatcher.dispatch(Arc::new(sample_order("ignored")));

        assert!(!dispatcher.is_enabled());
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.publisher_available().await, None);
        assert!(dispatcher.shutdown(Duration::from_millis(10)).await);
    }
}
