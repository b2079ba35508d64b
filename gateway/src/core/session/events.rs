//! Per-session fan-out of content events to subscribers.
//!
//! Each subscriber gets its own bounded queue. Events are delivered in the
//! order they are published; a full queue suspends the publisher, so a slow
//! subscriber slows its own session and nobody else. Subscribers whose
//! receiver has been dropped are pruned on the next publish.
//!
//! The events that end a session never go through the queue. [`EventBus::finish`]
//! parks them in each subscription's tail, which `recv` yields once the queued
//! events have drained, so a subscriber that fell behind still sees them.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::codec::{ContentEvent, EventKind};

/// Handle identifying a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<ContentEvent>,
    tail: Arc<Mutex<VecDeque<ContentEvent>>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the session is closed or the subscription removed.
    pub async fn recv(&mut self) -> Option<ContentEvent> {
        match self.rx.recv().await {
            Some(event) => Some(event),
            None => self.tail.lock().pop_front(),
        }
    }

    pub fn try_recv(&mut self) -> Option<ContentEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Disconnected) => self.tail.lock().pop_front(),
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    /// `None` means every kind
    kinds: Option<HashSet<EventKind>>,
    tx: mpsc::Sender<ContentEvent>,
    tail: Arc<Mutex<VecDeque<ContentEvent>>>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: Vec<Subscriber>,
    closed: bool,
}

pub struct EventBus {
    inner: Mutex<BusInner>,
    next_id: AtomicU64,
    buffer: usize,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner::default()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register interest in `kinds`; an empty slice subscribes to every kind.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        let tail = Arc::new(Mutex::new(VecDeque::new()));

        let mut inner = self.inner.lock();
        if !inner.closed {
            let kinds = (!kinds.is_empty()).then(|| kinds.iter().copied().collect());
            inner.subscribers.push(Subscriber {
                id,
                kinds,
                tx,
                tail: Arc::clone(&tail),
            });
        }
        // on a closed bus the sender is dropped here and the receiver ends at once

        Subscription { id, rx, tail }
    }

    /// Remove a subscription. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        before != inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn targets(&self, kind: EventKind) -> Vec<(SubscriptionId, mpsc::Sender<ContentEvent>)> {
        self.inner
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.wants(kind))
            .map(|s| (s.id, s.tx.clone()))
            .collect()
    }

    fn prune(&self, gone: &[SubscriptionId]) {
        if gone.is_empty() {
            return;
        }
        debug!("Pruning {} dropped subscriber(s)", gone.len());
        self.inner
            .lock()
            .subscribers
            .retain(|s| !gone.contains(&s.id));
    }

    /// Deliver `event` to every interested subscriber, waiting for queue space.
    pub async fn publish(&self, event: ContentEvent) {
        let targets = self.targets(event.kind());
        let mut gone = Vec::new();
        for (id, tx) in targets {
            if tx.send(event.clone()).await.is_err() {
                gone.push(id);
            }
        }
        self.prune(&gone);
    }

    /// Deliver `event` without waiting; subscribers with a full queue miss it.
    pub fn publish_now(&self, event: ContentEvent) {
        let targets = self.targets(event.kind());
        let mut gone = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber queue full, dropping {} event", event.kind());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(id),
            }
        }
        self.prune(&gone);
    }

    /// Close the bus. Each subscriber receives whatever is still queued,
    /// then the `last` events it subscribed to, then the end of the stream.
    pub fn finish(&self, last: &[ContentEvent]) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for subscriber in inner.subscribers.drain(..) {
            subscriber
                .tail
                .lock()
                .extend(last.iter().filter(|e| subscriber.wants(e.kind())).cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> ContentEvent {
        ContentEvent::TextOutput {
            content_id: "c-1".into(),
            role: crate::core::codec::Role::Assistant,
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn test_delivers_in_publish_order() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[]);
        for word in ["one", "two", "three"] {
            bus.publish(text(word)).await;
        }
        for word in ["one", "two", "three"] {
            assert_eq!(sub.recv().await.unwrap(), text(word));
        }
    }

    #[tokio::test]
    async fn test_filters_by_kind() {
        let bus = EventBus::new(8);
        let mut errors = bus.subscribe(&[EventKind::Error]);
        let mut all = bus.subscribe(&[]);

        bus.publish(text("hello")).await;
        bus.publish(ContentEvent::error("boom", None)).await;

        assert_eq!(errors.recv().await.unwrap().kind(), EventKind::Error);
        assert!(errors.try_recv().is_none());
        assert_eq!(all.recv().await.unwrap().kind(), EventKind::TextOutput);
        assert_eq!(all.recv().await.unwrap().kind(), EventKind::Error);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[]);
        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));
        bus.publish(text("late")).await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe(&[]);
        let _kept = bus.subscribe(&[]);
        drop(sub);
        bus.publish(text("x")).await;
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_drains_then_ends() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[]);
        bus.publish(text("queued")).await;
        bus.finish(&[ContentEvent::StreamComplete]);
        assert_eq!(sub.recv().await, Some(text("queued")));
        assert_eq!(sub.recv().await, Some(ContentEvent::StreamComplete));
        assert!(sub.recv().await.is_none());

        let mut late = bus.subscribe(&[]);
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_finish_reaches_subscriber_with_full_queue() {
        let bus = EventBus::new(2);
        let mut all = bus.subscribe(&[]);
        let mut errors = bus.subscribe(&[EventKind::Error]);
        bus.publish(text("one")).await;
        bus.publish(text("two")).await;

        bus.finish(&[
            ContentEvent::error("upstream gone", Some("upstream_channel_failure".into())),
            ContentEvent::StreamComplete,
        ]);
        bus.finish(&[ContentEvent::StreamComplete]);

        let mut kinds = Vec::new();
        while let Some(event) = all.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::TextOutput,
                EventKind::TextOutput,
                EventKind::Error,
                EventKind::StreamComplete,
            ]
        );

        assert_eq!(errors.try_recv().map(|e| e.kind()), Some(EventKind::Error));
        assert!(errors.try_recv().is_none());
    }

    #[test]
    fn test_publish_now_drops_when_full() {
        let bus = EventBus::new(1);
        let mut sub = bus.subscribe(&[]);
        bus.publish_now(text("first"));
        bus.publish_now(text("second"));
        assert_eq!(sub.try_recv(), Some(text("first")));
        assert!(sub.try_recv().is_none());
    }
}
