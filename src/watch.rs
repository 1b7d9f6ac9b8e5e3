//! Fan-out of tracker change events to watch subscribers
//!
//! Subscribers are grouped into buckets keyed by resource and namespace. A
//! bucket is `Idle` while it has no subscribers and `Active` otherwise.
//! Delivery never blocks the publisher: every subscriber owns a bounded
//! buffer, and a subscriber whose buffer is full is terminated with
//! [`Error::WatchOverflow`] instead of stalling the mutating caller.

use crate::selector::ObjectFilter;
use crate::tracker::GVR;
use crate::{Error, Result};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, trace};

/// Buffered events per subscriber unless configured otherwise
pub const DEFAULT_WATCH_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A committed change to one stored object
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<T = Value> {
    pub event_type: EventType,
    /// Snapshot of the object as committed (the removed copy for deletions)
    pub object: T,
    pub resource_version: u64,
}

impl WatchEvent {
    /// Convert the object snapshot into a typed resource
    pub fn decode<K: DeserializeOwned>(self) -> Result<WatchEvent<K>> {
        Ok(WatchEvent {
            event_type: self.event_type,
            object: serde_json::from_value(self.object)?,
            resource_version: self.resource_version,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Idle,
    Active { subscribers: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    resource: GVR,
    namespace: String,
}

impl BucketKey {
    fn new(resource: &GVR, namespace: &str) -> Self {
        Self {
            resource: resource.clone(),
            namespace: namespace.to_string(),
        }
    }
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<WatchEvent>,
    filter: Arc<ObjectFilter>,
    overflowed: Arc<AtomicBool>,
}

type Buckets = HashMap<BucketKey, Vec<Subscriber>>;

#[derive(Default)]
struct Shared {
    buckets: Mutex<Buckets>,
    next_id: AtomicU64,
}

impl Shared {
    fn remove(&self, key: &BucketKey, ids: &[u64]) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = buckets.get_mut(key) {
            subscribers.retain(|s| !ids.contains(&s.id));
            if subscribers.is_empty() {
                buckets.remove(key);
                trace!("watch bucket {:?}/{} is idle", key.resource, key.namespace);
            }
        }
    }
}

/// Per-resource fan-out of watch events
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open a subscription for future events on `resource` in `namespace`
    ///
    /// An empty namespace subscribes to every namespace.
    pub fn subscribe(&self, resource: &GVR, namespace: &str, filter: ObjectFilter) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let overflowed = Arc::new(AtomicBool::new(false));
        let key = BucketKey::new(resource, namespace);

        let subscriber = Subscriber {
            id,
            sender,
            filter: Arc::new(filter),
            overflowed: Arc::clone(&overflowed),
        };
        self.shared
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .push(subscriber);

        debug!("watch {} opened on {:?}/{}", id, resource, namespace);
        Subscription {
            id,
            receiver,
            overflowed,
            overflow_reported: false,
            capacity: self.capacity,
            registration: Some((key, Arc::downgrade(&self.shared))),
        }
    }

    /// Deliver an event to every live subscriber of the object's bucket
    ///
    /// The subscriber list is copied under the bucket lock and delivery runs
    /// after it is released. Events for a namespaced object also reach the
    /// all-namespaces bucket.
    pub fn publish(&self, resource: &GVR, namespace: &str, event: WatchEvent) {
        let targets: Vec<(BucketKey, Subscriber)> = {
            let buckets = self
                .shared
                .buckets
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut keys = vec![BucketKey::new(resource, namespace)];
            if !namespace.is_empty() {
                keys.push(BucketKey::new(resource, ""));
            }
            keys.into_iter()
                .filter_map(|key| buckets.get(&key).map(|subs| (key, subs.clone())))
                .flat_map(|(key, subs)| subs.into_iter().map(move |s| (key.clone(), s)))
                .filter(|(_, s)| s.filter.matches(&event.object))
                .collect()
        };

        let mut dead: HashMap<BucketKey, Vec<u64>> = HashMap::new();
        for (key, subscriber) in targets {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(
                        "watch {} overflowed after {} buffered events, terminating",
                        subscriber.id, self.capacity
                    );
                    subscriber.overflowed.store(true, Ordering::Release);
                    dead.entry(key).or_default().push(subscriber.id);
                }
                Err(TrySendError::Closed(_)) => {
                    dead.entry(key).or_default().push(subscriber.id);
                }
            }
        }

        for (key, ids) in dead {
            self.shared.remove(&key, &ids);
        }
    }

    pub fn state(&self, resource: &GVR, namespace: &str) -> BucketState {
        let buckets = self
            .shared
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match buckets.get(&BucketKey::new(resource, namespace)) {
            Some(subscribers) if !subscribers.is_empty() => BucketState::Active {
                subscribers: subscribers.len(),
            },
            _ => BucketState::Idle,
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_CAPACITY)
    }
}

/// The receiving end of one watch call
///
/// Yields events in publish order until stopped. A subscription terminated
/// by buffer overflow drains what it already buffered and then reports
/// [`Error::WatchOverflow`] once.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<WatchEvent>,
    overflowed: Arc<AtomicBool>,
    overflow_reported: bool,
    capacity: usize,
    registration: Option<(BucketKey, Weak<Shared>)>,
}

impl Subscription {
    /// A subscription fed by hand instead of by a tracker
    ///
    /// Useful in watch reactors that script the exact events a test sees.
    pub fn detached(capacity: usize) -> (mpsc::Sender<WatchEvent>, Subscription) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let subscription = Subscription {
            id: u64::MAX,
            receiver,
            overflowed: Arc::new(AtomicBool::new(false)),
            overflow_reported: false,
            capacity,
            registration: None,
        };
        (sender, subscription)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the subscription is closed
    pub async fn recv(&mut self) -> Option<Result<WatchEvent>> {
        match self.receiver.recv().await {
            Some(event) => Some(Ok(event)),
            None => self.take_overflow().map(Err),
        }
    }

    /// Take a buffered event without waiting
    pub fn try_recv(&mut self) -> Result<Option<WatchEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => match self.take_overflow() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    /// Close the endpoint and leave the bucket
    pub fn stop(&mut self) {
        if let Some((key, shared)) = self.registration.take() {
            if let Some(shared) = shared.upgrade() {
                shared.remove(&key, &[self.id]);
            }
            debug!("watch {} stopped", self.id);
        }
        self.receiver.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.registration.is_none() && self.receiver.is_closed()
    }

    fn take_overflow(&mut self) -> Option<Error> {
        if self.overflowed.load(Ordering::Acquire) && !self.overflow_reported {
            self.overflow_reported = true;
            return Some(Error::WatchOverflow {
                capacity: self.capacity,
            });
        }
        None
    }
}

impl Stream for Subscription {
    type Item = Result<WatchEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => Poll::Ready(this.take_overflow().map(Err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("stopped", &self.registration.is_none())
            .finish()
    }
}
