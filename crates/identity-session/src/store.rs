//! Observable single-slot state store.
//!
//! The store keeps the latest snapshot of some state `S` and fans every
//! change out to its subscribers synchronously, in registration order.
//!
//! Fan-out iterates a copy of the subscriber list. Each subscription carries
//! a liveness flag that is cleared on unsubscribe, so a listener removed in
//! the middle of a broadcast (by itself or by an earlier listener) is never
//! called again, and the remaining listeners are neither skipped nor called
//! twice.
//!
//! Broadcasts are serialized by a re-entrant lock: two updates never
//! interleave their notifications, while a listener may still read the
//! state, subscribe, unsubscribe, or even update from inside its callback.

use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identity of a registered listener.
pub type SubscriptionId = u64;

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Entry<S> {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    listener: Listener<S>,
}

struct Registry<S> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<S>>>,
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: SubscriptionId);
}

impl<S: 'static> Unsubscribe for Registry<S> {
    fn remove(&self, id: SubscriptionId) {
        self.entries.lock().retain(|entry| entry.id != id);
    }
}

/// Handle returned by [`StateStore::subscribe`].
///
/// Dropping the handle unsubscribes. [`Subscription::unsubscribe`] is
/// idempotent and safe to call from inside a notification.
pub struct Subscription {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Identity of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns true until the subscription is removed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Single writable slot with synchronous fan-out to subscribers.
pub struct StateStore<S> {
    state: Mutex<S>,
    registry: Arc<Registry<S>>,
    broadcast: ReentrantMutex<()>,
}

impl<S> StateStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a store holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
            broadcast: ReentrantMutex::new(()),
        }
    }

    /// Copy of the current state.
    pub fn get(&self) -> S {
        self.state.lock().clone()
    }

    /// Register `listener` and deliver the current state to it before
    /// returning.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let _broadcast = self.broadcast.lock();

        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));
        let listener: Listener<S> = Arc::new(listener);

        self.registry.entries.lock().push(Entry {
            id,
            active: active.clone(),
            listener: listener.clone(),
        });

        let registry: Arc<dyn Unsubscribe> = self.registry.clone();
        let subscription = Subscription {
            id,
            active,
            registry: Arc::downgrade(&registry),
        };

        let current = self.get();
        listener(&current);

        subscription
    }

    /// Apply `mutate` to the state and notify every live subscriber with
    /// the resulting snapshot. Returns that snapshot.
    pub fn update<F>(&self, mutate: F) -> S
    where
        F: FnOnce(&mut S),
    {
        let _broadcast = self.broadcast.lock();

        let snapshot = {
            let mut state = self.state.lock();
            mutate(&mut state);
            state.clone()
        };

        let listeners: Vec<(Arc<AtomicBool>, Listener<S>)> = self
            .registry
            .entries
            .lock()
            .iter()
            .map(|entry| (entry.active.clone(), entry.listener.clone()))
            .collect();

        for (active, listener) in listeners {
            if active.load(Ordering::SeqCst) {
                listener(&snapshot);
            }
        }

        snapshot
    }

    /// Replace the state wholesale and notify subscribers.
    pub fn replace(&self, next: S) -> S {
        self.update(move |state| *state = next)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.entries.lock().len()
    }
}

impl<S> Default for StateStore<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<u32>>>, impl Fn(&u32) + Send + Sync + 'static) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: &u32| sink.lock().unwrap().push(*value))
    }

    #[test]
    fn test_subscribe_delivers_current_state_once() {
        let store = StateStore::new(7u32);
        let (seen, listener) = recorder();

        let _sub = store.subscribe(listener);

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_update_notifies_in_registration_order() {
        let store = StateStore::new(0u32);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let subs: Vec<Subscription> = (0..3)
            .map(|n| {
                let order = order.clone();
                store.subscribe(move |value: &u32| {
                    if *value > 0 {
                        order.lock().unwrap().push(n);
                    }
                })
            })
            .collect();

        store.update(|value| *value = 1);

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = StateStore::new(0u32);
        let (seen, listener) = recorder();

        let sub = store.subscribe(listener);
        store.replace(1);
        sub.unsubscribe();
        sub.unsubscribe();
        store.replace(2);

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(store.subscriber_count(), 0);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let store = StateStore::new(0u32);
        let (seen, listener) = recorder();

        drop(store.subscribe(listener));
        store.replace(5);

        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_self_unsubscribe_during_broadcast_skips_nobody() {
        let store = StateStore::new(0u32);
        let (first_seen, first) = recorder();
        let (third_seen, third) = recorder();

        let _first = store.subscribe(first);

        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));
        let second_calls = Arc::new(AtomicU64::new(0));
        let second = {
            let slot = slot.clone();
            let calls = second_calls.clone();
            store.subscribe(move |value: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                if *value == 1 {
                    if let Some(sub) = slot.lock().unwrap().take() {
                        sub.unsubscribe();
                    }
                }
            })
        };
        *slot.lock().unwrap() = Some(second);

        let _third = store.subscribe(third);

        store.replace(1);
        store.replace(2);

        assert_eq!(*first_seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(*third_seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_removed_by_earlier_listener_is_not_called() {
        let store = StateStore::new(0u32);
        let victim_slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));

        let _killer = {
            let slot = victim_slot.clone();
            store.subscribe(move |value: &u32| {
                if *value == 1 {
                    if let Some(sub) = slot.lock().unwrap().as_ref() {
                        sub.unsubscribe();
                    }
                }
            })
        };

        let (victim_seen, victim) = recorder();
        *victim_slot.lock().unwrap() = Some(store.subscribe(victim));

        store.replace(1);

        assert_eq!(*victim_seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_listener_can_read_and_subscribe_reentrantly() {
        let store = Arc::new(StateStore::new(0u32));
        let nested: Arc<StdMutex<Vec<Subscription>>> = Arc::new(StdMutex::new(Vec::new()));
        let reads = Arc::new(StdMutex::new(Vec::new()));

        let _outer = {
            let inner_store = store.clone();
            let nested = nested.clone();
            let reads = reads.clone();
            store.subscribe(move |value: &u32| {
                reads.lock().unwrap().push(inner_store.get());
                if *value == 1 {
                    let sub = inner_store.subscribe(|_| {});
                    nested.lock().unwrap().push(sub);
                }
            })
        };

        store.replace(1);

        assert_eq!(*reads.lock().unwrap(), vec![0, 1]);
        assert_eq!(store.subscriber_count(), 2);
    }

    #[test]
    fn test_update_returns_snapshot() {
        let store: StateStore<Vec<u8>> = StateStore::default();
        let snapshot = store.update(|v| v.push(3));
        assert_eq!(snapshot, vec![3]);
        assert_eq!(store.get(), vec![3]);
    }
}
