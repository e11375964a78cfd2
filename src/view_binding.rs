//! View binding: shares one registry between every surface that shows
//! favorite state.
//!
//! [`FavoritesProvider`] is a cheap, cloneable handle to the session's single
//! [`FavoritesRegistry`]. Surfaces read through it, send mutations through
//! it, and subscribe to it for change and advisory events.
//!
//! # Notification contract
//!
//! 1. Subscribers are called synchronously, in registration order.
//! 2. A mutation notifies only after the in-memory change and its
//!    persistence attempt are both done, so a subscriber reading the provider
//!    from inside its callback sees the new state.
//! 3. A storage failure arrives as [`FavoritesEvent::Advisory`] after the
//!    [`FavoritesEvent::Changed`] of the same mutation.
//! 4. A mutation made from inside a callback is delivered after the current
//!    event has reached every subscriber, so each subscriber ends on the
//!    newest state.
//! 5. Dropping a [`Subscription`] removes the callback at once, including
//!    from a delivery cycle in progress.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::error::StoreError;
use crate::favorites_registry::{FavoritesRegistry, MutationOutcome};
use crate::image_record::{FavoritesList, ImageRecord};
use crate::local_store::KeyValueStore;

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoritesEvent {
    /// The favorites changed; carries the new snapshot.
    Changed(FavoritesList),
    /// A non-fatal storage problem the UI may show (toast, log line).
    Advisory(StoreError),
}

type Callback = Rc<dyn Fn(&FavoritesEvent)>;

#[derive(Default)]
struct SubscriberHub {
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
    /// Events published while a delivery cycle runs.
    pending: VecDeque<FavoritesEvent>,
    delivering: bool,
}

impl SubscriberHub {
    fn insert(&mut self, callback: Callback) -> u64 {
        self.next_id += 1;
        self.subscribers.push((self.next_id, callback));
        self.next_id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn callback(&self, id: u64) -> Option<Callback> {
        self.subscribers
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, cb)| Rc::clone(cb))
    }
}

/// Clears the delivering flag even if a callback panics.
struct DeliveryGuard<'a>(&'a RefCell<SubscriberHub>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut hub = self.0.borrow_mut();
        hub.delivering = false;
        hub.pending.clear();
    }
}

/// Handle returned by [`FavoritesProvider::subscribe`].
///
/// The callback stays registered for as long as the handle lives.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    hub: Weak<RefCell<SubscriberHub>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the callback now. Same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.borrow_mut().remove(self.id) {
                debug!("Subscriber {} removed", self.id);
            }
        }
    }
}

/// Shared handle to the session's favorites.
pub struct FavoritesProvider<S> {
    registry: Rc<RefCell<FavoritesRegistry<S>>>,
    hub: Rc<RefCell<SubscriberHub>>,
}

impl<S> Clone for FavoritesProvider<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
            hub: Rc::clone(&self.hub),
        }
    }
}

impl<S: KeyValueStore> FavoritesProvider<S> {
    /// Wraps the session's registry. Construct once per session and hand
    /// clones to every surface.
    pub fn new(registry: FavoritesRegistry<S>) -> Self {
        Self {
            registry: Rc::new(RefCell::new(registry)),
            hub: Rc::new(RefCell::new(SubscriberHub::default())),
        }
    }

    /// Registers `callback` for every subsequent event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FavoritesEvent) + 'static,
    {
        let id = self.hub.borrow_mut().insert(Rc::new(callback));
        debug!("Subscriber {id} registered");
        Subscription {
            id,
            hub: Rc::downgrade(&self.hub),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.borrow().subscribers.len()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.registry.borrow().is_favorite(id)
    }

    pub fn list_favorites(&self) -> FavoritesList {
        self.registry.borrow().list_favorites()
    }

    pub fn favorites_count(&self) -> usize {
        self.registry.borrow().favorites_count()
    }

    /// The problem found in the stored slot at startup, for surfaces that
    /// mount after hydration and want to show it.
    pub fn hydration_advisory(&self) -> Option<StoreError> {
        self.registry.borrow().hydration_issue().cloned()
    }

    pub fn add_favorite(&self, record: ImageRecord) -> MutationOutcome {
        let outcome = self.registry.borrow_mut().add_favorite(record);
        self.publish(&outcome);
        outcome
    }

    pub fn remove_favorite(&self, id: &str) -> MutationOutcome {
        let outcome = self.registry.borrow_mut().remove_favorite(id);
        self.publish(&outcome);
        outcome
    }

    /// Flips the favorite state of `record`; returns the new state and how
    /// the change was stored.
    pub fn toggle_favorite(&self, record: ImageRecord) -> (bool, MutationOutcome) {
        let (is_favorite, outcome) = self.registry.borrow_mut().toggle_favorite(record);
        self.publish(&outcome);
        (is_favorite, outcome)
    }

    /// Runs `f` with read access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&FavoritesRegistry<S>) -> R) -> R {
        f(&self.registry.borrow())
    }

    fn publish(&self, outcome: &MutationOutcome) {
        if !outcome.changed() {
            return;
        }

        let mut events = vec![FavoritesEvent::Changed(self.list_favorites())];
        if let Some(warning) = outcome.warning() {
            warn!("Favorites advisory: {warning}");
            events.push(FavoritesEvent::Advisory(warning.clone()));
        }

        self.deliver(events);
    }

    /// Queues `events` and, unless a delivery cycle is already running
    /// further up the stack, drains the queue.
    ///
    /// A mutation made from inside a callback only queues its events; they
    /// go out once the current event has reached every subscriber, so the
    /// last event each subscriber sees is the newest state.
    fn deliver(&self, events: Vec<FavoritesEvent>) {
        {
            let mut hub = self.hub.borrow_mut();
            hub.pending.extend(events);
            if hub.delivering {
                return;
            }
            hub.delivering = true;
        }
        let _guard = DeliveryGuard(&self.hub);

        loop {
            let Some(event) = self.hub.borrow_mut().pending.pop_front() else {
                break;
            };

            let ids: Vec<u64> = self.hub.borrow().subscribers.iter().map(|(id, _)| *id).collect();
            for id in ids {
                // A subscriber dropped earlier in this cycle is skipped.
                let Some(callback) = self.hub.borrow().callback(id) else {
                    continue;
                };
                callback(&event);
            }
        }
    }
}

/// Favorite indicator for one image, kept current by a subscription.
///
/// This is what a heart button binds to: it never reads storage, only the
/// provider, so it cannot disagree with any other surface.
pub struct FavoriteIndicator {
    id: String,
    lit: Rc<Cell<bool>>,
    _subscription: Subscription,
}

impl FavoriteIndicator {
    pub fn bind<S: KeyValueStore>(provider: &FavoritesProvider<S>, id: impl Into<String>) -> Self {
        let id = id.into();
        let lit = Rc::new(Cell::new(provider.is_favorite(&id)));

        let subscription = provider.subscribe({
            let lit = Rc::clone(&lit);
            let id = id.clone();
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    lit.set(list.contains_id(&id));
                }
            }
        });

        Self {
            id,
            lit,
            _subscription: subscription,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_lit(&self) -> bool {
        self.lit.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites_store::FavoritesStore;
    use crate::local_store::MemoryStore;

    fn provider_over(backend: MemoryStore) -> FavoritesProvider<MemoryStore> {
        let registry = FavoritesRegistry::hydrate(FavoritesStore::new(backend, "favs"), None);
        FavoritesProvider::new(registry)
    }

    #[test]
    fn test_subscribers_called_in_registration_order() {
        let provider = provider_over(MemoryStore::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let _first = provider.subscribe({
            let log = Rc::clone(&log);
            move |_: &FavoritesEvent| log.borrow_mut().push("first")
        });
        let _second = provider.subscribe({
            let log = Rc::clone(&log);
            move |_: &FavoritesEvent| log.borrow_mut().push("second")
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_callback_sees_completed_mutation() {
        let backend = MemoryStore::new();
        let provider = provider_over(backend.clone());
        let seen = Rc::new(RefCell::new(None));

        let _sub = provider.subscribe({
            let provider = provider.clone();
            let backend = backend.clone();
            let seen = Rc::clone(&seen);
            move |_: &FavoritesEvent| {
                let stored = backend.get("favs").unwrap();
                *seen.borrow_mut() = Some((provider.is_favorite("a"), stored));
            }
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        let (favorited, stored) = seen.borrow_mut().take().unwrap();
        assert!(favorited);
        assert_eq!(stored.as_deref(), Some(r#"[{"id":"a","url":"ua"}]"#));
    }

    #[test]
    fn test_noop_mutations_do_not_notify() {
        let provider = provider_over(MemoryStore::new());
        let count = Rc::new(Cell::new(0));
        let _sub = provider.subscribe({
            let count = Rc::clone(&count);
            move |_: &FavoritesEvent| count.set(count.get() + 1)
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        provider.add_favorite(ImageRecord::new("a", "other"));
        provider.remove_favorite("missing");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let provider = provider_over(MemoryStore::new());
        let count = Rc::new(Cell::new(0));
        let sub = provider.subscribe({
            let count = Rc::clone(&count);
            move |_: &FavoritesEvent| count.set(count.get() + 1)
        });
        assert_eq!(provider.subscriber_count(), 1);

        provider.add_favorite(ImageRecord::new("a", "ua"));
        sub.unsubscribe();
        provider.add_favorite(ImageRecord::new("b", "ub"));

        assert_eq!(count.get(), 1);
        assert_eq!(provider.subscriber_count(), 0);
    }

    #[test]
    fn test_storage_failure_is_advisory() {
        let backend = MemoryStore::new();
        let provider = provider_over(backend.clone());
        backend.disable();

        let events = Rc::new(RefCell::new(Vec::new()));
        let _sub = provider.subscribe({
            let events = Rc::clone(&events);
            move |event: &FavoritesEvent| events.borrow_mut().push(event.clone())
        });

        let outcome = provider.add_favorite(ImageRecord::new("a", "ua"));
        assert!(matches!(outcome, MutationOutcome::InMemoryOnly(StoreError::StorageUnavailable(_))));
        assert!(provider.is_favorite("a"));

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], FavoritesEvent::Changed(list) if list.contains_id("a")));
        assert!(matches!(&events[1], FavoritesEvent::Advisory(StoreError::StorageUnavailable(_))));
    }

    #[test]
    fn test_indicators_agree_across_surfaces() {
        let provider = provider_over(MemoryStore::new());
        let header_heart = FavoriteIndicator::bind(&provider, "a");
        let gallery_heart = FavoriteIndicator::bind(&provider.clone(), "a");

        provider.toggle_favorite(ImageRecord::new("a", "ua"));
        assert!(header_heart.is_lit());
        assert!(gallery_heart.is_lit());

        provider.clone().remove_favorite("a");
        assert!(!header_heart.is_lit());
        assert!(!gallery_heart.is_lit());
    }

    #[test]
    fn test_callback_may_mutate_reentrantly() {
        let provider = provider_over(MemoryStore::new());
        let _sub = provider.subscribe({
            let provider = provider.clone();
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    // mirror "a" into "a-copy" once
                    if list.contains_id("a") && !list.contains_id("a-copy") {
                        provider.add_favorite(ImageRecord::new("a-copy", "ua"));
                    }
                }
            }
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        assert_eq!(provider.list_favorites().ids().collect::<Vec<_>>(), vec!["a", "a-copy"]);
    }

    #[test]
    fn test_later_subscribers_end_on_reentrant_change() {
        let provider = provider_over(MemoryStore::new());
        let _mirror = provider.subscribe({
            let provider = provider.clone();
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    if list.contains_id("a") && !list.contains_id("a-copy") {
                        provider.add_favorite(ImageRecord::new("a-copy", "ua"));
                    }
                }
            }
        });
        let copy_heart = FavoriteIndicator::bind(&provider, "a-copy");

        let last_seen = Rc::new(RefCell::new(None));
        let _gallery = provider.subscribe({
            let last_seen = Rc::clone(&last_seen);
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    *last_seen.borrow_mut() = Some(list.clone());
                }
            }
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));

        assert!(provider.is_favorite("a-copy"));
        assert!(copy_heart.is_lit());
        assert_eq!(last_seen.borrow().as_ref(), Some(&provider.list_favorites()));
    }

    #[test]
    fn test_events_arrive_in_mutation_order() {
        let provider = provider_over(MemoryStore::new());
        let _mirror = provider.subscribe({
            let provider = provider.clone();
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    if list.contains_id("a") && !list.contains_id("b") {
                        provider.add_favorite(ImageRecord::new("b", "ub"));
                    }
                }
            }
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let _log = provider.subscribe({
            let seen = Rc::clone(&seen);
            move |event: &FavoritesEvent| {
                if let FavoritesEvent::Changed(list) = event {
                    seen.borrow_mut().push(list.ids().map(str::to_string).collect::<Vec<_>>());
                }
            }
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        assert_eq!(*seen.borrow(), vec![vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_unsubscribe_during_delivery_skips_callback() {
        let provider = provider_over(MemoryStore::new());
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _killer = provider.subscribe({
            let victim = Rc::clone(&victim);
            move |_: &FavoritesEvent| {
                victim.borrow_mut().take();
            }
        });

        let calls = Rc::new(Cell::new(0));
        *victim.borrow_mut() = Some(provider.subscribe({
            let calls = Rc::clone(&calls);
            move |_: &FavoritesEvent| calls.set(calls.get() + 1)
        }));

        provider.add_favorite(ImageRecord::new("a", "ua"));
        assert_eq!(calls.get(), 0);
        assert_eq!(provider.subscriber_count(), 1);
    }

    #[test]
    fn test_subscribe_during_delivery_joins_next_event() {
        let provider = provider_over(MemoryStore::new());
        let late: Rc<RefCell<Option<FavoriteIndicator>>> = Rc::new(RefCell::new(None));

        let _mount = provider.subscribe({
            let provider = provider.clone();
            let late = Rc::clone(&late);
            move |_: &FavoritesEvent| {
                if late.borrow().is_none() {
                    *late.borrow_mut() = Some(FavoriteIndicator::bind(&provider, "b"));
                }
            }
        });

        provider.add_favorite(ImageRecord::new("a", "ua"));
        assert!(!late.borrow().as_ref().map(FavoriteIndicator::is_lit).unwrap_or(true));

        provider.add_favorite(ImageRecord::new("b", "ub"));
        assert!(late.borrow().as_ref().map(FavoriteIndicator::is_lit).unwrap_or(false));
    }

    #[test]
    fn test_toggle_reports_storage_outcome() {
        let backend = MemoryStore::new();
        let provider = provider_over(backend.clone());

        let (lit, outcome) = provider.toggle_favorite(ImageRecord::new("a", "ua"));
        assert!(lit);
        assert_eq!(outcome, MutationOutcome::Persisted);

        backend.disable();
        let (lit, outcome) = provider.toggle_favorite(ImageRecord::new("a", "ua"));
        assert!(!lit);
        assert!(matches!(outcome, MutationOutcome::InMemoryOnly(StoreError::StorageUnavailable(_))));
    }
}
