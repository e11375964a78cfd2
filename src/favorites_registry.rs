//! The favorites registry: the session's single source of truth for which
//! images are favorited.
//!
//! The registry keeps the ordered list of favorites together with an id
//! index, mirrors every mutation to the [`FavoritesStore`], and never lets a
//! storage failure undo a mutation. Consumers receive read-only
//! [`FavoritesList`] snapshots.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::error::StoreError;
use crate::favorites_store::FavoritesStore;
use crate::image_record::{FavoritesList, ImageRecord};
use crate::local_store::KeyValueStore;

/// What a mutation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Nothing changed (duplicate add, remove of an unknown id).
    Unchanged,
    /// The list changed and the slot holds the new list.
    Persisted,
    /// The list changed in memory but could not be written. The in-memory
    /// list stays authoritative for the rest of the session.
    InMemoryOnly(StoreError),
}

impl MutationOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, MutationOutcome::Unchanged)
    }

    /// The storage failure to surface as an advisory, if any.
    pub fn warning(&self) -> Option<&StoreError> {
        match self {
            MutationOutcome::InMemoryOnly(e) => Some(e),
            _ => None,
        }
    }
}

/// In-memory favorites backed by a persistent slot.
pub struct FavoritesRegistry<S> {
    store: FavoritesStore<S>,
    records: Vec<ImageRecord>,
    ids: HashSet<String>,
    snapshot: FavoritesList,
    max_favorites: Option<usize>,
    hydration_issue: Option<StoreError>,
}

impl<S: KeyValueStore> FavoritesRegistry<S> {
    /// Builds the registry from whatever the slot holds.
    ///
    /// A missing, corrupt or unreadable slot yields an empty registry; the
    /// reason is kept in [`hydration_issue`](Self::hydration_issue). Stored
    /// duplicates are dropped (first occurrence wins). `max_favorites` of
    /// `Some(0)` is treated as unbounded.
    pub fn hydrate(store: FavoritesStore<S>, max_favorites: Option<usize>) -> Self {
        let hydrated = store.load_or_recover();

        let mut registry = Self {
            store,
            records: Vec::with_capacity(hydrated.records.len()),
            ids: HashSet::with_capacity(hydrated.records.len()),
            snapshot: FavoritesList::empty(),
            max_favorites: max_favorites.filter(|&max| max > 0),
            hydration_issue: hydrated.issue,
        };

        for record in hydrated.records {
            if registry.ids.insert(record.id.clone()) {
                registry.records.push(record);
            } else {
                warn!("Dropping duplicate stored favorite '{}'", record.id);
            }
        }

        // A lowered cap trims in memory only; the slot is rewritten on the
        // next mutation.
        registry.enforce_cap();
        registry.refresh_snapshot();

        info!(
            "Favorites registry hydrated from '{}' with {} record(s)",
            registry.store.key(),
            registry.records.len()
        );

        registry
    }

    /// Whether an image with `id` is currently favorited.
    pub fn is_favorite(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Appends `record` unless its id is already a favorite.
    ///
    /// Identity is the id alone: a second add with the same id and different
    /// metadata is a no-op and the first copy is kept.
    pub fn add_favorite(&mut self, record: ImageRecord) -> MutationOutcome {
        if self.is_favorite(&record.id) {
            debug!("Favorite '{}' already present", record.id);
            return MutationOutcome::Unchanged;
        }

        debug!("Adding favorite '{}'", record.id);
        self.ids.insert(record.id.clone());
        self.records.push(record);
        self.enforce_cap();
        self.commit()
    }

    /// Removes the favorite with `id`, keeping the order of the rest.
    pub fn remove_favorite(&mut self, id: &str) -> MutationOutcome {
        if !self.ids.remove(id) {
            debug!("Favorite '{id}' not present, nothing to remove");
            return MutationOutcome::Unchanged;
        }

        debug!("Removing favorite '{id}'");
        self.records.retain(|r| r.id != id);
        self.commit()
    }

    /// Flips the favorite state of `record` and returns the new state.
    pub fn toggle_favorite(&mut self, record: ImageRecord) -> (bool, MutationOutcome) {
        if self.is_favorite(&record.id) {
            (false, self.remove_favorite(&record.id))
        } else {
            let id = record.id.clone();
            let outcome = self.add_favorite(record);
            (self.is_favorite(&id), outcome)
        }
    }

    /// Snapshot of the current favorites in insertion order.
    pub fn list_favorites(&self) -> FavoritesList {
        self.snapshot.clone()
    }

    pub fn favorites_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Why the stored slot was not used at startup, if it was not.
    pub fn hydration_issue(&self) -> Option<&StoreError> {
        self.hydration_issue.as_ref()
    }

    pub fn max_favorites(&self) -> Option<usize> {
        self.max_favorites
    }

    pub fn store(&self) -> &FavoritesStore<S> {
        &self.store
    }

    fn enforce_cap(&mut self) {
        let Some(max) = self.max_favorites else {
            return;
        };

        if self.records.len() <= max {
            return;
        }

        let overflow = self.records.len() - max;
        for evicted in self.records.drain(..overflow) {
            info!("Evicting oldest favorite '{}' (cap {max})", evicted.id);
            self.ids.remove(&evicted.id);
        }
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot = FavoritesList::from(self.records.clone());
    }

    fn commit(&mut self) -> MutationOutcome {
        self.refresh_snapshot();

        match self.store.save(&self.records) {
            Ok(()) => MutationOutcome::Persisted,
            Err(e) => {
                warn!("Favorites kept in memory only: {e}");
                MutationOutcome::InMemoryOnly(e)
            }
        }
    }
}
