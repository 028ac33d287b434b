//! Id-keyed row cache for association endpoints.
//!
//! An association row refers to its endpoints by id. [`EndpointCache`] keeps
//! loaded endpoints so repeated traversals skip the round trip. Entries live
//! until the owner calls [`EndpointCache::invalidate`] or
//! [`EndpointCache::clear`]; nothing is evicted behind the caller's back.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::Error;
use crate::executor::Executor;
use crate::schema::Entity;
use crate::sql::crud;

pub struct EndpointCache<E> {
    entries: RwLock<HashMap<Uuid, E>>,
}

impl<E> Default for EndpointCache<E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Entity + Clone> EndpointCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached endpoint, without touching the database.
    pub fn get(&self, id: Uuid) -> Option<E> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// The cached endpoint, loading and caching it on a miss. A missing row is
    /// not cached.
    ///
    /// # Errors
    ///
    /// Returns `Error` when the lookup fails.
    pub fn get_or_load(&self, executor: &dyn Executor, id: Uuid) -> Result<Option<E>, Error> {
        if let Some(entity) = self.get(id) {
            return Ok(Some(entity));
        }
        let loaded = crud::get_by_id::<E>(executor, id)?;
        if let Some(entity) = &loaded {
            self.prime(entity.clone());
        }
        Ok(loaded)
    }

    /// Cache an entity already in hand. Entities without an id are ignored.
    pub fn prime(&self, entity: E) {
        if let Some(id) = entity.id() {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, entity);
        }
    }

    /// Drop one entry, e.g. after the row was updated or deleted.
    pub fn invalidate(&self, id: Uuid) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::statement::tests::RecordingExecutor;
    use crate::tests_cfg::Account;

    fn stored(name: &str) -> Account {
        Account::named(name).with_id(Uuid::new_v4())
    }

    #[test]
    fn test_hit_skips_the_database() {
        let cache = EndpointCache::new();
        let alice = stored("alice");
        let id = alice.id.unwrap();
        cache.prime(alice.clone());

        let executor = RecordingExecutor::default();
        assert_eq!(cache.get_or_load(&executor, id).unwrap(), Some(alice));
        assert!(executor.executed.borrow().is_empty());
    }

    #[test]
    fn test_miss_reports_lookup_failure() {
        let cache: EndpointCache<Account> = EndpointCache::new();
        let executor = RecordingExecutor::default();
        assert!(cache.get_or_load(&executor, Uuid::new_v4()).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_is_explicit() {
        let cache = EndpointCache::new();
        let bob = stored("bob");
        let id = bob.id.unwrap();
        cache.prime(bob);
        cache.prime(Account::named("no id yet"));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(id));
        assert!(!cache.invalidate(id));
        assert!(cache.get(id).is_none());

        cache.prime(stored("carol"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
