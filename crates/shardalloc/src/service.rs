//! Allocation entry point used by transports.

use crate::{
    assignment::Assignment,
    config::AddressSpaceConfig,
    error::{Error, Result},
    store::SeedStore,
};
use std::sync::Arc;

/// Hands out one durable assignment per seed.
///
/// Cheap to clone; all clones share the same [`SeedStore`] and therefore the
/// same writer lock.
///
/// # Example
/// ```
/// use shardalloc::{AddressSpaceConfig, AllocationService, SeedStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap();
/// let service = AllocationService::new(SeedStore::new(dir.path().join("seeds.db"), config));
///
/// assert_eq!(service.allocate("node-a").unwrap().to_string(), "-6 0 4");
/// assert_eq!(service.allocate("node-b").unwrap().to_string(), "-3 0 4");
/// assert_eq!(service.allocate("node-a").unwrap().to_string(), "-6 0 4");
/// ```
#[derive(Clone, Debug)]
pub struct AllocationService {
    store: Arc<SeedStore>,
}

impl AllocationService {
    pub fn new(store: SeedStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn config(&self) -> &AddressSpaceConfig {
        self.store.config()
    }

    pub fn store(&self) -> &SeedStore {
        &self.store
    }

    /// Returns the assignment for `seed`, creating it on first use.
    ///
    /// This call performs blocking file I/O; async callers should run it on a
    /// blocking thread.
    ///
    /// # Errors
    ///
    /// [`Error::EmptySeed`] for an empty seed, without touching the store.
    /// Otherwise any error from [`SeedStore::record_if_absent`].
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub fn allocate(&self, seed: &str) -> Result<Assignment> {
        if seed.is_empty() {
            return Err(Error::EmptySeed);
        }
        self.store.record_if_absent(seed)
    }

    /// Looks up an assignment without creating one.
    pub fn lookup(&self, seed: &str) -> Result<Option<Assignment>> {
        if seed.is_empty() {
            return Err(Error::EmptySeed);
        }
        self.store.get(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> AllocationService {
        let config = AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap();
        AllocationService::new(SeedStore::new(dir.path().join("seeds.db"), config))
    }

    #[test]
    fn empty_seed_is_rejected_without_touching_the_store() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service.allocate("").unwrap_err();
        assert!(matches!(err, Error::EmptySeed));
        assert!(err.is_client_error());
        assert!(matches!(service.lookup(""), Err(Error::EmptySeed)));
        assert!(!service.store().path().exists());
    }

    #[test]
    fn clones_share_one_store() {
        let dir = TempDir::new().unwrap();
        let a = service(&dir);
        let b = a.clone();

        assert_eq!(a.allocate("node-a").unwrap().anchor(), -6);
        assert_eq!(b.allocate("node-b").unwrap().anchor(), -3);
        assert_eq!(b.lookup("node-a").unwrap().unwrap().anchor(), -6);
        assert_eq!(a.lookup("node-c").unwrap(), None);
    }

    #[test]
    fn whitespace_seed_is_an_ordinary_seed() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert_eq!(service.allocate(" ").unwrap().to_string(), "-6 0 4");
    }
}
