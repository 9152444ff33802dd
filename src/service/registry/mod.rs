use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{error, info};

use crate::base::types::{AccountId, Res, Void};

pub mod json;

// Traits.

/// Generic persistence trait that roster stores must implement.
///
/// The registry keeps the authoritative set in memory and writes the whole
/// set through this store on every mutation.
pub trait GenericRegistryStore: Send + Sync + 'static {
    /// Loads the persisted roster.
    fn load(&self) -> Res<HashSet<AccountId>>;

    /// Replaces the persisted roster.
    fn save(&self, bots: &HashSet<AccountId>) -> Void;
}

/// Store that keeps nothing, for rosters that live only in memory.
pub struct MemoryRegistryStore;

impl GenericRegistryStore for MemoryRegistryStore {
    fn load(&self) -> Res<HashSet<AccountId>> {
        Ok(HashSet::new())
    }

    fn save(&self, _bots: &HashSet<AccountId>) -> Void {
        Ok(())
    }
}

// Structs.

/// The set of accounts classified as monitored bots.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct BotRegistry {
    bots: Arc<RwLock<HashSet<AccountId>>>,
    store: Arc<dyn GenericRegistryStore>,
}

impl BotRegistry {
    /// Creates a registry from the contents of `store`.
    pub fn new(store: Arc<dyn GenericRegistryStore>) -> Res<Self> {
        let bots = store.load()?;

        info!("Loaded {} monitored bots.", bots.len());

        Ok(Self {
            bots: Arc::new(RwLock::new(bots)),
            store,
        })
    }

    /// Creates a registry backed by the JSON roster at `path`.
    pub fn json(path: &Path) -> Res<Self> {
        Self::new(Arc::new(json::JsonRegistryStore::open(path)?))
    }

    /// Creates a registry that is never persisted.
    pub fn in_memory(bots: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            bots: Arc::new(RwLock::new(bots.into_iter().collect())),
            store: Arc::new(MemoryRegistryStore),
        }
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.bots.read().unwrap_or_else(PoisonError::into_inner).contains(&id)
    }

    /// Adds `id`; returns `true` iff it was not already present.
    pub fn add(&self, id: AccountId) -> bool {
        let mut bots = self.bots.write().unwrap_or_else(PoisonError::into_inner);

        if !bots.insert(id) {
            return false;
        }

        self.persist(&bots);
        true
    }

    /// Removes `id`; returns `true` iff it was present.
    pub fn remove(&self, id: AccountId) -> bool {
        let mut bots = self.bots.write().unwrap_or_else(PoisonError::into_inner);

        if !bots.remove(&id) {
            return false;
        }

        self.persist(&bots);
        true
    }

    /// Lists the roster in ascending order.
    pub fn list(&self) -> Vec<AccountId> {
        let mut bots = self.bots.read().unwrap_or_else(PoisonError::into_inner).iter().copied().collect::<Vec<_>>();
        bots.sort_unstable();
        bots
    }

    fn persist(&self, bots: &HashSet<AccountId>) {
        if let Err(err) = self.store.save(bots) {
            error!("Failed to persist the bot roster: {}", err);
        }
    }
}

// Tests.
