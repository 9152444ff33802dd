//! JSON file implementation of the bot roster store.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::base::types::{AccountId, Res, Void};

use super::GenericRegistryStore;

/// On-disk shape of the roster: `{"bots": [id, ...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    #[serde(default)]
    bots: Vec<AccountId>,
}

/// Roster persisted as a JSON file.
pub struct JsonRegistryStore {
    path: PathBuf,
}

impl JsonRegistryStore {
    /// Opens the roster at `path`, creating an empty one if it does not exist.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Res<Self> {
        let store = Self { path: path.to_path_buf() };

        if !path.exists() {
            info!("Roster `{}` not found, creating an empty one.", path.display());
            store.save(&HashSet::new())?;
        }

        Ok(store)
    }
}

impl GenericRegistryStore for JsonRegistryStore {
    fn load(&self) -> Res<HashSet<AccountId>> {
        let raw = std::fs::read_to_string(&self.path).with_context(|| format!("Failed to read roster `{}`", self.path.display()))?;
        let roster: RosterFile = serde_json::from_str(&raw).with_context(|| format!("Malformed roster `{}`", self.path.display()))?;

        Ok(roster.bots.into_iter().collect())
    }

    fn save(&self, bots: &HashSet<AccountId>) -> Void {
        let mut bots = bots.iter().copied().collect::<Vec<_>>();
        bots.sort_unstable();

        let raw = serde_json::to_string_pretty(&RosterFile { bots })?;
        std::fs::write(&self.path, raw).with_context(|| format!("Failed to write roster `{}`", self.path.display()))?;

        Ok(())
    }
}

// Tests.
