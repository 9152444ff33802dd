use std::{collections::HashSet, sync::Arc};

use crate::base::types::GroupId;

/// Decides which groups are monitored.
///
/// An empty allow-set monitors every group.
#[derive(Debug, Clone, Default)]
pub struct GroupScope {
    enabled: Arc<HashSet<GroupId>>,
}

impl GroupScope {
    pub fn new(enabled: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            enabled: Arc::new(enabled.into_iter().collect()),
        }
    }

    pub fn is_enabled(&self, group_id: GroupId) -> bool {
        self.enabled.is_empty() || self.enabled.contains(&group_id)
    }
}
