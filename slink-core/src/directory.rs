// ABOUTME: In-memory mirror of the workspace directory (channels, groups, users)
// ABOUTME: Wholesale per-category refresh, name resolution and ID lookup

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::metrics;
use crate::ready::{ReadySignal, Readiness};
use crate::traits::{EntityKind, EntityRecord, Transport};

/// Immutable snapshot of one category, keyed by entity ID
pub type Snapshot = Arc<HashMap<String, EntityRecord>>;

/// One category of the directory.
///
/// Readers clone the `Arc` under a short read lock, so they always hold a
/// complete snapshot; refresh builds the next map off-lock and swaps it in.
#[derive(Debug, Default)]
struct Category {
    snapshot: RwLock<Snapshot>,
    /// Set after the first successful fetch of this category
    populated: AtomicBool,
}

impl Category {
    fn load(&self) -> Snapshot {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    fn replace(&self, records: Vec<EntityRecord>) -> usize {
        let next: HashMap<String, EntityRecord> = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        let size = next.len();
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        self.populated.store(true, Ordering::Release);
        size
    }

    fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }
}

/// Per-category entity counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryCounts {
    pub channels: usize,
    pub groups: usize,
    pub users: usize,
}

/// Outcome of a refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Categories whose query failed; their previous snapshot was kept
    pub failed: Vec<EntityKind>,
    /// Whether this refresh fired the readiness signal
    pub became_ready: bool,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cache of the remote workspace's addressable entities.
///
/// Shared as `Arc<DirectoryCache>` between the supervisor (sole writer) and
/// any number of readers.
#[derive(Debug)]
pub struct DirectoryCache {
    channels: Category,
    groups: Category,
    users: Category,
    ready: ReadySignal,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            channels: Category::default(),
            groups: Category::default(),
            users: Category::default(),
            ready: ReadySignal::new(),
        }
    }

    fn category(&self, kind: EntityKind) -> &Category {
        match kind {
            EntityKind::PublicChannel => &self.channels,
            EntityKind::PrivateGroup => &self.groups,
            EntityKind::DirectUser => &self.users,
        }
    }

    /// Re-query every category and replace each wholesale.
    ///
    /// A failed category keeps its previous snapshot. The readiness signal
    /// fires once, when every category has been fetched successfully at
    /// least once.
    pub async fn refresh(&self, transport: &dyn Transport) -> RefreshReport {
        let (channels, groups, users) = tokio::join!(
            transport.query_channels(),
            transport.query_groups(),
            transport.query_users(),
        );

        let mut report = RefreshReport::default();
        for (kind, result) in [
            (EntityKind::PublicChannel, channels),
            (EntityKind::PrivateGroup, groups),
            (EntityKind::DirectUser, users),
        ] {
            if !self.apply(kind, result) {
                report.failed.push(kind);
            }
        }

        if self.is_fully_populated() {
            report.became_ready = self.ready.fire();
            if report.became_ready {
                let counts = self.counts();
                tracing::info!(
                    channels = counts.channels,
                    groups = counts.groups,
                    users = counts.users,
                    "Directory populated"
                );
            }
        }

        report
    }

    fn apply(&self, kind: EntityKind, result: Result<Vec<EntityRecord>>) -> bool {
        match result {
            Ok(records) => {
                let size = self.category(kind).replace(records);
                tracing::debug!(category = %kind, size, "Directory category refreshed");
                metrics::record_refresh(kind.as_str(), true);
                metrics::set_directory_size(kind.as_str(), size);
                true
            }
            Err(e) => {
                tracing::warn!(
                    category = %kind,
                    error = %e,
                    "Directory query failed, keeping previous snapshot"
                );
                metrics::record_refresh(kind.as_str(), false);
                false
            }
        }
    }

    fn is_fully_populated(&self) -> bool {
        self.channels.is_populated() && self.groups.is_populated() && self.users.is_populated()
    }

    /// Resolve a display name to a routing ID.
    ///
    /// Searches channels, then groups, then users; the first category with a
    /// match wins. If several entities in one category share the name, which
    /// one is returned is undefined.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        [
            EntityKind::PublicChannel,
            EntityKind::PrivateGroup,
            EntityKind::DirectUser,
        ]
        .into_iter()
        .find_map(|kind| {
            self.category(kind)
                .load()
                .values()
                .find(|record| record.name == name)
                .map(|record| record.id.clone())
        })
    }

    /// Look up an entity by ID across channels, groups and users
    pub fn lookup(&self, id: &str) -> Option<EntityRecord> {
        [
            EntityKind::PublicChannel,
            EntityKind::PrivateGroup,
            EntityKind::DirectUser,
        ]
        .into_iter()
        .find_map(|kind| self.category(kind).load().get(id).cloned())
    }

    pub fn lookup_user(&self, id: &str) -> Option<EntityRecord> {
        self.users.load().get(id).cloned()
    }

    /// Current snapshot of one category
    pub fn snapshot(&self, kind: EntityKind) -> Snapshot {
        self.category(kind).load()
    }

    pub fn counts(&self) -> DirectoryCounts {
        DirectoryCounts {
            channels: self.channels.load().len(),
            groups: self.groups.load().len(),
            users: self.users.load().len(),
        }
    }

    /// Handle that observes the one-shot "first population complete" signal
    pub fn readiness(&self) -> Readiness {
        self.ready.readiness()
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cache_is_empty_and_not_ready() {
        let cache = DirectoryCache::new();
        assert_eq!(cache.counts(), DirectoryCounts::default());
        assert!(!cache.readiness().is_ready());
        assert!(cache.resolve_name("general").is_none());
    }

    #[test]
    fn test_category_replace_is_wholesale() {
        let category = Category::default();
        category.replace(vec![
            EntityRecord::channel("C1", "general"),
            EntityRecord::channel("C2", "random"),
        ]);
        category.replace(vec![EntityRecord::channel("C3", "fresh")]);

        let snapshot = category.load();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("C3"));
        assert!(category.is_populated());
    }

    #[test]
    fn test_held_snapshot_survives_replace() {
        let category = Category::default();
        category.replace(vec![EntityRecord::channel("C1", "general")]);
        let held = category.load();
        category.replace(vec![EntityRecord::channel("C2", "random")]);

        assert!(held.contains_key("C1"));
        assert!(!held.contains_key("C2"));
    }
}
