use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

#[derive(Default)]
struct CatalogState {
    /// Keyed by monotonic ULID, so iteration order is creation order.
    livestreams: BTreeMap<Ulid, Livestream>,
    by_owner: HashMap<UserId, Vec<Ulid>>,
    by_tag: HashMap<TagId, Vec<Ulid>>,
}

impl CatalogState {
    fn insert(&mut self, livestream: Livestream) {
        let id = livestream.id;
        self.by_owner.entry(livestream.owner_id).or_default().push(id);
        for tag in &livestream.tag_ids {
            self.by_tag.entry(*tag).or_default().push(id);
        }
        self.livestreams.insert(id, livestream);
    }
}

/// Append-only store of created livestreams plus the tag directory.
///
/// Writes come only from the engine's commit path; everything else reads.
pub struct Catalog {
    state: RwLock<CatalogState>,
    tags: DashMap<TagId, Tag>,
    /// Last id handed out or replayed.
    last_id: Mutex<Ulid>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            tags: DashMap::new(),
            last_id: Mutex::new(Ulid::nil()),
        }
    }

    /// Next livestream id. Strictly greater than every id handed out or
    /// replayed, even when the clock steps back across a restart.
    pub(crate) fn next_id(&self) -> Result<Ulid, EngineError> {
        let mut last = self
            .last_id
            .lock()
            .map_err(|_| EngineError::OperationFailed("id generator poisoned".into()))?;
        let fresh = Ulid::new();
        let id = if fresh > *last {
            fresh
        } else {
            last.increment()
                .ok_or_else(|| EngineError::OperationFailed("id space exhausted".into()))?
        };
        *last = id;
        Ok(id)
    }

    /// Record a committed livestream. Called only from the engine's unit of work.
    pub(crate) async fn create(&self, livestream: Livestream) -> Ulid {
        let id = livestream.id;
        let mut state = self.state.write().await;
        state.insert(livestream);
        metrics::gauge!(crate::observability::LIVESTREAMS).set(state.livestreams.len() as f64);
        id
    }

    /// Replay path: no other owner of the catalog exists yet.
    pub(crate) fn create_replayed(&mut self, livestream: Livestream) {
        if let Ok(last) = self.last_id.get_mut()
            && livestream.id > *last
        {
            *last = livestream.id;
        }
        self.state.get_mut().insert(livestream);
    }

    pub(crate) fn register_tag(&self, tag: Tag) {
        self.tags.insert(tag.id, tag);
    }

    pub fn tag(&self, id: TagId) -> Option<Tag> {
        self.tags.get(&id).map(|e| e.value().clone())
    }

    pub fn list_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.tags.iter().map(|e| e.value().clone()).collect();
        tags.sort_by_key(|t| t.id);
        tags
    }

    /// Resolve a livestream's tag ids to registered tags. Unknown ids are skipped.
    pub fn tags_of(&self, livestream: &Livestream) -> Vec<Tag> {
        livestream.tag_ids.iter().filter_map(|id| self.tag(*id)).collect()
    }

    pub async fn get(&self, id: Ulid) -> Option<Livestream> {
        self.state.read().await.livestreams.get(&id).cloned()
    }

    /// Owner's livestreams, oldest first.
    pub async fn list_by_owner(&self, owner_id: UserId) -> Vec<Livestream> {
        let state = self.state.read().await;
        state
            .by_owner
            .get(&owner_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.livestreams.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Newest first, at most `limit` entries when given.
    pub async fn list_all(&self, limit: Option<usize>) -> Vec<Livestream> {
        let state = self.state.read().await;
        let limit = limit.unwrap_or(usize::MAX);
        state
            .livestreams
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Every livestream tagged with any tag named `name`, newest first.
    pub async fn search_by_tag(&self, name: &str) -> Vec<Livestream> {
        let tag_ids: Vec<TagId> = self
            .tags
            .iter()
            .filter(|e| e.value().name == name)
            .map(|e| *e.key())
            .collect();
        if tag_ids.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().await;
        let mut ids: Vec<Ulid> = tag_ids
            .iter()
            .filter_map(|t| state.by_tag.get(t))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        ids.iter()
            .filter_map(|id| state.livestreams.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.livestreams.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every livestream in creation order (compaction input).
    pub(crate) async fn all_in_order(&self) -> Vec<Livestream> {
        self.state.read().await.livestreams.values().cloned().collect()
    }
}
