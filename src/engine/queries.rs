use ulid::Ulid;

use crate::limits::MAX_LIST_LIMIT;
use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn get_livestream(&self, id: Ulid) -> Option<Livestream> {
        self.catalog.get(id).await
    }

    pub async fn list_livestreams_by_owner(&self, owner_id: UserId) -> Vec<Livestream> {
        self.catalog.list_by_owner(owner_id).await
    }

    /// Newest first. The limit is capped at `MAX_LIST_LIMIT`.
    pub async fn list_livestreams(&self, limit: Option<usize>) -> Vec<Livestream> {
        let limit = limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT);
        self.catalog.list_all(Some(limit)).await
    }

    pub async fn search_livestreams_by_tag(&self, name: &str) -> Vec<Livestream> {
        self.catalog.search_by_tag(name).await
    }

    pub fn list_tags(&self) -> Vec<Tag> {
        self.catalog.list_tags()
    }

    pub fn tags_of(&self, livestream: &Livestream) -> Vec<Tag> {
        self.catalog.tags_of(livestream)
    }

    /// Remaining capacity per slot over `[start, end)`. Empty outside the term.
    pub async fn slots(&self, start: Secs, end: Secs) -> Vec<SlotInfo> {
        let Ok(span) = self.policy.validate(start, end) else {
            return Vec::new();
        };
        self.store.snapshot(span).await
    }
}
