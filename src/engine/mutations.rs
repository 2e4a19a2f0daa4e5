use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{
    outcome_label, RESERVATIONS_TOTAL, RESERVATION_DURATION_SECONDS, SLOT_LOCK_WAIT_SECONDS,
    WAL_COMPACTIONS_TOTAL,
};

use super::{wal_append, Catalog, Engine, EngineError, SlotLease, WalCommand};

fn check_request_limits(request: &ReservationRequest) -> Result<(), EngineError> {
    if request.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if request.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if request.playlist_url.len() > MAX_URL_LEN || request.thumbnail_url.len() > MAX_URL_LEN {
        return Err(EngineError::LimitExceeded("url too long"));
    }
    if request.tag_ids.len() > MAX_TAGS_PER_LIVESTREAM {
        return Err(EngineError::LimitExceeded("too many tags"));
    }
    Ok(())
}

/// Everything a booking needs once its slots are locked and checked.
/// Runs on its own task so an abandoned caller cannot interrupt it halfway.
struct UnitOfWork {
    lease: SlotLease,
    livestream: Livestream,
    wal_tx: mpsc::Sender<WalCommand>,
    catalog: Arc<Catalog>,
    notify: Arc<NotifyHub>,
    commit_gate: Arc<RwLock<()>>,
}

impl UnitOfWork {
    async fn run(self, done: oneshot::Sender<Result<Livestream, EngineError>>) {
        let gate = self.commit_gate.clone();
        let _shared = gate.read().await;
        // Last point at which an abandoned booking leaves no trace.
        if done.is_closed() {
            debug!(livestream = %self.livestream.id, "booking abandoned before commit");
            return;
        }
        let result = self.commit().await;
        let _ = done.send(result);
    }

    async fn commit(self) -> Result<Livestream, EngineError> {
        let UnitOfWork {
            mut lease,
            livestream,
            wal_tx,
            catalog,
            notify,
            ..
        } = self;

        if let Err(e) = lease.decrement_all() {
            return Err(match e {
                EngineError::CapacityExhausted(id) => EngineError::InsufficientCapacity(
                    lease
                        .slots()
                        .find(|s| s.id == id)
                        .map(|s| s.span)
                        .unwrap_or_else(|| livestream.span()),
                ),
                other => other,
            });
        }

        let event = Event::LivestreamReserved {
            livestream: livestream.clone(),
            slots: lease.ids(),
        };
        // On failure the lease drops here and restores every decrement.
        wal_append(&wal_tx, event).await?;

        catalog.create(livestream.clone()).await;
        lease.commit();
        notify.send(&livestream);
        Ok(livestream)
    }
}

impl Engine {
    /// Reserve `[start_at, end_at)` for the requester and create its livestream.
    ///
    /// All-or-nothing: either every covering slot loses one unit and the
    /// livestream exists, or nothing changed.
    pub async fn book(&self, request: ReservationRequest) -> Result<Livestream, EngineError> {
        let started = Instant::now();
        let result = self.try_book(request).await;
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        metrics::histogram!(RESERVATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn try_book(&self, mut request: ReservationRequest) -> Result<Livestream, EngineError> {
        // Range first: an out-of-term request is OutOfTerm whatever else it carries.
        let span = self.policy.validate(request.start_at, request.end_at)?;
        request.tag_ids.sort_unstable();
        request.tag_ids.dedup();
        check_request_limits(&request)?;

        let lock_start = Instant::now();
        let lease = self.store.lock_covering(span).await;
        metrics::histogram!(SLOT_LOCK_WAIT_SECONDS).record(lock_start.elapsed().as_secs_f64());

        if let Some(slot) = lease.first_exhausted() {
            debug!(
                requester = request.requester_id,
                requested = %span,
                exhausted = %slot.span,
                "reservation rejected"
            );
            return Err(EngineError::InsufficientCapacity(slot.span));
        }

        let livestream = Livestream {
            id: self.catalog.next_id()?,
            owner_id: request.requester_id,
            title: request.title,
            description: request.description,
            playlist_url: request.playlist_url,
            thumbnail_url: request.thumbnail_url,
            start_at: request.start_at,
            end_at: request.end_at,
            tag_ids: request.tag_ids,
        };
        debug!(
            livestream = %livestream.id,
            requester = livestream.owner_id,
            slots = lease.len(),
            "slots locked, committing"
        );

        let unit = UnitOfWork {
            lease,
            livestream,
            wal_tx: self.wal_tx.clone(),
            catalog: self.catalog.clone(),
            notify: self.notify.clone(),
            commit_gate: self.commit_gate.clone(),
        };
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(unit.run(done_tx));
        done_rx
            .await
            .map_err(|_| EngineError::OperationFailed("commit task ended without a result".into()))?
    }

    /// Register a tag in the directory. Re-registering the same pair is a no-op.
    pub async fn register_tag(&self, id: TagId, name: String) -> Result<(), EngineError> {
        if name.len() > MAX_TAG_NAME_LEN {
            return Err(EngineError::LimitExceeded("tag name too long"));
        }
        let _serial = self.tag_writes.lock().await;
        if let Some(existing) = self.catalog.tag(id) {
            if existing.name == name {
                return Ok(());
            }
            return Err(EngineError::TagExists(id));
        }

        let _shared = self.commit_gate.read().await;
        wal_append(&self.wal_tx, Event::TagRegistered { id, name: name.clone() }).await?;
        self.catalog.register_tag(Tag { id, name });
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let mut events = vec![Event::TermProvisioned(self.policy.grid())];
        events.extend(
            self.catalog
                .list_tags()
                .into_iter()
                .map(|t| Event::TagRegistered { id: t.id, name: t.name }),
        );
        for livestream in self.catalog.all_in_order().await {
            let slots = self.store.covering_ids(livestream.span());
            events.push(Event::LivestreamReserved { livestream, slots });
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::OperationFailed("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::OperationFailed("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::OperationFailed(format!("WAL compaction: {e}")))?;

        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        debug!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
