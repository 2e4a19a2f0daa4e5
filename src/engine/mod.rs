mod catalog;
mod error;
mod mutations;
mod queries;
mod store;
mod term;

pub use catalog::Catalog;
pub use error::EngineError;
pub use store::{SlotLease, SlotState, SlotStore};
pub use term::TermPolicy;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::{LogFile, Wal};

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond<F: LogFile>(
    wal: &mut Wal<F>,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let results = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        tracing::error!(batch = batch.len(), failed, "WAL flush failed");
    }
    for ((_, tx), result) in batch.drain(..).zip(results) {
        let _ = tx.send(result);
    }
}

/// One result per batch entry. A failed flush fails every entry it carried;
/// the WAL has already cut those frames off, so none of them replays.
fn flush_batch<F: LogFile>(
    wal: &mut Wal<F>,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> Vec<io::Result<()>> {
    let mut results: Vec<io::Result<()>> =
        batch.iter().map(|(event, _)| wal.append_buffered(event)).collect();
    if results.iter().all(|r| r.is_err()) {
        return results;
    }
    if let Err(e) = wal.flush_sync() {
        for r in results.iter_mut().filter(|r| r.is_ok()) {
            *r = Err(io::Error::new(e.kind(), e.to_string()));
        }
    }
    results
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Write one event through the background group-commit writer.
pub(super) async fn wal_append(
    wal_tx: &mpsc::Sender<WalCommand>,
    event: Event,
) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append { event, response: tx })
        .await
        .map_err(|_| EngineError::OperationFailed("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::OperationFailed("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::OperationFailed(format!("WAL write: {e}")))
}

/// The reservation engine: term policy, slot capacity store and livestream
/// catalog behind one durable log.
pub struct Engine {
    pub(super) policy: TermPolicy,
    pub(super) store: SlotStore,
    pub catalog: Arc<Catalog>,
    pub notify: Arc<NotifyHub>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every write between its log append and its in-memory
    /// apply; held exclusively by compaction.
    pub(super) commit_gate: Arc<RwLock<()>>,
    /// Serializes tag registration (check-then-append).
    pub(super) tag_writes: Mutex<()>,
}

impl Engine {
    /// Open the log at `wal_path`, replaying it, or provision `grid` into a fresh one.
    ///
    /// Must be called inside a tokio runtime: spawns the WAL writer.
    pub fn open(
        wal_path: PathBuf,
        grid: TermGrid,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, EngineError> {
        let configured = TermPolicy::new(grid)?;
        let (mut wal, events) = Wal::recover(&wal_path)
            .map_err(|e| EngineError::OperationFailed(format!("WAL open: {e}")))?;

        let mut events = events.into_iter();
        let policy = match events.next() {
            None => {
                wal.append_buffered(&Event::TermProvisioned(grid))
                    .and_then(|()| wal.flush_sync())
                    .map_err(|e| EngineError::OperationFailed(format!("WAL write: {e}")))?;
                info!(%grid, "provisioned booking term");
                configured
            }
            Some(Event::TermProvisioned(stored)) if stored == grid => configured,
            Some(Event::TermProvisioned(stored)) => {
                return Err(EngineError::TermMismatch { stored, configured: grid });
            }
            Some(_) => {
                return Err(EngineError::OperationFailed(
                    "WAL does not start with a term record".into(),
                ));
            }
        };

        // Replay into plain values; nothing else can observe them yet.
        let mut states = store::grid_states(&policy);
        let mut catalog = Catalog::new();
        let mut replayed = 0usize;
        for event in events {
            match event {
                Event::TermProvisioned(_) => warn!("ignoring repeated term record in WAL"),
                Event::TagRegistered { id, name } => catalog.register_tag(Tag { id, name }),
                Event::LivestreamReserved { livestream, slots } => {
                    for slot_id in slots {
                        match states.get_mut(slot_id as usize) {
                            Some(slot) if slot.remaining > 0 => slot.remaining -= 1,
                            _ => warn!(
                                slot = slot_id,
                                livestream = %livestream.id,
                                "replayed reservation over exhausted or unknown slot"
                            ),
                        }
                    }
                    catalog.create_replayed(livestream);
                    replayed += 1;
                }
            }
        }
        if replayed > 0 {
            info!(livestreams = replayed, "replayed reservations from WAL");
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            policy,
            store: SlotStore::from_states(states),
            catalog: Arc::new(catalog),
            notify,
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
            tag_writes: Mutex::new(()),
        })
    }

    pub fn grid(&self) -> TermGrid {
        self.policy.grid()
    }

    pub fn term(&self) -> Span {
        self.policy.term()
    }

    /// The slot capacity store. Exposed for lock-scope inspection.
    pub fn store(&self) -> &SlotStore {
        &self.store
    }
}
