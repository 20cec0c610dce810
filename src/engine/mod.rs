mod allocator;
mod book;
mod error;
mod lifecycle;
mod mutations;
mod occupancy;
mod queries;
mod slots;

pub use book::Book;
pub use error::EngineError;
pub use slots::SlotLedger;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

/// Engine-wide settings shared by every tenant.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seating length when a booking does not say.
    pub default_duration_minutes: i64,
    /// Hold length when a booking does not say (still clamped to `[1, 120]`).
    pub default_hold_minutes: i64,
    pub clock: Arc<dyn Clock>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 90,
            default_hold_minutes: 15,
            clock: Arc::new(SystemClock),
        }
    }
}

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// fsync once for the whole batch and answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    // Anything else waits until the current batch is durable.
                    deferred = Some(other);
                    break;
                }
            }
        }

        flush_and_respond(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so buffered bytes from this batch
    // do not leak into the next one.
    let flushed = wal.flush_sync();
    appended.and(flushed)
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
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// One tenant's reservation engine.
///
/// `book` is the per-tenant critical section: every allocate-then-write runs
/// under its write guard, so two bookings can never both see the same table
/// as free.
pub struct Engine {
    pub(super) book: RwLock<Book>,
    pub(super) slots: RwLock<SlotLedger>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) config: EngineConfig,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;

        let mut book = Book::new();
        let mut slots = SlotLedger::new();
        for event in &events {
            match event.topic() {
                Topic::Slots => slots.apply(event),
                Topic::Tables | Topic::Reservations => book.apply(event),
            }
        }
        tracing::debug!(
            "replayed {} events from {}: {} tables, {} reservations, {} slots",
            events.len(),
            wal_path.display(),
            book.table_count(),
            book.reservation_count(),
            slots.len()
        );

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            book: RwLock::new(book),
            slots: RwLock::new(slots),
            wal_tx,
            notify,
            config,
        })
    }

    pub(super) fn now(&self) -> Ms {
        self.config.clock.now_ms()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply, then notify. Memory is untouched if the append fails.
    pub(super) async fn commit(&self, book: &mut Book, event: Event) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        book.apply(&event);
        self.notify.send(&event);
        Ok(())
    }

    pub(super) async fn commit_slot(
        &self,
        ledger: &mut SlotLedger,
        event: Event,
    ) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        ledger.apply(&event);
        self.notify.send(&event);
        Ok(())
    }
}
