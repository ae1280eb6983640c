mod day;

pub use day::DayState;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::ChangeFeed;
use crate::repository::{BookingRepository, DayTxn, Isolation, RepositoryError, StatusFilter};
use crate::wal::Wal;

pub type DayKey = (Ulid, NaiveDate);
pub type SharedDay = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(crate) enum WalCommand {
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
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
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
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            error!("WAL flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
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

/// Reference [`BookingRepository`]: bookings live in memory, one
/// `RwLock<DayState>` per room and date, optionally backed by a WAL.
pub struct Store {
    days: DashMap<DayKey, SharedDay>,
    rooms: DashMap<Ulid, Room>,
    /// Reverse lookup: booking id → the day that holds it.
    booking_index: Arc<DashMap<Ulid, DayKey>>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Appends take it shared; compaction takes it exclusively so the
    /// snapshot it writes can't miss an in-flight event.
    compact_gate: Arc<RwLock<()>>,
    feed: Arc<ChangeFeed>,
}

/// The shared handles a day write needs, detached from the store's
/// lifetime so the write can run to completion on its own task.
#[derive(Clone)]
pub(crate) struct DayWriter {
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    compact_gate: Arc<RwLock<()>>,
    booking_index: Arc<DashMap<Ulid, DayKey>>,
    feed: Arc<ChangeFeed>,
}

impl DayWriter {
    /// WAL-append + apply + publish. Once the append is queued the event
    /// is applied whenever it reaches disk, so callers must not cancel
    /// this future; `StoreDay` runs it on a spawned task.
    pub(crate) async fn persist_and_apply(
        &self,
        day: &mut DayState,
        event: &Event,
    ) -> Result<(), RepositoryError> {
        let _gate = self.compact_gate.read().await;
        wal_append(self.wal_tx.as_ref(), event).await?;
        apply_to_day(day, event, &self.booking_index);
        self.feed.send(event);
        Ok(())
    }
}

/// Write event to WAL via the background group-commit writer.
async fn wal_append(
    wal_tx: Option<&mpsc::Sender<WalCommand>>,
    event: &Event,
) -> Result<(), RepositoryError> {
    let Some(wal_tx) = wal_tx else {
        return Ok(());
    };
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| RepositoryError::Unavailable("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| RepositoryError::Unavailable("WAL writer dropped response".into()))?
        .map_err(|e| RepositoryError::Unavailable(format!("WAL append failed: {e}")))
}

/// Apply an event to a day (caller holds the day lock).
fn apply_to_day(day: &mut DayState, event: &Event, index: &DashMap<Ulid, DayKey>) {
    match event {
        Event::BookingRequested {
            id,
            room_id,
            date,
            span,
            requested_by,
            created_at,
        } => {
            day.insert_booking(Booking {
                id: *id,
                room_id: *room_id,
                date: *date,
                span: *span,
                requested_by: requested_by.clone(),
                status: BookingStatus::Pending,
                created_at: *created_at,
                decided_at: None,
                decided_by: None,
            });
            index.insert(*id, (*room_id, *date));
        }
        Event::BookingDecided {
            id,
            status,
            decided_by,
            decided_at,
            ..
        } => {
            if let Some(b) = day.booking_mut(id) {
                b.status = *status;
                b.decided_by = Some(decided_by.clone());
                b.decided_at = Some(*decided_at);
            }
        }
        // Room events are handled at the room map, not per day
        Event::RoomRegistered { .. } | Event::RoomRetired { .. } => {}
    }
}

impl Store {
    /// A store with no durability, for tests and embedding.
    pub fn in_memory() -> Self {
        Self::with_parts(DashMap::new(), DashMap::new(), DashMap::new(), None)
    }

    /// Replay the WAL at `wal_path` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let rooms = DashMap::new();
        let index = DashMap::new();
        let mut days: HashMap<DayKey, DayState> = HashMap::new();
        for event in &events {
            match event {
                Event::RoomRegistered { id, name, capacity } => {
                    rooms.insert(*id, Room::new(*id, name.clone(), *capacity));
                }
                Event::RoomRetired { id } => {
                    if let Some(mut room) = rooms.get_mut(id) {
                        room.active = false;
                    }
                }
                Event::BookingRequested { room_id, date, .. }
                | Event::BookingDecided { room_id, date, .. } => {
                    let day = days
                        .entry((*room_id, *date))
                        .or_insert_with(|| DayState::new(*room_id, *date));
                    apply_to_day(day, event, &index);
                }
            }
        }
        info!(
            "replayed {} events from {}: {} rooms, {} bookings",
            events.len(),
            wal_path.display(),
            rooms.len(),
            index.len()
        );

        let days = days
            .into_iter()
            .map(|(key, day)| (key, Arc::new(RwLock::new(day))))
            .collect();
        Ok(Self::with_parts(days, rooms, index, Some(wal_tx)))
    }

    fn with_parts(
        days: DashMap<DayKey, SharedDay>,
        rooms: DashMap<Ulid, Room>,
        booking_index: DashMap<Ulid, DayKey>,
        wal_tx: Option<mpsc::Sender<WalCommand>>,
    ) -> Self {
        Self {
            days,
            rooms,
            booking_index: Arc::new(booking_index),
            wal_tx,
            compact_gate: Arc::new(RwLock::new(())),
            feed: Arc::new(ChangeFeed::new()),
        }
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    pub(crate) fn writer(&self) -> DayWriter {
        DayWriter {
            wal_tx: self.wal_tx.clone(),
            compact_gate: self.compact_gate.clone(),
            booking_index: self.booking_index.clone(),
            feed: self.feed.clone(),
        }
    }

    // ── Rooms (administrative seam) ──────────────────────────

    /// Register a room, or update and reactivate an existing one.
    pub async fn register_room(&self, room: Room) -> Result<(), RepositoryError> {
        if room.name.len() > MAX_ROOM_NAME_LEN {
            return Err(RepositoryError::LimitExceeded("room name too long"));
        }
        if !self.rooms.contains_key(&room.id) && self.rooms.len() >= MAX_ROOMS {
            return Err(RepositoryError::LimitExceeded("too many rooms"));
        }
        let event = Event::RoomRegistered {
            id: room.id,
            name: room.name.clone(),
            capacity: room.capacity,
        };
        let _gate = self.compact_gate.read().await;
        wal_append(self.wal_tx.as_ref(), &event).await?;
        self.rooms.insert(room.id, Room { active: true, ..room });
        self.feed.send(&event);
        Ok(())
    }

    /// Stop accepting new requests for a room. Existing bookings stay.
    pub async fn retire_room(&self, id: Ulid) -> Result<(), RepositoryError> {
        if !self.rooms.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        let event = Event::RoomRetired { id };
        let _gate = self.compact_gate.read().await;
        wal_append(self.wal_tx.as_ref(), &event).await?;
        if let Some(mut room) = self.rooms.get_mut(&id) {
            room.active = false;
        }
        self.feed.send(&event);
        Ok(())
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub fn booking_count(&self) -> usize {
        self.booking_index.len()
    }

    fn day(&self, key: DayKey) -> SharedDay {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key.0, key.1))))
            .value()
            .clone()
    }

    fn existing_day(&self, key: &DayKey) -> Option<SharedDay> {
        self.days.get(key).map(|e| e.value().clone())
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the WAL with only the events needed to rebuild current state.
    /// Returns `Ok(false)` without touching the log when the store is not
    /// durable or some day is locked by an open transaction.
    pub async fn compact_wal(&self) -> Result<bool, RepositoryError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(false);
        };
        let _gate = self.compact_gate.write().await;

        let mut events = Vec::new();
        for room in self.rooms() {
            events.push(Event::RoomRegistered {
                id: room.id,
                name: room.name.clone(),
                capacity: room.capacity,
            });
            if !room.active {
                events.push(Event::RoomRetired { id: room.id });
            }
        }

        let days: Vec<SharedDay> = self.days.iter().map(|e| e.value().clone()).collect();
        for day in days {
            let Ok(guard) = day.try_read() else {
                debug!("compaction skipped: a day is locked by an open transaction");
                return Ok(false);
            };
            for b in &guard.bookings {
                events.push(Event::BookingRequested {
                    id: b.id,
                    room_id: b.room_id,
                    date: b.date,
                    span: b.span,
                    requested_by: b.requested_by.clone(),
                    created_at: b.created_at,
                });
                if let (Some(decided_by), Some(decided_at)) = (&b.decided_by, b.decided_at) {
                    events.push(Event::BookingDecided {
                        id: b.id,
                        room_id: b.room_id,
                        date: b.date,
                        status: b.status,
                        decided_by: decided_by.clone(),
                        decided_at,
                    });
                }
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| RepositoryError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Unavailable(format!("WAL compaction failed: {e}")))?;
        info!("compacted WAL to {count} events");
        Ok(true)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingRepository for Store {
    fn isolation(&self) -> Isolation {
        Isolation::PerRoomDay
    }

    async fn room(&self, room_id: Ulid) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.get(&room_id).map(|r| r.value().clone()))
    }

    async fn find_booking(&self, id: Ulid) -> Result<Option<Booking>, RepositoryError> {
        let Some(key) = self.booking_index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(day) = self.existing_day(&key) else {
            return Ok(None);
        };
        let guard = day.read().await;
        Ok(guard.booking(&id).cloned())
    }

    async fn list_bookings(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        filter: StatusFilter,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let Some(day) = self.existing_day(&(room_id, date)) else {
            return Ok(Vec::new());
        };
        let guard = day.read().await;
        Ok(guard.filtered(filter))
    }

    async fn lock_day<'a>(
        &'a self,
        room_id: Ulid,
        date: NaiveDate,
    ) -> Result<Box<dyn DayTxn + 'a>, RepositoryError> {
        let guard = self.day((room_id, date)).write_owned().await;
        Ok(Box::new(day::StoreDay::new(self, guard)))
    }
}
