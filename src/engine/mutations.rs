use tokio::sync::oneshot;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{ALLOCATIONS_TOTAL, outcome_label};

use super::allocator::{assign, Placement};
use super::lifecycle::{amend, validate_booking};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    // ── Table catalog (administrative) ───────────────────────

    pub async fn create_table(&self, new: NewTable) -> Result<Table, EngineError> {
        if new.capacity == 0 {
            return Err(EngineError::InvalidInput("table capacity must be at least 1".into()));
        }
        if new.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("table name is required".into()));
        }
        if new.name.len() > MAX_NAME_LEN
            || new.floor.as_ref().is_some_and(|f| f.len() > MAX_NAME_LEN)
            || new.area.as_ref().is_some_and(|a| a.len() > MAX_NAME_LEN)
        {
            return Err(EngineError::LimitExceeded("table name too long"));
        }

        let mut book = self.book.write().await;
        if book.table_count() >= MAX_TABLES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many tables"));
        }
        if book.table(&new.id).is_some() {
            return Err(EngineError::AlreadyExists(new.id));
        }
        let name = new.name.trim().to_string();
        if book.table_named(&name).is_some() {
            return Err(EngineError::TableNameTaken(name));
        }

        let event = Event::TableCreated {
            id: new.id,
            name,
            capacity: new.capacity,
            floor: new.floor.unwrap_or_else(|| "1F".to_string()),
            area: new.area,
            kind: new.kind.unwrap_or(TableKind::Table),
        };
        self.commit(&mut book, event).await?;
        book.table(&new.id)
            .cloned()
            .ok_or(EngineError::NotFound(new.id))
    }

    /// Soft delete: the table stays in the catalog for audit but is never allocated again.
    pub async fn deactivate_table(&self, id: Ulid) -> Result<(), EngineError> {
        let mut book = self.book.write().await;
        let table = book.table(&id).ok_or(EngineError::NotFound(id))?;
        if !table.active {
            return Ok(());
        }
        self.commit(&mut book, Event::TableDeactivated { id }).await
    }

    // ── Reservation lifecycle ────────────────────────────────

    pub async fn create_reservation(&self, request: NewReservation) -> Result<Reservation, EngineError> {
        let booking = validate_booking(&request, self.config.default_duration_minutes)?;
        let id = request.id.unwrap_or_else(Ulid::new);

        let mut book = self.book.write().await;
        if book.reservation_count() >= MAX_RESERVATIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }
        if book.reservation(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let now = self.now();
        let placement = Placement::new(booking.party.total, booking.window);
        let table_id = assign(&book, &placement, now).map(|t| t.id);
        metrics::counter!(ALLOCATIONS_TOTAL, "outcome" => outcome_label(table_id.is_some()))
            .increment(1);
        let Some(table_id) = table_id else {
            debug!(
                "no table for party of {} in [{}, {})",
                booking.party.total, booking.window.start, booking.window.end
            );
            return Err(EngineError::NoAvailability {
                party_size: booking.party.total,
                window: booking.window,
            });
        };

        let reservation = booking.into_reservation(
            id,
            request,
            table_id,
            now,
            self.config.default_hold_minutes,
        );
        debug!("reservation {id} booked on table {table_id} as {}", reservation.status);
        self.commit(
            &mut book,
            Event::ReservationBooked {
                reservation: reservation.clone(),
            },
        )
        .await?;
        Ok(reservation)
    }

    pub async fn update_reservation(
        &self,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        let mut book = self.book.write().await;
        let current = book.reservation(&id).ok_or(EngineError::NotFound(id))?;
        let now = self.now();
        let mut amendment = amend(current, &patch, now, self.config.default_hold_minutes)?;

        if amendment.reallocate {
            let next = &amendment.next;
            let placement = Placement::new(next.party.total, next.span).excluding(id, current.table_id);
            let table_id = assign(&book, &placement, now).map(|t| t.id);
            metrics::counter!(ALLOCATIONS_TOTAL, "outcome" => outcome_label(table_id.is_some()))
                .increment(1);
            let Some(table_id) = table_id else {
                return Err(EngineError::NoAvailability {
                    party_size: next.party.total,
                    window: next.span,
                });
            };
            if current.table_id != Some(table_id) {
                debug!("reservation {id} moves to table {table_id}");
            }
            amendment.next.table_id = Some(table_id);
        }

        let reservation = amendment.next;
        self.commit(
            &mut book,
            Event::ReservationAmended {
                reservation: reservation.clone(),
            },
        )
        .await?;
        Ok(reservation)
    }

    /// Cancellation is allowed from every state; the table is released because
    /// cancelled reservations never count as occupying.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut book = self.book.write().await;
        let current = book.reservation(&id).ok_or(EngineError::NotFound(id))?;
        if current.status == Status::Cancelled {
            return Ok(current.clone());
        }

        let at = self.now();
        self.commit(&mut book, Event::ReservationCancelled { id, at })
            .await?;
        book.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Hold both read guards so no mutation lands between snapshot and swap.
        let book = self.book.read().await;
        let slots = self.slots.read().await;

        let mut events = Vec::with_capacity(
            book.table_count() * 2 + book.reservation_count() + slots.len(),
        );
        // Creation order matters: replay re-derives each table's sequence number.
        for table in book.tables() {
            events.push(Event::TableCreated {
                id: table.id,
                name: table.name.clone(),
                capacity: table.capacity,
                floor: table.floor.clone(),
                area: table.area.clone(),
                kind: table.kind,
            });
            if !table.active {
                events.push(Event::TableDeactivated { id: table.id });
            }
        }
        let mut reservations: Vec<&Reservation> = book.reservations().collect();
        reservations.sort_by_key(|r| r.id);
        events.extend(reservations.into_iter().map(|r| Event::ReservationBooked {
            reservation: r.clone(),
        }));
        events.extend(slots.iter().map(|s| Event::SlotUpserted { slot: s.clone() }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
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
