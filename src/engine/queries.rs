use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::allocator::{assign, Placement};
use super::occupancy::validate_query_window;
use super::{Engine, EngineError};

impl Engine {
    /// Every table, active or not, in creation order.
    pub async fn list_tables(&self) -> Vec<Table> {
        let book = self.book.read().await;
        book.tables().into_iter().cloned().collect()
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let book = self.book.read().await;
        book.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Reservations of any status whose window intersects `[from, to)`,
    /// ordered by start time then id.
    pub async fn list_reservations(&self, from: Ms, to: Ms) -> Result<Vec<Reservation>, EngineError> {
        let window = validate_query_window(from, to)?;
        let book = self.book.read().await;
        let mut out: Vec<Reservation> = book.overlapping(&window).cloned().collect();
        out.sort_by_key(|r| (r.span.start, r.id));
        Ok(out)
    }

    /// Read-only allocation probe: which table would a booking get right now.
    /// `exclude` ignores one reservation's occupancy, as an update would.
    pub async fn check_availability(
        &self,
        start: Ms,
        duration_minutes: Option<i64>,
        party_size: u32,
        exclude: Option<Ulid>,
    ) -> Result<Availability, EngineError> {
        if party_size == 0 {
            return Err(EngineError::InvalidInput("partySize must be at least 1".into()));
        }
        if party_size > MAX_PARTY_SIZE {
            return Err(EngineError::LimitExceeded("party too large"));
        }
        let minutes = duration_minutes.unwrap_or(self.config.default_duration_minutes);
        if minutes <= 0 {
            return Err(EngineError::InvalidInput("durationMinutes must be positive".into()));
        }
        if minutes > MAX_DURATION_MINUTES {
            return Err(EngineError::LimitExceeded("duration too long"));
        }
        let end = start
            .checked_add(minutes * MINUTE_MS)
            .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
        let window = validate_query_window(start, end)?;

        let book = self.book.read().await;
        let mut placement = Placement::new(party_size, window);
        if let Some(id) = exclude {
            let current = book.reservation(&id).ok_or(EngineError::NotFound(id))?;
            placement = placement.excluding(id, current.table_id);
        }

        Ok(match assign(&book, &placement, self.now()) {
            Some(table) => Availability {
                available: true,
                table_id: Some(table.id),
                capacity: Some(table.capacity),
            },
            None => Availability {
                available: false,
                table_id: None,
                capacity: None,
            },
        })
    }
}
