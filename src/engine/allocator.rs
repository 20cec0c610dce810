use ulid::Ulid;

use crate::model::*;

use super::book::Book;
use super::occupancy::occupied_tables;

/// What a booking needs from the table catalog.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placement {
    pub party: u32,
    pub window: Span,
    /// Reservation whose own occupancy is ignored (the one being updated).
    pub exclude: Option<Ulid>,
    /// Table to keep if it still qualifies, so re-assignment does not move guests needlessly.
    pub keep: Option<Ulid>,
}

impl Placement {
    pub fn new(party: u32, window: Span) -> Self {
        Self {
            party,
            window,
            exclude: None,
            keep: None,
        }
    }

    pub fn excluding(mut self, reservation_id: Ulid, current_table: Option<Ulid>) -> Self {
        self.exclude = Some(reservation_id);
        self.keep = current_table;
        self
    }
}

/// Best-fit: the smallest active table that seats the party and is free for
/// the window. Equal capacities resolve by creation order.
pub(crate) fn assign<'a>(book: &'a Book, placement: &Placement, now: Ms) -> Option<&'a Table> {
    let occupied = occupied_tables(book, &placement.window, placement.exclude, now);

    if let Some(keep) = placement.keep
        && let Some(table) = book.table(&keep)
        && table.active
        && table.capacity >= placement.party
        && !occupied.contains(&table.id)
    {
        return Some(table);
    }

    book.candidates(placement.party)
        .into_iter()
        .find(|t| !occupied.contains(&t.id))
}
