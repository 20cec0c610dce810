use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

/// One tenant's tables and reservations. Mutated only through `apply`.
#[derive(Debug, Default)]
pub struct Book {
    tables: HashMap<Ulid, Table>,
    next_table_seq: u64,
    reservations: HashMap<Ulid, Reservation>,
    /// `(span, reservation id)` for every reservation, sorted by `span.start`.
    timeline: Vec<(Span, Ulid)>,
    /// Longest span ever indexed. Bounds how far before a window an
    /// overlapping reservation can start.
    longest_span: Ms,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Tables ───────────────────────────────────────────────

    pub fn table(&self, id: &Ulid) -> Option<&Table> {
        self.tables.get(id)
    }

    /// Names are unique per tenant, deactivated tables included.
    pub fn table_named(&self, name: &str) -> Option<&Table> {
        self.tables.values().find(|t| t.name == name)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// All tables in creation order.
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by_key(|t| t.seq);
        tables
    }

    /// Active tables seating at least `party`, smallest first, ties by creation order.
    pub fn candidates(&self, party: u32) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self
            .tables
            .values()
            .filter(|t| t.active && t.capacity >= party)
            .collect();
        tables.sort_by_key(|t| (t.capacity, t.seq));
        tables
    }

    // ── Reservations ─────────────────────────────────────────

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Reservations (any status) whose span overlaps `window`, in start order.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &Reservation> {
        let (from, to) = self.scan_bounds(window);
        self.timeline[from..to]
            .iter()
            .filter(move |(s, _)| s.end > window.start)
            .filter_map(|(_, id)| self.reservations.get(id))
    }

    /// Timeline slice that can hold overlaps: nothing starting at or after
    /// `window.end`, and nothing ending by `window.start` even at the longest span.
    fn scan_bounds(&self, window: &Span) -> (usize, usize) {
        let to = self.timeline.partition_point(|(s, _)| s.start < window.end);
        let earliest = window.start.saturating_sub(self.longest_span);
        let from = self.timeline[..to].partition_point(|(s, _)| s.start <= earliest);
        (from, to)
    }

    fn put_reservation(&mut self, reservation: Reservation) {
        if let Some(old) = self.reservations.get(&reservation.id) {
            let old_span = old.span;
            self.unindex(reservation.id, old_span);
        }
        let pos = self
            .timeline
            .partition_point(|(s, _)| s.start <= reservation.span.start);
        self.timeline.insert(pos, (reservation.span, reservation.id));
        self.longest_span = self.longest_span.max(reservation.span.duration_ms());
        self.reservations.insert(reservation.id, reservation);
    }

    fn unindex(&mut self, id: Ulid, span: Span) {
        let from = self.timeline.partition_point(|(s, _)| s.start < span.start);
        if let Some(offset) = self.timeline[from..].iter().position(|(_, rid)| *rid == id) {
            self.timeline.remove(from + offset);
        }
    }

    // ── Event application ────────────────────────────────────

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::TableCreated {
                id,
                name,
                capacity,
                floor,
                area,
                kind,
            } => {
                self.next_table_seq += 1;
                self.tables.insert(
                    *id,
                    Table {
                        id: *id,
                        seq: self.next_table_seq,
                        name: name.clone(),
                        capacity: *capacity,
                        floor: floor.clone(),
                        area: area.clone(),
                        kind: *kind,
                        active: true,
                    },
                );
            }
            Event::TableDeactivated { id } => {
                if let Some(table) = self.tables.get_mut(id) {
                    table.active = false;
                }
            }
            Event::ReservationBooked { reservation } | Event::ReservationAmended { reservation } => {
                self.put_reservation(reservation.clone());
            }
            Event::ReservationCancelled { id, at } => {
                if let Some(r) = self.reservations.get_mut(id) {
                    r.status = Status::Cancelled;
                    r.hold_expires_at = None;
                    r.updated_at = *at;
                }
            }
            // Slots live in their own ledger.
            Event::SlotUpserted { .. } | Event::SlotPatched { .. } => {}
        }
    }
}
