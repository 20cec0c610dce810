use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Like `new`, but returns `None` for empty or inverted windows.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Table catalog ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Table,
    Counter,
    Private,
    Terrace,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::Counter => "counter",
            TableKind::Private => "private",
            TableKind::Terrace => "terrace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Some(TableKind::Table),
            "counter" => Some(TableKind::Counter),
            "private" => Some(TableKind::Private),
            "terrace" => Some(TableKind::Terrace),
            _ => None,
        }
    }
}

/// A physical seating resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    /// Creation order within the tenant; tie-breaker for equal capacities.
    pub seq: u64,
    pub name: String,
    pub capacity: u32,
    pub floor: String,
    pub area: Option<String>,
    pub kind: TableKind,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub floor: Option<String>,
    pub area: Option<String>,
    pub kind: Option<TableKind>,
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySize {
    pub total: u32,
    pub adult: u32,
    pub child: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Web,
    Phone,
    Front,
    Handy,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Phone => "phone",
            Channel::Front => "front",
            Channel::Handy => "handy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Some(Channel::Web),
            "phone" => Some(Channel::Phone),
            "front" => Some(Channel::Front),
            "handy" => Some(Channel::Handy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Hold,
    Confirmed,
    Arrived,
    NoShow,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Hold,
        Status::Confirmed,
        Status::Arrived,
        Status::NoShow,
        Status::Cancelled,
    ];

    /// Statuses that hold their table against overlapping bookings.
    pub fn is_occupying(&self) -> bool {
        matches!(self, Status::Hold | Status::Confirmed | Status::Arrived)
    }

    /// Lifecycle edges. Same-state is handled by the caller as a no-op.
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Hold, Status::Confirmed)
                | (Status::Hold, Status::Cancelled)
                | (Status::Confirmed, Status::Arrived)
                | (Status::Confirmed, Status::NoShow)
                | (Status::Confirmed, Status::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Hold => "hold",
            Status::Confirmed => "confirmed",
            Status::Arrived => "arrived",
            Status::NoShow => "noShow",
            Status::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Some(Status::Hold),
            "confirmed" => Some(Status::Confirmed),
            "arrived" => Some(Status::Arrived),
            "noshow" | "no_show" => Some(Status::NoShow),
            "cancelled" | "canceled" => Some(Status::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub customer_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub span: Span,
    pub party: PartySize,
    /// Kept after the reservation goes terminal, for audit. Only protected while occupying.
    pub table_id: Option<Ulid>,
    pub channel: Channel,
    pub status: Status,
    pub hold_expires_at: Option<Ms>,
    pub tags: Vec<String>,
    pub memo: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    /// A hold whose expiry has passed. It keeps its status but no longer blocks its table.
    pub fn is_lapsed(&self, now: Ms) -> bool {
        self.status == Status::Hold && self.hold_expires_at.is_some_and(|at| at <= now)
    }

    pub fn occupies(&self, now: Ms) -> bool {
        self.status.is_occupying() && !self.is_lapsed(now)
    }
}

/// Booking request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewReservation {
    pub id: Option<Ulid>,
    pub customer_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub start: Option<Ms>,
    pub duration_minutes: Option<i64>,
    pub party_total: u32,
    pub party_adult: Option<u32>,
    pub party_child: Option<u32>,
    pub channel: Option<Channel>,
    pub status: Option<Status>,
    pub hold_minutes: Option<i64>,
    pub tags: Vec<String>,
    pub memo: Option<String>,
    pub created_by: Option<String>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub start: Option<Ms>,
    pub duration_minutes: Option<i64>,
    pub party_total: Option<u32>,
    pub party_adult: Option<u32>,
    pub party_child: Option<u32>,
    pub channel: Option<Channel>,
    pub status: Option<Status>,
    pub hold_minutes: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub memo: Option<String>,
}

/// Result of a read-only allocation probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub table_id: Option<Ulid>,
    pub capacity: Option<u32>,
}

// ── Slots ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenFlag {
    Open,
    Hold,
    Close,
    Holiday,
}

impl OpenFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenFlag::Open => "open",
            OpenFlag::Hold => "hold",
            OpenFlag::Close => "close",
            OpenFlag::Holiday => "holiday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Some(OpenFlag::Open),
            "hold" => Some(OpenFlag::Hold),
            "close" | "closed" => Some(OpenFlag::Close),
            "holiday" | "休" => Some(OpenFlag::Holiday),
            _ => None,
        }
    }
}

pub type SlotKey = (NaiveDate, NaiveTime);

/// Advertised capacity for one date/time. Informational only; the allocator never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub capacity_remains: u32,
    pub assignable_table_ids: Vec<Ulid>,
    pub staff_id: Option<Ulid>,
    pub open_flag: OpenFlag,
    pub seat_time_minutes: u32,
    pub overbook_buffer: u32,
    pub notes: Option<String>,
}

impl Slot {
    pub fn key(&self) -> SlotKey {
        (self.date, self.time)
    }
}

/// Slot fields for upsert/patch; `None` keeps the stored value (or the default on insert).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFields {
    pub capacity_remains: Option<u32>,
    pub assignable_table_ids: Option<Vec<Ulid>>,
    pub staff_id: Option<Ulid>,
    pub open_flag: Option<OpenFlag>,
    pub seat_time_minutes: Option<u32>,
    pub overbook_buffer: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub fields: SlotFields,
}

// ── Events ───────────────────────────────────────────────────────

/// Notification topics; also the LISTEN channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tables,
    Reservations,
    Slots,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Tables => "tables",
            Topic::Reservations => "reservations",
            Topic::Slots => "slots",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tables" => Some(Topic::Tables),
            "reservations" => Some(Topic::Reservations),
            "slots" => Some(Topic::Slots),
            _ => None,
        }
    }
}

/// The WAL record format. Reservation and slot writes carry the whole record
/// so one event is one atomic update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TableCreated {
        id: Ulid,
        name: String,
        capacity: u32,
        floor: String,
        area: Option<String>,
        kind: TableKind,
    },
    TableDeactivated {
        id: Ulid,
    },
    ReservationBooked {
        reservation: Reservation,
    },
    ReservationAmended {
        reservation: Reservation,
    },
    ReservationCancelled {
        id: Ulid,
        at: Ms,
    },
    SlotUpserted {
        slot: Slot,
    },
    SlotPatched {
        slot: Slot,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::TableCreated { .. } | Event::TableDeactivated { .. } => Topic::Tables,
            Event::ReservationBooked { .. }
            | Event::ReservationAmended { .. }
            | Event::ReservationCancelled { .. } => Topic::Reservations,
            Event::SlotUpserted { .. } | Event::SlotPatched { .. } => Topic::Slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: Status, hold_expires_at: Option<Ms>) -> Reservation {
        Reservation {
            id: Ulid::new(),
            customer_name: "Alice".into(),
            phone: None,
            email: None,
            span: Span::new(1_000, 2_000),
            party: PartySize { total: 2, adult: 2, child: 0 },
            table_id: Some(Ulid::new()),
            channel: Channel::Front,
            status,
            hold_expires_at,
            tags: vec![],
            memo: None,
            created_by: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // touching, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn checked_span_rejects_empty_and_inverted() {
        assert!(Span::checked(100, 100).is_none());
        assert!(Span::checked(200, 100).is_none());
        assert_eq!(Span::checked(100, 101), Some(Span::new(100, 101)));
    }

    #[test]
    fn transition_table() {
        let allowed = [
            (Status::Hold, Status::Confirmed),
            (Status::Hold, Status::Cancelled),
            (Status::Confirmed, Status::Arrived),
            (Status::Confirmed, Status::NoShow),
            (Status::Confirmed, Status::Cancelled),
        ];
        for from in Status::ALL {
            for to in Status::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_do_not_occupy() {
        assert!(Status::Hold.is_occupying());
        assert!(Status::Confirmed.is_occupying());
        assert!(Status::Arrived.is_occupying());
        assert!(!Status::NoShow.is_occupying());
        assert!(!Status::Cancelled.is_occupying());
    }

    #[test]
    fn hold_lapses_at_expiry() {
        let r = reservation(Status::Hold, Some(5_000));
        assert!(!r.is_lapsed(4_999));
        assert!(r.is_lapsed(5_000));
        assert!(r.occupies(4_999));
        assert!(!r.occupies(5_000));
    }

    #[test]
    fn confirmed_never_lapses() {
        let r = reservation(Status::Confirmed, Some(5_000));
        assert!(!r.is_lapsed(10_000));
        assert!(r.occupies(10_000));
    }

    #[test]
    fn status_parse_accepts_spellings() {
        assert_eq!(Status::parse("noShow"), Some(Status::NoShow));
        assert_eq!(Status::parse("no_show"), Some(Status::NoShow));
        assert_eq!(Status::parse("canceled"), Some(Status::Cancelled));
        assert_eq!(Status::parse("seated"), None);
    }

    #[test]
    fn open_flag_accepts_legacy_holiday_marker() {
        assert_eq!(OpenFlag::parse("休"), Some(OpenFlag::Holiday));
        assert_eq!(OpenFlag::parse("HOLIDAY"), Some(OpenFlag::Holiday));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::SlotUpserted {
            slot: Slot {
                id: Ulid::new(),
                date: NaiveDate::from_ymd_opt(2025, 11, 15).unwrap(),
                time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                capacity_remains: 4,
                assignable_table_ids: vec![Ulid::new()],
                staff_id: None,
                open_flag: OpenFlag::Open,
                seat_time_minutes: 90,
                overbook_buffer: 0,
                notes: Some("window seats".into()),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.topic(), Topic::Slots);
    }
}
