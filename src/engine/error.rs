use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::{Span, Status};

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(String),
    NoAvailability {
        party_size: u32,
        window: Span,
    },
    InvalidTransition {
        from: Status,
        to: Status,
    },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    TableNameTaken(String),
    SlotTaken {
        date: NaiveDate,
        time: NaiveTime,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// SQLSTATE reported to wire clients. Capacity conflicts and lifecycle
    /// conflicts get different codes so a client knows whether retrying with
    /// another time or party size can help.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "22023",
            EngineError::NoAvailability { .. } => "23P01",
            EngineError::InvalidTransition { .. } => "55000",
            EngineError::NotFound(_) => "P0002",
            EngineError::AlreadyExists(_)
            | EngineError::TableNameTaken(_)
            | EngineError::SlotTaken { .. } => "23505",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NoAvailability { party_size, window } => write!(
                f,
                "no available table for party of {party_size} in [{}, {})",
                window.start, window.end
            ),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::TableNameTaken(name) => write!(f, "table name already in use: {name}"),
            EngineError::SlotTaken { date, time } => {
                write!(f, "slot already exists for {date} {}", time.format("%H:%M"))
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
