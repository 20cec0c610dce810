use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::book::Book;
use super::EngineError;

/// Tables held by occupying reservations overlapping `window`.
///
/// Lapsed holds are skipped, so an abandoned hold frees its table as soon as
/// it expires without anything rewriting its status. `exclude` drops one
/// reservation regardless of overlap, which lets an update re-evaluate its
/// own slot.
pub(crate) fn occupied_tables(
    book: &Book,
    window: &Span,
    exclude: Option<Ulid>,
    now: Ms,
) -> HashSet<Ulid> {
    book.overlapping(window)
        .filter(|r| Some(r.id) != exclude)
        .filter(|r| r.occupies(now))
        .filter_map(|r| r.table_id)
        .collect()
}

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_query_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let window = Span::checked(start, end)
        .ok_or_else(|| EngineError::InvalidInput("window end must be after start".into()))?;
    validate_window(&window)?;
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(window)
}
