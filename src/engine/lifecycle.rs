use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::occupancy::validate_window;
use super::EngineError;

/// `now + holdMinutes`, with the requested length clamped to `[1, 120]` minutes.
pub(crate) fn hold_expiry(now: Ms, hold_minutes: i64) -> Ms {
    now + hold_minutes.clamp(MIN_HOLD_MINUTES, MAX_HOLD_MINUTES) * MINUTE_MS
}

/// Same-state is a no-op success; everything else must be an edge of the lifecycle.
pub(crate) fn check_transition(from: Status, to: Status) -> Result<(), EngineError> {
    if from == to || from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

fn window_from(start: Ms, duration_minutes: i64) -> Result<Span, EngineError> {
    if duration_minutes <= 0 {
        return Err(EngineError::InvalidInput("durationMinutes must be positive".into()));
    }
    if duration_minutes > MAX_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("duration too long"));
    }
    let end = start
        .checked_add(duration_minutes * MINUTE_MS)
        .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
    let window = Span::new(start, end);
    validate_window(&window)?;
    Ok(window)
}

fn party_from(total: u32, adult: Option<u32>, child: Option<u32>) -> Result<PartySize, EngineError> {
    if total == 0 {
        return Err(EngineError::InvalidInput("partySize.total must be at least 1".into()));
    }
    if total > MAX_PARTY_SIZE {
        return Err(EngineError::LimitExceeded("party too large"));
    }
    let child = child.unwrap_or(0);
    let adult = adult.unwrap_or_else(|| total.saturating_sub(child));
    Ok(PartySize { total, adult, child })
}

fn check_text(field: &'static str, value: Option<&str>, max: usize) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(field)),
        _ => Ok(()),
    }
}

fn check_tags(tags: &[String]) -> Result<(), EngineError> {
    if tags.len() > MAX_TAGS {
        return Err(EngineError::LimitExceeded("too many tags"));
    }
    if tags.iter().any(|t| t.len() > MAX_TAG_LEN) {
        return Err(EngineError::LimitExceeded("tag too long"));
    }
    Ok(())
}

fn check_customer_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput("customerName is required".into()));
    }
    check_text("customer name too long", Some(name), MAX_NAME_LEN)
}

/// A validated booking request, ready for allocation.
#[derive(Debug)]
pub(crate) struct Booking {
    pub window: Span,
    pub party: PartySize,
    pub status: Status,
}

impl Booking {
    /// Build the stored record once a table has been chosen.
    pub fn into_reservation(
        self,
        id: Ulid,
        request: NewReservation,
        table_id: Ulid,
        now: Ms,
        default_hold_minutes: i64,
    ) -> Reservation {
        let hold_expires_at = (self.status == Status::Hold)
            .then(|| hold_expiry(now, request.hold_minutes.unwrap_or(default_hold_minutes)));
        Reservation {
            id,
            customer_name: request.customer_name.trim().to_string(),
            phone: request.phone,
            email: request.email,
            span: self.window,
            party: self.party,
            table_id: Some(table_id),
            channel: request.channel.unwrap_or(Channel::Front),
            status: self.status,
            hold_expires_at,
            tags: request.tags,
            memo: request.memo,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validate a create request before any lookup happens.
pub(crate) fn validate_booking(
    request: &NewReservation,
    default_duration_minutes: i64,
) -> Result<Booking, EngineError> {
    check_customer_name(&request.customer_name)?;
    let start = request
        .start
        .ok_or_else(|| EngineError::InvalidInput("startTime is required".into()))?;
    let party = party_from(request.party_total, request.party_adult, request.party_child)?;
    let window = window_from(start, request.duration_minutes.unwrap_or(default_duration_minutes))?;

    let status = request.status.unwrap_or(Status::Hold);
    if !status.is_occupying() {
        return Err(EngineError::InvalidInput(format!(
            "a reservation cannot be created as {status}"
        )));
    }

    check_text("phone too long", request.phone.as_deref(), MAX_CONTACT_LEN)?;
    check_text("email too long", request.email.as_deref(), MAX_CONTACT_LEN)?;
    check_text("memo too long", request.memo.as_deref(), MAX_MEMO_LEN)?;
    check_text("createdBy too long", request.created_by.as_deref(), MAX_NAME_LEN)?;
    check_tags(&request.tags)?;

    Ok(Booking {
        window,
        party,
        status,
    })
}

/// The next version of a reservation, and whether its table must be re-decided.
#[derive(Debug)]
pub(crate) struct Amendment {
    pub next: Reservation,
    pub reallocate: bool,
}

/// Resolve a patch against the current record. Pure: no table is chosen here.
///
/// The table is re-decided when the resulting status occupies and either the
/// window or head count changed, or a lapsed hold is being revived (its table
/// may have been handed out since it lapsed).
pub(crate) fn amend(
    current: &Reservation,
    patch: &ReservationPatch,
    now: Ms,
    default_hold_minutes: i64,
) -> Result<Amendment, EngineError> {
    let status = patch.status.unwrap_or(current.status);
    check_transition(current.status, status)?;

    if let Some(name) = &patch.customer_name {
        check_customer_name(name)?;
    }
    check_text("phone too long", patch.phone.as_deref(), MAX_CONTACT_LEN)?;
    check_text("email too long", patch.email.as_deref(), MAX_CONTACT_LEN)?;
    check_text("memo too long", patch.memo.as_deref(), MAX_MEMO_LEN)?;
    if let Some(tags) = &patch.tags {
        check_tags(tags)?;
    }

    let party = party_from(
        patch.party_total.unwrap_or(current.party.total),
        patch.party_adult.or(patch.party_total.is_none().then_some(current.party.adult)),
        patch.party_child.or(Some(current.party.child)),
    )?;
    let window = match (patch.start, patch.duration_minutes) {
        (None, None) => current.span,
        (Some(start), None) => {
            // Keep the exact stored length, even if it is not a whole number of minutes.
            let end = start
                .checked_add(current.span.duration_ms())
                .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
            let window = Span::new(start, end);
            validate_window(&window)?;
            window
        }
        (start, Some(minutes)) => window_from(start.unwrap_or(current.span.start), minutes)?,
    };

    let schedule_changed = window != current.span || party.total != current.party.total;
    let lapsed = current.is_lapsed(now);
    let revive = lapsed && (patch.status.is_some() || patch.hold_minutes.is_some());
    let reallocate = status.is_occupying() && (schedule_changed || revive);

    let hold_expires_at = match status {
        Status::Hold if (lapsed && reallocate) || patch.hold_minutes.is_some() => Some(hold_expiry(
            now,
            patch.hold_minutes.unwrap_or(default_hold_minutes),
        )),
        Status::Hold => current
            .hold_expires_at
            .or_else(|| Some(hold_expiry(now, default_hold_minutes))),
        _ => None,
    };

    let next = Reservation {
        id: current.id,
        customer_name: patch
            .customer_name
            .as_deref()
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| current.customer_name.clone()),
        phone: patch.phone.clone().or_else(|| current.phone.clone()),
        email: patch.email.clone().or_else(|| current.email.clone()),
        span: window,
        party,
        table_id: current.table_id,
        channel: patch.channel.unwrap_or(current.channel),
        status,
        hold_expires_at,
        tags: patch.tags.clone().unwrap_or_else(|| current.tags.clone()),
        memo: patch.memo.clone().or_else(|| current.memo.clone()),
        created_by: current.created_by.clone(),
        created_at: current.created_at,
        updated_at: now,
    };

    Ok(Amendment { next, reallocate })
}
