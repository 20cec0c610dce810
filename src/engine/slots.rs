use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Advertised capacity per `(date, time)`. Never consulted by the allocator.
#[derive(Debug, Default)]
pub struct SlotLedger {
    by_key: BTreeMap<SlotKey, Slot>,
    key_of: HashMap<Ulid, SlotKey>,
}

impl SlotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<&Slot> {
        self.key_of.get(id).and_then(|key| self.by_key.get(key))
    }

    pub fn get_by_key(&self, key: &SlotKey) -> Option<&Slot> {
        self.by_key.get(key)
    }

    /// Slots in `(date, time)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.by_key.values()
    }

    /// Slots dated `from..=to`, in `(date, time)` order.
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = &Slot> {
        self.by_key
            .range((from, NaiveTime::MIN)..)
            .take_while(move |((date, _), _)| *date <= to)
            .map(|(_, slot)| slot)
    }

    fn put(&mut self, slot: Slot) {
        if let Some(old_key) = self.key_of.insert(slot.id, slot.key())
            && old_key != slot.key()
        {
            self.by_key.remove(&old_key);
        }
        self.by_key.insert(slot.key(), slot);
    }

    pub fn apply(&mut self, event: &Event) {
        if let Event::SlotUpserted { slot } | Event::SlotPatched { slot } = event {
            self.put(slot.clone());
        }
    }
}

fn merge(slot: &mut Slot, fields: SlotFields) {
    if let Some(v) = fields.capacity_remains {
        slot.capacity_remains = v;
    }
    if let Some(v) = fields.assignable_table_ids {
        slot.assignable_table_ids = v;
    }
    if let Some(v) = fields.staff_id {
        slot.staff_id = Some(v);
    }
    if let Some(v) = fields.open_flag {
        slot.open_flag = v;
    }
    if let Some(v) = fields.seat_time_minutes {
        slot.seat_time_minutes = v;
    }
    if let Some(v) = fields.overbook_buffer {
        slot.overbook_buffer = v;
    }
    if let Some(v) = fields.notes {
        slot.notes = Some(v);
    }
}

fn check_fields(fields: &SlotFields) -> Result<(), EngineError> {
    if fields
        .assignable_table_ids
        .as_ref()
        .is_some_and(|ids| ids.len() > MAX_ASSIGNABLE_TABLES)
    {
        return Err(EngineError::LimitExceeded("too many assignable tables"));
    }
    if fields.seat_time_minutes == Some(0) {
        return Err(EngineError::InvalidInput("seatTimeMinutes must be positive".into()));
    }
    if fields
        .seat_time_minutes
        .is_some_and(|m| i64::from(m) > MAX_DURATION_MINUTES)
    {
        return Err(EngineError::LimitExceeded("seat time too long"));
    }
    if fields.notes.as_ref().is_some_and(|n| n.len() > MAX_MEMO_LEN) {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

fn blank_slot(date: NaiveDate, time: NaiveTime) -> Slot {
    Slot {
        id: Ulid::new(),
        date,
        time,
        capacity_remains: 0,
        assignable_table_ids: Vec::new(),
        staff_id: None,
        open_flag: OpenFlag::Open,
        seat_time_minutes: 90,
        overbook_buffer: 0,
        notes: None,
    }
}

impl Engine {
    /// Create-or-update keyed by `(date, time)`. Omitted fields keep their
    /// stored value, or the default on insert. Repeating the same upsert
    /// writes nothing.
    pub async fn upsert_slot(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        fields: SlotFields,
    ) -> Result<Slot, EngineError> {
        check_fields(&fields)?;

        let mut ledger = self.slots.write().await;
        let (mut slot, existed) = match ledger.get_by_key(&(date, time)) {
            Some(existing) => (existing.clone(), true),
            None => {
                if ledger.len() >= MAX_SLOTS_PER_TENANT {
                    return Err(EngineError::LimitExceeded("too many slots"));
                }
                (blank_slot(date, time), false)
            }
        };
        merge(&mut slot, fields);

        if existed && ledger.get_by_key(&(date, time)) == Some(&slot) {
            debug!("slot {date} {time} unchanged");
            return Ok(slot);
        }
        self.commit_slot(&mut ledger, Event::SlotUpserted { slot: slot.clone() })
            .await?;
        Ok(slot)
    }

    pub async fn patch_slot(&self, id: Ulid, patch: SlotPatch) -> Result<Slot, EngineError> {
        check_fields(&patch.fields)?;

        let mut ledger = self.slots.write().await;
        let current = ledger.get(&id).ok_or(EngineError::NotFound(id))?;
        let mut slot = current.clone();
        slot.date = patch.date.unwrap_or(slot.date);
        slot.time = patch.time.unwrap_or(slot.time);
        if slot.key() != current.key()
            && ledger.get_by_key(&slot.key()).is_some()
        {
            return Err(EngineError::SlotTaken {
                date: slot.date,
                time: slot.time,
            });
        }
        merge(&mut slot, patch.fields);

        if ledger.get(&id) == Some(&slot) {
            return Ok(slot);
        }
        self.commit_slot(&mut ledger, Event::SlotPatched { slot: slot.clone() })
            .await?;
        Ok(slot)
    }

    /// Slots dated `from..=to` inclusive, ordered by `(date, time)`.
    pub async fn list_slots(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        if to < from {
            return Err(EngineError::InvalidInput("slot range end is before its start".into()));
        }
        if (to - from).num_days() > MAX_SLOT_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("slot range too wide"));
        }
        let ledger = self.slots.read().await;
        Ok(ledger.range(from, to).cloned().collect())
    }
}
