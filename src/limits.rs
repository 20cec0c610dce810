use crate::model::Ms;

// Tenants
pub const MAX_TENANTS: usize = 1_024;
/// PostgreSQL identifier length. Percent-encoded it still fits a file name.
pub const MAX_TENANT_NAME_LEN: usize = 63;

// Table catalog
pub const MAX_TABLES_PER_TENANT: usize = 2_000;
pub const MAX_NAME_LEN: usize = 256;

// Reservations
pub const MAX_RESERVATIONS_PER_TENANT: usize = 1_000_000;
pub const MAX_PARTY_SIZE: u32 = 1_000;
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;
pub const MIN_HOLD_MINUTES: i64 = 1;
pub const MAX_HOLD_MINUTES: i64 = 120;
pub const MAX_MEMO_LEN: usize = 4_096;
pub const MAX_CONTACT_LEN: usize = 256;
pub const MAX_TAGS: usize = 32;
pub const MAX_TAG_LEN: usize = 64;

// Slots
pub const MAX_SLOTS_PER_TENANT: usize = 100_000;
pub const MAX_ASSIGNABLE_TABLES: usize = 256;
pub const MAX_SLOT_RANGE_DAYS: i64 = 400;

// Time
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
pub const MAX_QUERY_WINDOW_MS: Ms = 400 * 24 * 3_600_000;
