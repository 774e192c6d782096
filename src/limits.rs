/// Guests on one booking, whatever the service's included count.
pub const MAX_CLIENTS_PER_BOOKING: u32 = 50;
/// A booking never outlasts one day.
pub const MAX_BOOKING_MINUTES: u32 = 24 * 60;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_NOTES_LEN: usize = 1_000;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_SERVICES: usize = 256;
/// Store appends before `WalStore::compact` is worth running.
pub const COMPACT_THRESHOLD: u64 = 1_000;
