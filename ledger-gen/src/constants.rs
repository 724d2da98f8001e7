//! Tuning constants for Core A (spec.md §4.2-§4.6).

/// Maximum number of ids handed out per REQUEST reply (spec.md §4.2).
pub const ID_BLOCK_SIZE: u64 = 10;

/// Fixed capacity of the record ring (spec.md §4.3 example value).
pub const RECORD_BUFFER_SIZE: usize = 32;

/// Half of the coordinator's idle bounded-wait slice (spec.md §4.6: "a
/// timeout (~200 ms)"). The main loop spends this long waiting on the
/// record ring, then this long again waiting on the request channel,
/// before re-checking termination - the two halves sum to the ~200ms the
/// spec names.
pub const IDLE_WAIT_SLICE_MS: u64 = 100;

/// Magic number stamping the request-slot shared memory region.
pub const REQUEST_SLOT_MAGIC: u64 = 0x4c44_4752_5153_4c54; // "LDGRQSLT" (truncated)

/// Magic number stamping the record-ring shared memory region.
pub const RECORD_RING_MAGIC: u64 = 0x4c44_4752_5247_534c; // "LDGRRGSL" (truncated)

/// Upper bound on a synthesized payload's length, well under
/// `ledger_csv::MAX_PAYLOAD_LEN`.
pub const PAYLOAD_LEN: usize = 24;
