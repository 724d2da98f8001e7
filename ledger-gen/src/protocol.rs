//! Shared-memory payload types for the request slot (spec.md §4.2) and the
//! record ring (spec.md §4.3).
//!
//! Two representations of each concept exist on purpose: a `Raw*` type is
//! `Copy` plain-old-data, safe to place directly into an
//! [`ledger_sync::ShmRegion`], while the ordinary (non-`Copy`) type is what
//! the rest of this crate's API actually hands callers. Per spec.md §9's
//! design note ("manual union tagging... represent the request slot as a
//! variant"), the raw tag is never exposed - callers only ever see
//! [`IdRequestMsg`] or [`Record`].

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::PAYLOAD_LEN;

/// One ID-assignment exchange between a generator and the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRequestMsg {
    /// Generator -> coordinator: "I need more ids."
    Request {
        /// Requesting generator's pid.
        requester_pid: u32,
    },
    /// Coordinator -> generator: an inclusive, disjoint id range.
    Assign {
        /// First id in the block (inclusive).
        start: u64,
        /// Last id in the block (inclusive).
        end: u64,
    },
    /// Coordinator -> generator: no ids remain; the generator should exit.
    NoMoreIds,
}

const TAG_REQUEST: u8 = 0;
const TAG_ASSIGN: u8 = 1;
const TAG_NO_MORE_IDS: u8 = 2;

/// Plain-old-data mirror of [`IdRequestMsg`], the only type ever placed in
/// the request slot's shared memory region.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawRequestSlot {
    tag: u8,
    requester_pid: u32,
    start_id: u64,
    end_id: u64,
}

impl RawRequestSlot {
    /// The all-zero slot value used to initialize the region; never
    /// observed by a reader since both sides only read after being signaled
    /// by the appropriate semaphore.
    pub fn empty() -> Self {
        Self { tag: TAG_REQUEST, requester_pid: 0, start_id: 0, end_id: 0 }
    }
}

impl From<IdRequestMsg> for RawRequestSlot {
    fn from(msg: IdRequestMsg) -> Self {
        match msg {
            IdRequestMsg::Request { requester_pid } => {
                Self { tag: TAG_REQUEST, requester_pid, start_id: 0, end_id: 0 }
            }
            IdRequestMsg::Assign { start, end } => {
                Self { tag: TAG_ASSIGN, requester_pid: 0, start_id: start, end_id: end }
            }
            IdRequestMsg::NoMoreIds => {
                Self { tag: TAG_NO_MORE_IDS, requester_pid: 0, start_id: 0, end_id: 0 }
            }
        }
    }
}

impl From<RawRequestSlot> for IdRequestMsg {
    fn from(raw: RawRequestSlot) -> Self {
        match raw.tag {
            TAG_REQUEST => IdRequestMsg::Request { requester_pid: raw.requester_pid },
            TAG_ASSIGN => IdRequestMsg::Assign { start: raw.start_id, end: raw.end_id },
            _ => IdRequestMsg::NoMoreIds,
        }
    }
}

/// One completed record, as synthesized by a generator (spec.md §3
/// `Record`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique id in `[1..=total_records]`.
    pub id: u64,
    /// PID of the generator that produced this record.
    pub producer_pid: u32,
    /// Seconds since the Unix epoch at synthesis time.
    pub timestamp: i64,
    /// Free-form payload, always under [`PAYLOAD_LEN`] bytes.
    pub payload: String,
}

impl Record {
    /// Synthesize a record for `id`, stamping it with the current process's
    /// pid, the current time, and a random alphanumeric payload (spec.md
    /// §4.5).
    pub fn synthesize(id: u64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self { id, producer_pid: std::process::id(), timestamp, payload: random_payload() }
    }
}

fn random_payload() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..PAYLOAD_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Plain-old-data mirror of [`Record`] sized to fit in the ring buffer's
/// fixed-size slots. The payload is stored as a fixed byte array with an
/// explicit length rather than a `String`, since a `String`'s heap pointer
/// would be meaningless across the process boundary `MAP_SHARED` crosses.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawRecord {
    id: u64,
    producer_pid: u32,
    timestamp: i64,
    payload_len: u16,
    payload: [u8; PAYLOAD_LEN],
}

impl RawRecord {
    /// The zeroed value used to pre-fill unused ring slots.
    pub fn empty() -> Self {
        Self { id: 0, producer_pid: 0, timestamp: 0, payload_len: 0, payload: [0u8; PAYLOAD_LEN] }
    }
}

impl From<&Record> for RawRecord {
    fn from(record: &Record) -> Self {
        let bytes = record.payload.as_bytes();
        let len = bytes.len().min(PAYLOAD_LEN);
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..len].copy_from_slice(&bytes[..len]);
        Self {
            id: record.id,
            producer_pid: record.producer_pid,
            timestamp: record.timestamp,
            payload_len: len as u16,
            payload,
        }
    }
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        let len = raw.payload_len as usize;
        let payload = String::from_utf8_lossy(&raw.payload[..len]).into_owned();
        Self { id: raw.id, producer_pid: raw.producer_pid, timestamp: raw.timestamp, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_request_message_round_trips_through_raw_form() {
        for msg in [
            IdRequestMsg::Request { requester_pid: 42 },
            IdRequestMsg::Assign { start: 1, end: 10 },
            IdRequestMsg::NoMoreIds,
        ] {
            let raw: RawRequestSlot = msg.into();
            let back: IdRequestMsg = raw.into();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn record_round_trips_through_raw_form() {
        let record = Record { id: 7, producer_pid: 123, timestamp: 999, payload: "hi-there".into() };
        let raw: RawRecord = (&record).into();
        let back: Record = raw.into();
        assert_eq!(back, record);
    }

    #[test]
    fn synthesized_payload_is_within_bounds() {
        let record = Record::synthesize(1);
        assert_eq!(record.payload.len(), PAYLOAD_LEN);
        assert!(record.payload.is_ascii());
    }
}
