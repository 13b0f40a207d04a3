//! Snowflake-style 64-bit id generator, ported conceptually from
//! `pm_common/id_generator.py::SnowflakeIdGenerator`: 41 bits of
//! millisecond timestamp since a custom epoch, 10 bits of machine id, 12
//! bits of per-millisecond sequence.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const CUSTOM_EPOCH_MS: i64 = 1_700_000_000_000;
const MACHINE_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_MACHINE_ID: u16 = (1 << MACHINE_ID_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

struct State {
    last_timestamp_ms: i64,
    sequence: u16,
}

/// Thread-safe id generator. One instance is shared per process; the
/// in-memory store constructs one and uses it for orders, trades, and
/// ledger entries.
pub struct SnowflakeIdGenerator {
    machine_id: u16,
    state: Mutex<State>,
}

impl SnowflakeIdGenerator {
    pub fn new(machine_id: u16) -> Self {
        assert!(
            machine_id <= MAX_MACHINE_ID,
            "machine_id must fit in {MACHINE_ID_BITS} bits"
        );
        SnowflakeIdGenerator {
            machine_id,
            state: Mutex::new(State {
                last_timestamp_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> i64 {
        let mut state = self.state.lock().expect("snowflake state mutex poisoned");
        let mut now = current_millis();
        if now < state.last_timestamp_ms {
            // Clock moved backwards; stall on the last timestamp instead of
            // emitting a duplicate or a lower id.
            now = state.last_timestamp_ms;
        }
        if now == state.last_timestamp_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                now = wait_next_millis(now);
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp_ms = now;

        let ts_part = (now - CUSTOM_EPOCH_MS) as i64;
        (ts_part << (MACHINE_ID_BITS + SEQUENCE_BITS))
            | ((self.machine_id as i64) << SEQUENCE_BITS)
            | state.sequence as i64
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

fn wait_next_millis(current: i64) -> i64 {
    let mut now = current_millis();
    while now <= current {
        std::thread::yield_now();
        now = current_millis();
    }
    now
}
