use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// Custom epoch: 2024-01-01T00:00:00Z in milliseconds since Unix epoch.
const CHAT_EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_SHIFT: u64 = WORKER_BITS + SEQUENCE_BITS;

struct Counter {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit time-ordered message ID generator.
///
/// Layout (MSB → LSB): 42-bit timestamp (ms since the chat epoch),
/// 10-bit worker ID, 12-bit per-millisecond sequence.
pub struct SnowflakeGenerator {
    worker_id: u64,
    counter: Mutex<Counter>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            (worker_id as u64) < (1 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: worker_id as u64,
            counter: Mutex::new(Counter {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut counter = self.counter.lock().unwrap();

        let mut now_ms = current_ms();

        if now_ms < counter.last_ms {
            panic!(
                "clock moved backwards: last_ms={}, now_ms={}",
                counter.last_ms, now_ms
            );
        }

        if now_ms == counter.last_ms {
            counter.sequence = (counter.sequence + 1) & SEQUENCE_MASK;
            if counter.sequence == 0 {
                // Sequence exhausted for this millisecond — wait for the next one.
                while now_ms == counter.last_ms {
                    now_ms = current_ms();
                }
            }
        } else {
            counter.sequence = 0;
        }

        counter.last_ms = now_ms;

        let ts = now_ms - CHAT_EPOCH_MS;
        ((ts << TIMESTAMP_SHIFT) | (self.worker_id << SEQUENCE_BITS) | counter.sequence) as i64
    }
}

/// Extract the creation time embedded in a generated ID.
pub fn timestamp_of(id: i64) -> DateTime<Utc> {
    let ms = ((id as u64) >> TIMESTAMP_SHIFT) + CHAT_EPOCH_MS;
    Utc.timestamp_millis_opt(ms as i64).unwrap()
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}
