//! Time sources for freshness and lease decisions.

use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

use crate::util::lock::mutex_lock;

const SOURCE: &str = "util::clock";

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A manually advanced clock, for tools and tests that replay time.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = mutex_lock(&self.now, SOURCE, "advance");
        *guard += by;
    }

    pub fn set(&self, now: OffsetDateTime) {
        *mutex_lock(&self.now, SOURCE, "set") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, SOURCE, "now")
    }
}
