//! src/util/clock.rs
//!
//! Wall-clock source for trash timestamps. Injected so that trash names are
//! deterministic under test.

use std::fmt::Debug;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<Local> = Local::now();
        now.naive_local()
    }
}

/// Frozen clock.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Builds a clock frozen at the given local date and time. Returns `None`
    /// for impossible dates.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date: NaiveDate| date.and_hms_opt(hour, min, sec))
            .map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
