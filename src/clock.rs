use chrono::{Duration, NaiveDateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// `(now - since_days, now)`; windows are never shorter than one day.
pub fn window_bounds(clock: &dyn Clock, since_days: i64) -> (NaiveDateTime, NaiveDateTime) {
    let end = clock.now();
    (end - Duration::days(since_days.max(1)), end)
}
