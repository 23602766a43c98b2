use chrono::{Local, NaiveDateTime};

pub const LABEL_FORMAT: &str = "%H:%M:%S";
pub const EVENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of wall-clock time for overlays and violation timestamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    /// `HH:MM:SS`, drawn on every frame.
    fn label(&self) -> String {
        self.now().format(LABEL_FORMAT).to_string()
    }

    /// `YYYY-MM-DD HH:MM:SS`, stored with every violation.
    fn event_timestamp(&self) -> String {
        self.now().format(EVENT_FORMAT).to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
