//! Weekday listener

use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use super::EventListener;

/// Event is the lowercase local weekday name (`monday` ... `sunday`)
#[derive(Debug, Clone, Default)]
pub struct WeekdayListener;

impl EventListener for WeekdayListener {
    fn kind(&self) -> &'static str {
        "weekday"
    }

    fn event(&self) -> String {
        weekday_event(Local::now().naive_local())
    }

    fn time_until_next_event(&self) -> Duration {
        until_midnight(Local::now().naive_local())
    }
}

fn weekday_event(now: NaiveDateTime) -> String {
    now.format("%A").to_string().to_lowercase()
}

fn until_midnight(now: NaiveDateTime) -> Duration {
    let next_midnight = now
        .date()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0));

    match next_midnight {
        Some(midnight) => (midnight - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(60 * 60 * 24),
    }
}
