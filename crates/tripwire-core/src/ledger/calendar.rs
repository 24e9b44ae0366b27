// ── Calendar windows ──

use chrono::{DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveTime, Offset, Utc, Weekday};

use crate::model::Window;

/// Time zone used to evaluate calendar boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's local time zone, re-evaluated on every call so DST and
    /// zone changes take effect.
    #[default]
    Local,
    Fixed(FixedOffset),
}

/// Maps instants onto local dates and window start boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub zone: Zone,
    pub week_start: Weekday,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            zone: Zone::Local,
            week_start: Weekday::Mon,
        }
    }
}

impl Calendar {
    pub fn fixed(offset: FixedOffset, week_start: Weekday) -> Self {
        Self {
            zone: Zone::Fixed(offset),
            week_start,
        }
    }

    pub fn utc() -> Self {
        Self::fixed(Utc.fix(), Weekday::Mon)
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self.zone {
            Zone::Local => at.with_timezone(&Local).date_naive(),
            Zone::Fixed(offset) => at.with_timezone(&offset).date_naive(),
        }
    }

    /// First local date of the calendar window containing `at`. `None`
    /// for windows that are not calendar aligned (`Hour`, `AllTime`).
    pub fn window_start(&self, window: Window, at: DateTime<Utc>) -> Option<NaiveDate> {
        let date = self.local_date(at);
        match window {
            Window::Today => Some(date),
            Window::Week => {
                let back = (7 + date.weekday().num_days_from_monday()
                    - self.week_start.num_days_from_monday())
                    % 7;
                Some(
                    date.checked_sub_days(Days::new(u64::from(back)))
                        .unwrap_or(date),
                )
            }
            Window::Month => Some(date.with_day(1).unwrap_or(date)),
            Window::Hour | Window::AllTime => None,
        }
    }

    /// Start of `date` in this calendar, as a UTC instant.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self.zone {
            Zone::Local => midnight
                .and_local_timezone(Local)
                .earliest()
                .map_or_else(|| midnight.and_utc(), |t| t.with_timezone(&Utc)),
            Zone::Fixed(offset) => midnight
                .and_local_timezone(offset)
                .earliest()
                .map_or_else(|| midnight.and_utc(), |t| t.with_timezone(&Utc)),
        }
    }
}
