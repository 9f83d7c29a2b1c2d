use chrono::{DateTime, Days, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// Fires once a day at `hour:minute` wall-clock time in `tz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    hour: u32,
    minute: u32,
    tz: Tz,
}

impl DailyTrigger {
    /// Builds a trigger, rejecting out-of-range fields.
    ///
    /// Takes `i64` so that negative or oversized caller input is reported
    /// as is instead of wrapping.
    pub fn validated(hour: i64, minute: i64, tz: Tz) -> Result<Self, ValidationError> {
        if !(0..=23).contains(&hour) {
            return Err(ValidationError::HourOutOfRange(hour));
        }
        if !(0..=59).contains(&minute) {
            return Err(ValidationError::MinuteOutOfRange(minute));
        }

        Ok(Self {
            hour: hour as u32,
            minute: minute as u32,
            tz,
        })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// "HH:MM"
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    pub fn describe(&self) -> String {
        format!("daily at {} ({})", self.time_label(), self.tz.name())
    }

    /// First firing strictly after `now`.
    ///
    /// A wall-clock time that does not exist on some day (DST gap) is
    /// skipped for that day; an ambiguous one fires at its earlier
    /// instance.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.tz).date_naive();

        for offset in 0..8 {
            let date = today.checked_add_days(Days::new(offset))?;
            let wall = date.and_hms_opt(self.hour, self.minute, 0)?;
            let Some(local) = self.tz.from_local_datetime(&wall).earliest() else {
                continue;
            };

            let at = local.with_timezone(&Utc);
            if at > now {
                return Some(at);
            }
        }
        None
    }
}

/// What to do with a job whose scheduled time has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// Not due yet
    Wait,
    /// Due, and within the grace window
    Run,
    /// Late by more than the grace window
    Misfire,
}

pub fn firing_decision(scheduled: DateTime<Utc>, now: DateTime<Utc>, grace: TimeDelta) -> Firing {
    if now < scheduled {
        Firing::Wait
    } else if now - scheduled <= grace {
        Firing::Run
    } else {
        Firing::Misfire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sao_paulo(hour: i64, minute: i64) -> DailyTrigger {
        DailyTrigger::validated(hour, minute, chrono_tz::America::Sao_Paulo).unwrap()
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let tz = chrono_tz::America::Sao_Paulo;
        assert_eq!(
            DailyTrigger::validated(25, 0, tz),
            Err(ValidationError::HourOutOfRange(25))
        );
        assert_eq!(
            DailyTrigger::validated(-1, 0, tz),
            Err(ValidationError::HourOutOfRange(-1))
        );
        assert_eq!(
            DailyTrigger::validated(9, 60, tz),
            Err(ValidationError::MinuteOutOfRange(60))
        );
        assert!(DailyTrigger::validated(23, 59, tz).is_ok());
        assert!(DailyTrigger::validated(0, 0, tz).is_ok());
    }

    #[test]
    fn next_run_is_later_today_in_local_time() {
        // 08:00 in São Paulo (UTC-3)
        let now = utc("2024-03-05T11:00:00Z");
        assert_eq!(sao_paulo(9, 0).next_after(now), Some(utc("2024-03-05T12:00:00Z")));
    }

    #[test]
    fn next_run_rolls_to_tomorrow_once_passed() {
        // 10:00 local, and exactly at the firing instant
        assert_eq!(
            sao_paulo(9, 0).next_after(utc("2024-03-05T13:00:00Z")),
            Some(utc("2024-03-06T12:00:00Z"))
        );
        assert_eq!(
            sao_paulo(9, 0).next_after(utc("2024-03-05T12:00:00Z")),
            Some(utc("2024-03-06T12:00:00Z"))
        );
    }

    #[test]
    fn local_date_differs_from_utc_date() {
        // 23:30 local on the 5th is already the 6th in UTC
        let now = utc("2024-03-06T02:30:00Z");
        assert_eq!(sao_paulo(23, 45).next_after(now), Some(utc("2024-03-06T02:45:00Z")));
    }

    #[test]
    fn gap_day_is_skipped() {
        // São Paulo skipped 00:00-01:00 on 2018-11-04
        let now = utc("2018-11-03T12:00:00Z");
        let next = sao_paulo(0, 30).next_after(now).unwrap();
        assert_eq!(next, utc("2018-11-05T02:30:00Z"));
    }

    #[test]
    fn labels() {
        let t = sao_paulo(7, 5);
        assert_eq!(t.time_label(), "07:05");
        assert_eq!(t.describe(), "daily at 07:05 (America/Sao_Paulo)");
    }

    #[test]
    fn misfire_window() {
        let at = utc("2024-03-05T12:00:00Z");
        let grace = TimeDelta::seconds(3600);

        assert_eq!(firing_decision(at, utc("2024-03-05T11:59:59Z"), grace), Firing::Wait);
        assert_eq!(firing_decision(at, at, grace), Firing::Run);
        assert_eq!(firing_decision(at, utc("2024-03-05T13:00:00Z"), grace), Firing::Run);
        assert_eq!(
            firing_decision(at, utc("2024-03-05T13:00:01Z"), grace),
            Firing::Misfire
        );
    }
}
