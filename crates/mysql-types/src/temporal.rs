//! Date and time values as MySQL represents them.
//!
//! These types mirror the wire format rather than a calendar library, so
//! values such as `0000-00-00` and `-838:59:59` survive a round trip.
//! Conversions to `chrono` types live behind the `chrono` feature.

use std::fmt;

use crate::error::TypeError;

/// A DATE value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Date {
    /// Year (0-9999).
    pub year: u16,
    /// Month (0-12, 0 only in zero dates).
    pub month: u8,
    /// Day (0-31, 0 only in zero dates).
    pub day: u8,
}

impl Date {
    /// Create a date.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Whether this is the zero date `0000-00-00`.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }

    /// Parse `YYYY-MM-DD`.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidDateTime(text.to_owned());
        let mut parts = text.splitn(3, '-');
        let year = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let month = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let day = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if month > 12 || day > 31 {
            return Err(invalid());
        }
        Ok(Self { year, month, day })
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A TIME value: a signed duration of up to 838 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Time {
    /// Whether the duration is negative.
    pub negative: bool,
    /// Hours, with days already folded in.
    pub hours: u32,
    /// Minutes (0-59).
    pub minutes: u8,
    /// Seconds (0-59).
    pub seconds: u8,
    /// Microseconds (0-999999).
    pub microseconds: u32,
}

impl Time {
    /// Create a non-negative time.
    #[must_use]
    pub const fn new(hours: u32, minutes: u8, seconds: u8, microseconds: u32) -> Self {
        Self {
            negative: false,
            hours,
            minutes,
            seconds,
            microseconds,
        }
    }

    /// Whether this is `00:00:00`.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0 && self.microseconds == 0
    }

    /// Parse `[-]H+:MM:SS[.ffffff]`.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidDateTime(text.to_owned());
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (clock, microseconds) = split_fraction(rest).ok_or_else(invalid)?;
        let mut parts = clock.splitn(3, ':');
        let hours = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let minutes: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let seconds: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if minutes > 59 || seconds > 59 {
            return Err(invalid());
        }
        Ok(Self {
            negative,
            hours,
            minutes,
            seconds,
            microseconds,
        })
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        if self.microseconds > 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }
        Ok(())
    }
}

/// A DATETIME or TIMESTAMP value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DateTime {
    /// Year.
    pub year: u16,
    /// Month.
    pub month: u8,
    /// Day.
    pub day: u8,
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
    /// Microseconds (0-999999).
    pub microsecond: u32,
}

impl DateTime {
    /// Create a datetime.
    #[must_use]
    pub const fn new(date: Date, hour: u8, minute: u8, second: u8, microsecond: u32) -> Self {
        Self {
            year: date.year,
            month: date.month,
            day: date.day,
            hour,
            minute,
            second,
            microsecond,
        }
    }

    /// Date part.
    #[must_use]
    pub const fn date(&self) -> Date {
        Date::new(self.year, self.month, self.day)
    }

    /// Whether this is `0000-00-00 00:00:00`.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.date().is_zero()
            && self.hour == 0
            && self.minute == 0
            && self.second == 0
            && self.microsecond == 0
    }

    /// Parse `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidDateTime(text.to_owned());
        let (date_part, time_part) = match text.split_once([' ', 'T']) {
            Some((d, t)) => (d, Some(t)),
            None => (text, None),
        };
        let date = Date::parse(date_part)?;
        let Some(time_part) = time_part else {
            return Ok(Self::new(date, 0, 0, 0, 0));
        };
        let time = Time::parse(time_part)?;
        if time.negative || time.hours > 23 {
            return Err(invalid());
        }
        Ok(Self::new(
            date,
            time.hours as u8,
            time.minutes,
            time.seconds,
            time.microseconds,
        ))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date(),
            self.hour,
            self.minute,
            self.second
        )?;
        if self.microsecond > 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

/// Split `HH:MM:SS.ffffff` into the clock part and microseconds.
fn split_fraction(text: &str) -> Option<(&str, u32)> {
    match text.split_once('.') {
        None => Some((text, 0)),
        Some((clock, frac)) => {
            if frac.is_empty() || frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let digits: u32 = frac.parse().ok()?;
            Some((clock, digits * 10u32.pow(6 - frac.len() as u32)))
        }
    }
}

#[cfg(feature = "chrono")]
mod chrono_impls {
    use super::{Date, DateTime, Time};
    use crate::error::TypeError;
    use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

    impl TryFrom<Date> for NaiveDate {
        type Error = TypeError;

        fn try_from(d: Date) -> Result<Self, Self::Error> {
            NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))
                .ok_or_else(|| TypeError::InvalidDateTime(d.to_string()))
        }
    }

    impl From<NaiveDate> for Date {
        fn from(d: NaiveDate) -> Self {
            Date::new(d.year().clamp(0, 9999) as u16, d.month() as u8, d.day() as u8)
        }
    }

    impl TryFrom<DateTime> for NaiveDateTime {
        type Error = TypeError;

        fn try_from(dt: DateTime) -> Result<Self, Self::Error> {
            let date = NaiveDate::try_from(dt.date())?;
            date.and_hms_micro_opt(
                u32::from(dt.hour),
                u32::from(dt.minute),
                u32::from(dt.second),
                dt.microsecond,
            )
            .ok_or_else(|| TypeError::InvalidDateTime(dt.to_string()))
        }
    }

    impl From<NaiveDateTime> for DateTime {
        fn from(dt: NaiveDateTime) -> Self {
            DateTime::new(
                dt.date().into(),
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond().min(999_999_999) / 1000,
            )
        }
    }

    impl TryFrom<Time> for NaiveTime {
        type Error = TypeError;

        fn try_from(t: Time) -> Result<Self, Self::Error> {
            if t.negative || t.hours > 23 {
                return Err(TypeError::OutOfRange {
                    target_type: "NaiveTime",
                });
            }
            NaiveTime::from_hms_micro_opt(
                t.hours,
                u32::from(t.minutes),
                u32::from(t.seconds),
                t.microseconds,
            )
            .ok_or_else(|| TypeError::InvalidDateTime(t.to_string()))
        }
    }

    impl From<NaiveTime> for Time {
        fn from(t: NaiveTime) -> Self {
            Time::new(
                t.hour(),
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond().min(999_999_999) / 1000,
            )
        }
    }
}
