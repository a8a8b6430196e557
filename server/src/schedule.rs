//! Date and time understanding for the booking dialogue, plus the business
//! calendar that decides which slots can be offered at all.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc,
    Weekday,
};
use regex::Regex;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"));
static DAY_FIRST_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{4}|\d{2}))?\b").expect("valid regex")
});
static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:alle|ore|at|h)\s+)*(\d{1,2})(?:\s*[:.h]\s*(\d{2}))?\s*(a\.?m\.?|p\.?m\.?|h)?$",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub days: Vec<Weekday>,
    pub slot_minutes: u32,
    pub utc_offset: FixedOffset,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            slot_minutes: 30,
            utc_offset: FixedOffset::east_opt(3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRejection {
    Past,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRejection {
    OutsideHours,
    Misaligned,
    Past,
}

impl BusinessHours {
    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.utc_offset).naive_local()
    }

    pub fn check_date(&self, date: NaiveDate, today: NaiveDate) -> Result<(), DateRejection> {
        if date < today {
            return Err(DateRejection::Past);
        }
        if !self.days.contains(&date.weekday()) {
            return Err(DateRejection::Closed);
        }
        Ok(())
    }

    pub fn check_time(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<(), TimeRejection> {
        let slot = Duration::minutes(i64::from(self.slot_minutes));
        let (end, wrapped) = time.overflowing_add_signed(slot);
        if time < self.open || wrapped != 0 || end > self.close {
            return Err(TimeRejection::OutsideHours);
        }
        if (time - self.open).num_minutes() % i64::from(self.slot_minutes) != 0 {
            return Err(TimeRejection::Misaligned);
        }
        if date.and_time(time) <= now {
            return Err(TimeRejection::Past);
        }
        Ok(())
    }

    pub fn hours_label(&self) -> String {
        format!("{}-{}", self.open.format("%H:%M"), self.close.format("%H:%M"))
    }
}

/// Parses the date forms a visitor is likely to type. Day-first when ambiguous.
pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = input.trim().to_lowercase();
    match text.trim_end_matches(['.', '!']) {
        "oggi" | "today" => return Some(today),
        "domani" | "tomorrow" => return today.succ_opt(),
        "dopodomani" | "day after tomorrow" | "the day after tomorrow" => {
            return today.succ_opt()?.succ_opt()
        }
        _ => {}
    }

    if let Some(caps) = ISO_DATE.captures(&text) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let caps = DAY_FIRST_DATE.captures(&text)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    match caps.get(3) {
        Some(year) => {
            let mut year: i32 = year.as_str().parse().ok()?;
            if year < 100 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        }
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year >= today {
                Some(this_year)
            } else {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            }
        }
    }
}

pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let text = input.trim().to_lowercase();
    let text = text.trim_end_matches(['.', '!']).trim();
    let caps = CLOCK_TIME.captures(text)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.get(3).and_then(|m| m.as_str().chars().next()) {
        Some('a') => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if hour == 12 {
                hour = 0;
            }
        }
        Some('p') => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if hour != 12 {
                hour += 12;
            }
        }
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
