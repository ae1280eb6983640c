//! Month grids and date helpers for the presentation layer.
//!
//! Everything here is pure: the same inputs always give the same output,
//! and no function fails for a valid `NaiveDate`.

use chrono::{Datelike, Days, Locale, NaiveDate};
use serde::Serialize;

use crate::engine::BookingError;
use crate::limits::MINUTES_PER_DAY;
use crate::model::Minute;

/// One grid cell. `day_of_month` is `None` for leading padding; `date` is
/// still the real calendar date shown in that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub day_of_month: Option<u32>,
    pub date: NaiveDate,
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn first_of_month(reference: NaiveDate) -> NaiveDate {
    reference - Days::new(u64::from(reference.day0()))
}

/// Weekday of the month's first day, 0 = Sunday.
pub fn first_weekday_offset(reference: NaiveDate) -> u32 {
    first_of_month(reference).weekday().num_days_from_sunday()
}

/// `offset` leading `None`s followed by `1..=days_in_month`. No trailing
/// padding; consumers fill the last row themselves.
pub fn calendar_days(reference: NaiveDate) -> Vec<Option<u32>> {
    let offset = first_weekday_offset(reference);
    let days = days_in_month(reference.year(), reference.month());
    let mut cells = Vec::with_capacity((offset + days) as usize);
    cells.extend((0..offset).map(|_| None));
    cells.extend((1..=days).map(Some));
    cells
}

/// Same layout as [`calendar_days`] with each cell's date attached.
pub fn calendar_grid(reference: NaiveDate) -> Vec<CalendarDay> {
    let first = first_of_month(reference);
    let offset = u64::from(first_weekday_offset(reference));
    calendar_days(reference)
        .into_iter()
        .enumerate()
        .map(|(i, day_of_month)| {
            let i = i as u64;
            let date = if i < offset {
                first.checked_sub_days(Days::new(offset - i)).unwrap_or(first)
            } else {
                first + Days::new(i - offset)
            };
            CalendarDay { day_of_month, date }
        })
        .collect()
}

/// Compares year, month and day only.
pub fn is_same_day<A: Datelike, B: Datelike>(a: &A, b: &B) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Long form, e.g. "Saturday, June 1, 2024" under `en_US`.
pub fn format_full_date(date: NaiveDate, locale: Locale) -> String {
    date.format_localized("%A, %B %-d, %Y", locale).to_string()
}

pub fn format_day_name(date: NaiveDate, locale: Locale) -> String {
    date.format_localized("%A", locale).to_string()
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| BookingError::InvalidSlot(format!("bad date {s:?}: {e}")))
}

/// `HH:MM` to minutes since midnight. `24:00` is accepted as end of day.
pub fn parse_time_of_day(s: &str) -> Result<Minute, BookingError> {
    let bad = || BookingError::InvalidSlot(format!("bad time {s:?}, expected HH:MM"));
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if h.is_empty() || h.len() > 2 || m.len() != 2 || !digits(h) || !digits(m) {
        return Err(bad());
    }
    let hours: Minute = h.parse().map_err(|_| bad())?;
    let minutes: Minute = m.parse().map_err(|_| bad())?;
    if minutes >= 60 {
        return Err(bad());
    }
    let total = hours * 60 + minutes;
    if total > MINUTES_PER_DAY {
        return Err(bad());
    }
    Ok(total)
}

pub fn format_time_of_day(minutes: Minute) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Map a POSIX locale name to a chrono locale; `None` if unsupported.
pub fn locale_from_name(name: &str) -> Option<Locale> {
    let locale = match name.trim() {
        "en_US" | "en-US" => Locale::en_US,
        "en_GB" | "en-GB" => Locale::en_GB,
        "ja_JP" | "ja-JP" => Locale::ja_JP,
        "de_DE" | "de-DE" => Locale::de_DE,
        "fr_FR" | "fr-FR" => Locale::fr_FR,
        "es_ES" | "es-ES" => Locale::es_ES,
        _ => return None,
    };
    Some(locale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn june_2024_starts_on_saturday() {
        let days = calendar_days(date(2024, 6, 15));
        assert_eq!(first_weekday_offset(date(2024, 6, 15)), 6);
        assert_eq!(days.len(), 6 + 30);
        assert!(days[..6].iter().all(Option::is_none));
        assert_eq!(days[6], Some(1));
        assert_eq!(days.last(), Some(&Some(30)));
    }

    #[test]
    fn month_starting_on_sunday_has_no_padding() {
        // 2024-09-01 is a Sunday
        let days = calendar_days(date(2024, 9, 30));
        assert_eq!(days.len(), 30);
        assert_eq!(days[0], Some(1));
    }

    #[test]
    fn leap_february() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        // 2024-02-01 is a Thursday
        let days = calendar_days(date(2024, 2, 10));
        assert_eq!(days.len(), 4 + 29);
    }

    #[test]
    fn length_matches_offset_plus_days_for_every_month() {
        for year in [1999, 2000, 2023, 2024, 2100] {
            for month in 1..=12 {
                let d = date(year, month, 1);
                let days = calendar_days(d);
                let offset = first_weekday_offset(d) as usize;
                let expected_days = days_in_month(year, month) as usize;
                assert_eq!(days.len(), offset + expected_days, "{year}-{month}");
                assert_eq!(days.iter().take_while(|c| c.is_none()).count(), offset);
                assert_eq!(days.iter().filter(|c| c.is_none()).count(), offset);
                // chrono agrees on the month length
                assert!(d.with_day(expected_days as u32).is_some());
                assert!(d.with_day(expected_days as u32 + 1).is_none());
            }
        }
    }

    #[test]
    fn reference_day_does_not_matter() {
        assert_eq!(calendar_days(date(2024, 3, 1)), calendar_days(date(2024, 3, 31)));
    }

    #[test]
    fn grid_attaches_real_dates() {
        let grid = calendar_grid(date(2024, 6, 1));
        assert_eq!(grid.len(), 36);
        assert_eq!(grid[0].day_of_month, None);
        assert_eq!(grid[0].date, date(2024, 5, 26));
        assert_eq!(grid[5].date, date(2024, 5, 31));
        assert_eq!(grid[6], CalendarDay { day_of_month: Some(1), date: date(2024, 6, 1) });
        assert_eq!(grid[35].date, date(2024, 6, 30));
    }

    #[test]
    fn same_day_ignores_time() {
        let morning = NaiveDateTime::new(date(2024, 6, 1), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let night = NaiveDateTime::new(date(2024, 6, 1), NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        assert!(is_same_day(&morning, &night));
        assert!(is_same_day(&morning, &date(2024, 6, 1)));
        assert!(!is_same_day(&morning, &date(2024, 6, 2)));
        assert!(!is_same_day(&date(2023, 6, 1), &date(2024, 6, 1)));
    }

    #[test]
    fn full_date_formatting() {
        let d = date(2024, 6, 1);
        assert_eq!(format_full_date(d, Locale::en_US), "Saturday, June 1, 2024");
        assert_eq!(format_day_name(d, Locale::en_US), "Saturday");
        // deterministic for a fixed locale
        assert_eq!(format_full_date(d, Locale::fr_FR), format_full_date(d, Locale::fr_FR));
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!(parse_time_of_day("00:00").unwrap(), 0);
        assert_eq!(parse_time_of_day("09:30").unwrap(), 570);
        assert_eq!(parse_time_of_day("9:30").unwrap(), 570);
        assert_eq!(parse_time_of_day("24:00").unwrap(), 1440);
        assert!(parse_time_of_day("24:01").is_err());
        assert!(parse_time_of_day("12:60").is_err());
        assert!(parse_time_of_day("1230").is_err());
        assert!(parse_time_of_day("ab:cd").is_err());
        assert!(parse_time_of_day(":30").is_err());
        assert!(parse_time_of_day("09:+5").is_err());
        assert!(parse_time_of_day("+9:30").is_err());
        assert!(parse_time_of_day("-1:30").is_err());
    }

    #[test]
    fn time_of_day_formatting() {
        assert_eq!(format_time_of_day(0), "00:00");
        assert_eq!(format_time_of_day(570), "09:30");
        assert_eq!(format_time_of_day(1440), "24:00");
    }

    #[test]
    fn iso_date_parsing() {
        assert_eq!(parse_iso_date("2024-06-01").unwrap(), date(2024, 6, 1));
        assert!(parse_iso_date("2023-02-29").is_err());
        assert!(parse_iso_date("06/01/2024").is_err());
    }

    #[test]
    fn locale_names() {
        assert_eq!(locale_from_name("en_US"), Some(Locale::en_US));
        assert_eq!(locale_from_name("ja-JP"), Some(Locale::ja_JP));
        assert_eq!(locale_from_name("xx_XX"), None);
    }
}
