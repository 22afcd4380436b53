//! Conversion between the solar-hijri (Jalali) calendar used by source data
//! and the Gregorian calendar used for storage and range arithmetic.
//!
//! The Jalali leap rule follows the 33-year arithmetic cycle anchored on the
//! break years below, which agrees with the astronomical calendar for every
//! year this service will see.

use std::fmt;

use time::{format_description::FormatItem, macros::format_description, Date, Month};

const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
    #[error("unparsable date '{0}'")]
    Unparsable(String),
}

fn invalid(year: i32, month: u32, day: u32) -> CalendarError {
    CalendarError::InvalidDate { year, month, day }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JalaliDate {
    year: i32,
    month: u8,
    day: u8,
}

impl JalaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, CalendarError> {
        if year < BREAKS[0] || year >= BREAKS[BREAKS.len() - 1] {
            return Err(invalid(year, month, day));
        }
        if !(1..=12).contains(&month) || day < 1 || day > month_length(year, month) {
            return Err(invalid(year, month, day));
        }
        Ok(Self {
            year,
            month: month as u8,
            day: day as u8,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month as u32
    }

    pub fn day(&self) -> u32 {
        self.day as u32
    }

    pub fn to_gregorian(&self) -> Result<Date, CalendarError> {
        let err = || invalid(self.year, self.month(), self.day());
        let cal = jal_cal(self.year).ok_or_else(err)?;
        let month = self.month as i32;
        let farvardin_first = gregorian_julian_day(cal.gregorian_year, cal.march).ok_or_else(err)?;
        let jdn = farvardin_first + (month - 1) * 31 - (month / 7) * (month - 7) + self.day as i32 - 1;
        Date::from_julian_day(jdn).map_err(|_| err())
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

struct JalCal {
    /// Years since the last leap year; 0 means `year` itself is leap.
    leap: i32,
    gregorian_year: i32,
    /// Day of March on which Farvardin 1st falls.
    march: i32,
}

fn jal_cal(jy: i32) -> Option<JalCal> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return None;
    }

    let gregorian_year = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += (jump / 33) * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += (n / 33) * 8 + ((n % 33) + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gregorian_year / 4 - ((gregorian_year / 100 + 1) * 3) / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + ((jump + 4) / 33) * 33;
    }
    let mut leap = (((n + 1) % 33) - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalCal {
        leap,
        gregorian_year,
        march,
    })
}

fn gregorian_julian_day(year: i32, march_day: i32) -> Option<i32> {
    let day = u8::try_from(march_day).ok()?;
    Date::from_calendar_date(year, Month::March, day)
        .ok()
        .map(|d| d.to_julian_day())
}

pub fn is_leap_year(jy: i32) -> bool {
    jal_cal(jy).map(|c| c.leap == 0).unwrap_or(false)
}

pub fn month_length(jy: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_leap_year(jy) => 30,
        12 => 29,
        _ => 0,
    }
}

/// Convert a Jalali calendar date to its Gregorian equivalent.
pub fn to_gregorian(year: i32, month: u32, day: u32) -> Result<Date, CalendarError> {
    JalaliDate::new(year, month, day)?.to_gregorian()
}

/// Convert a Gregorian date to the Jalali calendar.
pub fn to_jalali(date: Date) -> Result<JalaliDate, CalendarError> {
    let err = || invalid(date.year(), date.month() as u32, date.day() as u32);

    let gregorian_year = date.year();
    let mut jy = gregorian_year - 621;
    let cal = jal_cal(jy).ok_or_else(err)?;
    let farvardin_first = gregorian_julian_day(gregorian_year, cal.march).ok_or_else(err)?;

    let mut k = date.to_julian_day() - farvardin_first;
    if k >= 0 {
        if k <= 185 {
            return JalaliDate::new(jy, (1 + k / 31) as u32, (k % 31 + 1) as u32);
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if cal.leap == 1 {
            k += 1;
        }
    }

    JalaliDate::new(jy, (7 + k / 30) as u32, (k % 30 + 1) as u32)
}

/// Split `YYYY/MM/DD`, `YYYY-MM-DD` or compact `YYYYMMDD` into components.
fn split_ymd(input: &str) -> Result<(i32, u32, u32), CalendarError> {
    let s = input.trim();
    let unparsable = || CalendarError::Unparsable(input.to_string());

    let (y, m, d) = if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        (&s[0..4], &s[4..6], &s[6..8])
    } else {
        let mut parts = s.split(['-', '/']);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(y), Some(m), Some(d), None) => (y, m, d),
            _ => return Err(unparsable()),
        }
    };

    Ok((
        y.trim().parse().map_err(|_| unparsable())?,
        m.trim().parse().map_err(|_| unparsable())?,
        d.trim().parse().map_err(|_| unparsable())?,
    ))
}

/// Parse a Jalali date string.
pub fn parse_jalali(input: &str) -> Result<JalaliDate, CalendarError> {
    let (y, m, d) = split_ymd(input)?;
    JalaliDate::new(y, m, d)
}

/// Parse a Gregorian date string (`-` or `/` separated, or compact).
pub fn parse_gregorian(input: &str) -> Result<Date, CalendarError> {
    let (y, m, d) = split_ymd(input)?;
    let month = u8::try_from(m)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(|| invalid(y, m, d))?;
    let day = u8::try_from(d).map_err(|_| invalid(y, m, d))?;
    Date::from_calendar_date(y, month, day).map_err(|_| invalid(y, m, d))
}

/// `YYYY-MM-DD` rendering of a Gregorian date.
pub fn format_gregorian(date: Date) -> String {
    date.format(ISO_DATE)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", date.year(), date.month() as u8, date.day()))
}

/// Years below this are read as Jalali by [`parse_either`].
pub const JALALI_YEAR_LIMIT: i32 = 1700;

/// Parse a caller-supplied date that may be written in either calendar,
/// returning it in both. The calendar is chosen by the year.
pub fn parse_either(input: &str) -> Result<(Date, JalaliDate), CalendarError> {
    let (y, m, d) = split_ymd(input)?;
    if y < JALALI_YEAR_LIMIT {
        let jalali = JalaliDate::new(y, m, d)?;
        Ok((jalali.to_gregorian()?, jalali))
    } else {
        let date = parse_gregorian(input)?;
        Ok((date, to_jalali(date)?))
    }
}

/// Jalali years spanned by `[start, end]`, inclusive of both endpoints.
pub fn years_between(start: &str, end: &str) -> Result<Vec<i32>, CalendarError> {
    Ok(years_spanned(parse_jalali(start)?, parse_jalali(end)?))
}

/// Jalali years from `start` to `end`; empty when `end` is in an earlier year.
pub fn years_spanned(start: JalaliDate, end: JalaliDate) -> Vec<i32> {
    (start.year()..=end.year()).collect()
}
