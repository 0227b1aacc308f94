//! Date normalization and sheet-name rendering
//!
//! Every cell that should act as a grouping key goes through [`normalize`],
//! which maps text, native date/time cells and Excel serial numbers onto a
//! single calendar date. Parsing order is fixed so the same input always
//! lands on the same date.
//!
//! Numeric day/month forms read month-first whatever the separator, so
//! `03/04/2023` and `03-04-2023` are both March 4th. When the first field
//! cannot be a month (`15/03/2023`) the fields are read day-first instead.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::types::CellValue;

/// Days from 0001-01-01 (CE day 1) to 1899-12-30, Excel's serial zero
const EXCEL_EPOCH_CE_DAYS: i32 = 693_594;

/// Largest serial Excel accepts (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Serial of 1900-03-01, the first day after Excel's fictitious 1900-02-29
const FIRST_SERIAL_AFTER_LEAP_BUG: i32 = 61;

/// Explicit formats tried after the generic parse, in order
const EXPLICIT_FORMATS: [&str; 5] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y年%m月%d日",
    "%m-%d-%Y",
    "%d/%m/%Y",
];

/// Date-time layouts the generic parse understands (time of day is dropped)
const GENERIC_DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Date-only layouts the generic parse understands.
///
/// Month-first numeric layouts come before their day-first swaps.
const GENERIC_DATE_FORMATS: [&str; 12] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Normalize a cell to a calendar date, or `None` when it is not a date
pub fn normalize(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Null => None,
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Number(n) => from_excel_serial(*n),
        CellValue::Text(s) => parse_date_str(s),
    }
}

/// Parse a date string: generic parse first, then the explicit format list
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    parse_generic(s).or_else(|| parse_explicit(s))
}

/// Interpret a number as an Excel serial date (1900 date system).
///
/// Excel counts a 1900-02-29 that never existed. Serials before it are
/// shifted by a day, and serial 60 itself reads as 1900-02-28.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let days = serial.floor() as i32;
    let days = if days < FIRST_SERIAL_AFTER_LEAP_BUG - 1 {
        days + 1
    } else {
        days
    };
    NaiveDate::from_num_days_from_ce_opt(EXCEL_EPOCH_CE_DAYS + days)
}

/// Excel serial (with fractional time of day) to a date-time
pub fn datetime_from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    let date = from_excel_serial(serial)?;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as u32;
    // 23:59:59.9 rounds up to a full day
    let seconds = seconds.min(86_399);
    let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
    Some(date.and_time(time))
}

/// Excel serial for a date-time (fractional part carries the time of day)
pub fn to_excel_serial(dt: &NaiveDateTime) -> f64 {
    let days = dt.date().num_days_from_ce() - EXCEL_EPOCH_CE_DAYS;
    let days = if days < FIRST_SERIAL_AFTER_LEAP_BUG {
        days - 1
    } else {
        days
    };
    days as f64 + dt.time().num_seconds_from_midnight() as f64 / 86_400.0
}

fn parse_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }
    for fmt in GENERIC_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Bare digit runs only count as YYYYMMDD when they are exactly 8 long
    if s.chars().all(|c| c.is_ascii_digit()) && s.len() != 8 {
        return None;
    }
    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_explicit(s: &str) -> Option<NaiveDate> {
    EXPLICIT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

//==============================================================================
// Sheet-name formats
//==============================================================================

/// Display format for per-date sheet names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// YYYY-MM-DD
    #[default]
    IsoDash,
    /// YYYY/MM/DD
    IsoSlash,
    /// YYYY年MM月DD日
    Chinese,
    /// MM-DD-YYYY
    MonthDayYear,
    /// DD/MM/YYYY
    DayMonthYear,
}

impl DateFormat {
    pub const ALL: [DateFormat; 5] = [
        DateFormat::IsoDash,
        DateFormat::IsoSlash,
        DateFormat::Chinese,
        DateFormat::MonthDayYear,
        DateFormat::DayMonthYear,
    ];

    /// Recognize a format token; unknown tokens fall back to `YYYY-MM-DD`
    pub fn from_token(token: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|f| f.token() == token.trim())
            .unwrap_or_default()
    }

    pub fn token(&self) -> &'static str {
        match self {
            DateFormat::IsoDash => "YYYY-MM-DD",
            DateFormat::IsoSlash => "YYYY/MM/DD",
            DateFormat::Chinese => "YYYY年MM月DD日",
            DateFormat::MonthDayYear => "MM-DD-YYYY",
            DateFormat::DayMonthYear => "DD/MM/YYYY",
        }
    }

    fn strftime(&self) -> &'static str {
        match self {
            DateFormat::IsoDash => "%Y-%m-%d",
            DateFormat::IsoSlash => "%Y/%m/%d",
            DateFormat::Chinese => "%Y年%m月%d日",
            DateFormat::MonthDayYear => "%m-%d-%Y",
            DateFormat::DayMonthYear => "%d/%m/%Y",
        }
    }

    pub fn render(&self, date: NaiveDate) -> String {
        date.format(self.strftime()).to_string()
    }
}

/// Render a date for a sheet name using `token`.
///
/// The result is the raw display string; characters Excel forbids in sheet
/// names (`/` for example) are replaced when the sheet is created.
pub fn format_sheet_name(date: NaiveDate, token: &str) -> String {
    DateFormat::from_token(token).render(date)
}
