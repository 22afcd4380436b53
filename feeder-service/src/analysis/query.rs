//! Caller parameters for analytical queries and their normalization.
//!
//! Everything here runs before any outbound call; a `QueryError` means the
//! analysis service is never contacted.

use serde::Deserialize;
use serde_json::Value;
use time::Date;

use crate::calendar::{self, CalendarError};

/// Sentinel codes meaning "the whole company".
pub const COMPANY_WIDE_FEEDER: &str = "private_company_feeder";
pub const COMPANY_WIDE_REGION: &str = "private_company_region";
const COMPANY_WIDE_CODE: i64 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("a start and end date are required")]
    MissingDateRange,
    #[error("invalid date '{value}': {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: CalendarError,
    },
    #[error("region and feeder codes must be integers, got {0}")]
    NonIntegerCode(String),
    #[error("a custom comparison period needs an integer costume_period")]
    MissingCustomPeriod,
}

/// Request body shared by the analysis routes. Each route reads the
/// fields it needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub region_code: Option<Value>,
    pub fidder_code: Option<Value>,
    pub company_names: Option<Vec<String>>,
    pub period: Option<String>,
    pub costume_period: Option<Value>,
    pub no_limitation_start_date: Option<String>,
    pub no_limitation_end_date: Option<String>,
    pub limitation_start_date: Option<String>,
    pub limitation_end_date: Option<String>,
}

impl AnalysisParams {
    pub fn company_names(&self) -> &[String] {
        self.company_names.as_deref().unwrap_or_default()
    }
}

/// Inclusive date range in the Gregorian calendar, with the Jalali years
/// it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
    pub years: Vec<i32>,
}

fn parse_date(raw: Option<&str>) -> Result<(Date, calendar::JalaliDate), QueryError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(QueryError::MissingDateRange)?;
    let normalized = raw.replace('/', "-");
    calendar::parse_either(&normalized).map_err(|source| QueryError::InvalidDate {
        value: raw.to_string(),
        source,
    })
}

impl DateRange {
    /// Dates may be `/` or `-` separated and written in either calendar.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, QueryError> {
        let (start, start_jalali) = parse_date(start)?;
        let (end, end_jalali) = parse_date(end)?;
        Ok(Self {
            start,
            end,
            years: calendar::years_spanned(start_jalali, end_jalali),
        })
    }

    pub fn start_str(&self) -> String {
        calendar::format_gregorian(self.start)
    }

    pub fn end_str(&self) -> String {
        calendar::format_gregorian(self.end)
    }
}

fn code(item: &Value) -> Result<Option<i64>, QueryError> {
    let bad = || QueryError::NonIntegerCode(item.to_string());
    match item {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| bad()),
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(Some(v)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Some(f as i64))
                .ok_or_else(bad),
        },
        _ => Err(bad()),
    }
}

/// Normalize a region or feeder code list.
///
/// Absent means the whole company. A list whose first entry is the
/// company-wide sentinel collapses to that code; blank entries are skipped.
pub fn parse_codes(value: Option<&Value>, sentinel: &str) -> Result<Vec<i64>, QueryError> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(vec![COMPANY_WIDE_CODE]),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    if items.first().and_then(|v| v.as_str()) == Some(sentinel) {
        return Ok(vec![COMPANY_WIDE_CODE]);
    }

    let mut codes = Vec::with_capacity(items.len());
    for item in items {
        if let Some(c) = code(item)? {
            codes.push(c);
        }
    }
    Ok(codes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisQuery {
    pub range: DateRange,
    pub regions: Vec<i64>,
    pub feeders: Vec<i64>,
}

impl AnalysisQuery {
    /// With `company_wide` the caller's codes are ignored and the whole
    /// company is queried.
    pub fn parse(params: &AnalysisParams, company_wide: bool) -> Result<Self, QueryError> {
        let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
        let (regions, feeders) = scope_codes(params, company_wide)?;
        Ok(Self {
            range,
            regions,
            feeders,
        })
    }
}

fn scope_codes(params: &AnalysisParams, company_wide: bool) -> Result<(Vec<i64>, Vec<i64>), QueryError> {
    if company_wide {
        return Ok((vec![COMPANY_WIDE_CODE], vec![COMPANY_WIDE_CODE]));
    }
    Ok((
        parse_codes(params.region_code.as_ref(), COMPANY_WIDE_REGION)?,
        parse_codes(params.fidder_code.as_ref(), COMPANY_WIDE_FEEDER)?,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
    Year,
    /// Custom window length, as given by the caller.
    Custom(i64),
}

impl Period {
    /// Missing period means yearly. Anything that is not a known alias is
    /// a custom period and needs `costume_period`.
    pub fn parse(period: Option<&str>, costume_period: Option<&Value>) -> Result<Self, QueryError> {
        match period.map(str::trim) {
            None => Ok(Self::Year),
            Some("weekly" | "week") => Ok(Self::Week),
            Some("monthly" | "month") => Ok(Self::Month),
            Some("yearly" | "year") => Ok(Self::Year),
            Some(_) => match costume_period.map(code) {
                Some(Ok(Some(days))) => Ok(Self::Custom(days)),
                _ => Err(QueryError::MissingCustomPeriod),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonQuery {
    pub base: AnalysisQuery,
    pub period: Period,
}

impl ComparisonQuery {
    pub fn parse(params: &AnalysisParams, company_wide: bool) -> Result<Self, QueryError> {
        let period = Period::parse(params.period.as_deref(), params.costume_period.as_ref())?;
        Ok(Self {
            base: AnalysisQuery::parse(params, company_wide)?,
            period,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitationQuery {
    pub regions: Vec<i64>,
    pub feeders: Vec<i64>,
    pub no_limitation: DateRange,
    pub limitation: DateRange,
}

impl LimitationQuery {
    pub fn parse(params: &AnalysisParams, company_wide: bool) -> Result<Self, QueryError> {
        let no_limitation = DateRange::parse(
            params.no_limitation_start_date.as_deref(),
            params.no_limitation_end_date.as_deref(),
        )?;
        let limitation = DateRange::parse(
            params.limitation_start_date.as_deref(),
            params.limitation_end_date.as_deref(),
        )?;
        let (regions, feeders) = scope_codes(params, company_wide)?;
        Ok(Self {
            regions,
            feeders,
            no_limitation,
            limitation,
        })
    }
}
