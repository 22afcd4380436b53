use feeder_client::domain::{CategoryBreakdown, ConsumptionRecord, HOURS_PER_DAY};
use serde::Deserialize;

use crate::calendar::{self, CalendarError};
use crate::sources::{LegacyRow, RawRow, SimpleRow};

/// What to do with a blank or absent required cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCellPolicy {
    /// Treat the cell as `0` and keep validating.
    ZeroFill,
    /// Reject the whole row.
    Reject,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub simple_tenant_id: i64,
    pub legacy_tenant_id: i64,
    pub simple_missing_cells: MissingCellPolicy,
    pub legacy_missing_cells: MissingCellPolicy,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            simple_tenant_id: 101,
            legacy_tenant_id: 3,
            simple_missing_cells: MissingCellPolicy::ZeroFill,
            legacy_missing_cells: MissingCellPolicy::Reject,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowRejected {
    #[error("line {line}: missing value for '{column}'")]
    MissingCell { line: u64, column: String },
    #[error("line {line}: '{value}' in '{column}' is not a number")]
    NotANumber {
        line: u64,
        column: String,
        value: String,
    },
    #[error("line {line}: negative value {value} in '{column}'")]
    Negative { line: u64, column: String, value: f64 },
    #[error("line {line}: {source}")]
    Date {
        line: u64,
        #[source]
        source: CalendarError,
    },
    #[error("line {line}: unreadable record: {reason}")]
    Unreadable { line: u64, reason: String },
}

impl RowRejected {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCell { .. } => "missing_cell",
            Self::NotANumber { .. } => "not_a_number",
            Self::Negative { .. } => "negative",
            Self::Date { .. } => "date",
            Self::Unreadable { .. } => "unreadable",
        }
    }
}

const CATEGORY_COLUMNS: [&str; 6] = [
    "domestic",
    "industrial",
    "agriculture",
    "commercial",
    "lighting",
    "administrative",
];

struct Cells {
    line: u64,
    policy: MissingCellPolicy,
}

impl Cells {
    fn take<'a>(&self, cell: &'a Option<String>, column: &str) -> Result<&'a str, RowRejected> {
        match (cell.as_deref(), self.policy) {
            (Some(v), _) => Ok(v),
            (None, MissingCellPolicy::ZeroFill) => Ok("0"),
            (None, MissingCellPolicy::Reject) => Err(RowRejected::MissingCell {
                line: self.line,
                column: column.to_string(),
            }),
        }
    }

    fn number(&self, value: &str, column: &str) -> Result<f64, RowRejected> {
        let parsed: f64 = value
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| RowRejected::NotANumber {
                line: self.line,
                column: column.to_string(),
                value: value.to_string(),
            })?;

        if parsed < 0.0 {
            return Err(RowRejected::Negative {
                line: self.line,
                column: column.to_string(),
                value: parsed,
            });
        }
        Ok(parsed)
    }

    /// Feeder ids arrive as `12` or, from spreadsheet exports, `12.0`.
    fn feeder_id(&self, value: &str, column: &str) -> Result<i64, RowRejected> {
        let trimmed = value.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(id);
        }
        let as_float = self.number(trimmed, column)?;
        if as_float.fract() != 0.0 || as_float.abs() >= i64::MAX as f64 {
            return Err(RowRejected::NotANumber {
                line: self.line,
                column: column.to_string(),
                value: value.to_string(),
            });
        }
        Ok(as_float as i64)
    }

    fn hours(&self, cells: &[Option<String>; HOURS_PER_DAY]) -> Result<[f64; HOURS_PER_DAY], RowRejected> {
        let mut hourly = [0.0; HOURS_PER_DAY];
        for (i, (slot, cell)) in hourly.iter_mut().zip(cells).enumerate() {
            let column = format!("H{}", i + 1);
            *slot = self.number(self.take(cell, &column)?, &column)?;
        }
        Ok(hourly)
    }

    fn date_error(&self, source: CalendarError) -> RowRejected {
        RowRejected::Date {
            line: self.line,
            source,
        }
    }
}

/// Simple-layout `is_off` is numeric (`0`/`1`, `1.0`) or a boolean word.
fn simple_flag(value: &str) -> Option<bool> {
    let v = value.trim().to_ascii_lowercase();
    match v.as_str() {
        "true" => Some(true),
        "false" => Some(false),
        other => other.parse::<f64>().ok().map(|n| n != 0.0),
    }
}

/// Legacy holiday flags are truthy only for `1` or `true`.
fn legacy_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

pub fn normalize_simple(
    row: &SimpleRow,
    tenant_id: i64,
    policy: MissingCellPolicy,
) -> Result<ConsumptionRecord, RowRejected> {
    let cells = Cells {
        line: row.line,
        policy,
    };

    let feeder_id = cells.feeder_id(cells.take(&row.fidder_id, "fidder_id")?, "fidder_id")?;
    let date = calendar::parse_gregorian(cells.take(&row.date, "date")?)
        .map_err(|e| cells.date_error(e))?;
    let is_off_raw = cells.take(&row.is_off, "is_off")?;
    let is_holiday = simple_flag(is_off_raw).ok_or_else(|| RowRejected::NotANumber {
        line: row.line,
        column: "is_off".to_string(),
        value: is_off_raw.to_string(),
    })?;
    let hourly = cells.hours(&row.hours)?;

    Ok(ConsumptionRecord {
        tenant_id,
        feeder_id,
        date,
        is_holiday,
        hourly,
        categories: CategoryBreakdown::default(),
    })
}

pub fn normalize_legacy(
    row: &LegacyRow,
    tenant_id: i64,
    policy: MissingCellPolicy,
) -> Result<ConsumptionRecord, RowRejected> {
    let cells = Cells {
        line: row.line,
        policy,
    };

    let feeder_id = cells.feeder_id(cells.take(&row.feeder_code, "feeder_code")?, "feeder_code")?;
    let date = calendar::parse_jalali(cells.take(&row.date, "date")?)
        .and_then(|j| j.to_gregorian())
        .map_err(|e| cells.date_error(e))?;
    let is_holiday = legacy_flag(cells.take(&row.holiday, "holiday")?);
    let hourly = cells.hours(&row.hours)?;

    let mut values = [0.0; 6];
    for ((slot, cell), column) in values.iter_mut().zip(&row.categories).zip(CATEGORY_COLUMNS) {
        *slot = cells.number(cells.take(cell, column)?, column)?;
    }
    let [domestic, industrial, agriculture, commercial, lighting, administrative] = values;

    Ok(ConsumptionRecord {
        tenant_id,
        feeder_id,
        date,
        is_holiday,
        hourly,
        categories: CategoryBreakdown {
            domestic,
            industrial,
            agriculture,
            commercial,
            lighting,
            administrative,
        },
    })
}

/// Maps raw rows of either layout onto canonical records, applying the
/// per-variant tenant and missing-cell policy.
#[derive(Debug, Clone, Default)]
pub struct RowNormalizer {
    options: NormalizeOptions,
}

impl RowNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn normalize(&self, row: &RawRow) -> Result<ConsumptionRecord, RowRejected> {
        let result = match row {
            RawRow::Simple(r) => normalize_simple(
                r,
                self.options.simple_tenant_id,
                self.options.simple_missing_cells,
            ),
            RawRow::Legacy(r) => normalize_legacy(
                r,
                self.options.legacy_tenant_id,
                self.options.legacy_missing_cells,
            ),
        };

        if let Err(e) = &result {
            metrics::counter!(
                "import_rows_rejected_total",
                "variant" => row.variant().as_str(),
                "reason" => e.kind()
            )
            .increment(1);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn full_hours() -> [Option<String>; HOURS_PER_DAY] {
        std::array::from_fn(|i| Some(format!("{}", i + 1)))
    }

    fn simple_row() -> SimpleRow {
        SimpleRow {
            line: 2,
            fidder_id: Some("1.0".to_string()),
            date: Some("2024-03-20".to_string()),
            is_off: Some("1".to_string()),
            hours: full_hours(),
        }
    }

    fn legacy_row() -> LegacyRow {
        LegacyRow {
            line: 2,
            feeder_code: Some("12".to_string()),
            date: Some("1403/01/01".to_string()),
            holiday: Some("TRUE".to_string()),
            hours: full_hours(),
            categories: [
                Some("0.4".to_string()),
                Some("0.25".to_string()),
                Some("0.1".to_string()),
                Some("0.12".to_string()),
                Some("0.1".to_string()),
                Some("0.03".to_string()),
            ],
        }
    }

    #[test]
    fn simple_row_normalizes_with_default_tenant() {
        let normalizer = RowNormalizer::default();
        let record = normalizer.normalize(&RawRow::Simple(simple_row())).unwrap();

        assert_eq!(record.tenant_id, 101);
        assert_eq!(record.feeder_id, 1);
        assert_eq!(record.date, date!(2024 - 03 - 20));
        assert!(record.is_holiday);
        assert_eq!(record.hourly[23], 24.0);
        assert_eq!(record.categories, CategoryBreakdown::default());
        assert_eq!(record.total_consumption(), 300.0);
    }

    #[test]
    fn legacy_row_converts_jalali_date_and_categories() {
        let normalizer = RowNormalizer::default();
        let record = normalizer.normalize(&RawRow::Legacy(legacy_row())).unwrap();

        assert_eq!(record.tenant_id, 3);
        assert_eq!(record.feeder_id, 12);
        assert_eq!(record.date, date!(2024 - 03 - 20));
        assert!(record.is_holiday);
        assert_eq!(record.categories.industrial, 0.25);
        assert_eq!(record.categories.administrative, 0.03);
    }

    #[test]
    fn missing_hour_is_zero_filled_for_simple_and_rejected_for_legacy() {
        let normalizer = RowNormalizer::default();

        let mut simple = simple_row();
        simple.hours[12] = None;
        let record = normalizer.normalize(&RawRow::Simple(simple)).unwrap();
        assert_eq!(record.hourly[12], 0.0);

        let mut legacy = legacy_row();
        legacy.hours[12] = None;
        let err = normalizer.normalize(&RawRow::Legacy(legacy)).unwrap_err();
        assert_eq!(
            err,
            RowRejected::MissingCell {
                line: 2,
                column: "H13".to_string()
            }
        );
    }

    #[test]
    fn simple_rows_can_be_made_strict() {
        let normalizer = RowNormalizer::new(NormalizeOptions {
            simple_missing_cells: MissingCellPolicy::Reject,
            ..NormalizeOptions::default()
        });
        let mut simple = simple_row();
        simple.hours[0] = None;

        assert!(matches!(
            normalizer.normalize(&RawRow::Simple(simple)),
            Err(RowRejected::MissingCell { .. })
        ));
    }

    #[test]
    fn zero_filled_date_is_still_rejected() {
        let mut simple = simple_row();
        simple.date = None;

        let err = RowNormalizer::default()
            .normalize(&RawRow::Simple(simple))
            .unwrap_err();
        assert_eq!(err.kind(), "date");
    }

    #[test]
    fn non_numeric_and_negative_readings_are_rejected() {
        let mut legacy = legacy_row();
        legacy.hours[3] = Some("n/a".to_string());
        assert!(matches!(
            normalize_legacy(&legacy, 3, MissingCellPolicy::Reject),
            Err(RowRejected::NotANumber { .. })
        ));

        let mut simple = simple_row();
        simple.hours[3] = Some("-1.5".to_string());
        assert!(matches!(
            normalize_simple(&simple, 101, MissingCellPolicy::ZeroFill),
            Err(RowRejected::Negative { .. })
        ));

        let mut simple = simple_row();
        simple.hours[3] = Some("NaN".to_string());
        assert!(matches!(
            normalize_simple(&simple, 101, MissingCellPolicy::ZeroFill),
            Err(RowRejected::NotANumber { .. })
        ));
    }

    #[test]
    fn out_of_range_feeder_ids_are_rejected() {
        for raw in ["1e30", "-1e30", "9.3e18"] {
            let mut simple = simple_row();
            simple.fidder_id = Some(raw.to_string());
            let result = normalize_simple(&simple, 101, MissingCellPolicy::ZeroFill);
            assert!(
                matches!(result, Err(RowRejected::NotANumber { .. } | RowRejected::Negative { .. })),
                "{raw} accepted as {result:?}"
            );
        }

        let mut simple = simple_row();
        simple.fidder_id = Some("1e3".to_string());
        assert_eq!(normalize_simple(&simple, 101, MissingCellPolicy::ZeroFill).unwrap().feeder_id, 1000);
    }

    #[test]
    fn invalid_jalali_date_is_rejected() {
        let mut legacy = legacy_row();
        legacy.date = Some("1402/12/30".to_string());

        assert!(matches!(
            normalize_legacy(&legacy, 3, MissingCellPolicy::Reject),
            Err(RowRejected::Date {
                source: CalendarError::InvalidDate { .. },
                ..
            })
        ));
    }

    #[test]
    fn legacy_holiday_flag_accepts_only_one_or_true() {
        for (raw, expected) in [("1", true), ("true", true), (" True ", true), ("0", false), ("yes", false)] {
            let mut legacy = legacy_row();
            legacy.holiday = Some(raw.to_string());
            let record = normalize_legacy(&legacy, 3, MissingCellPolicy::Reject).unwrap();
            assert_eq!(record.is_holiday, expected, "flag {raw:?}");
        }
    }

    #[test]
    fn simple_holiday_flag_is_numeric() {
        assert_eq!(simple_flag("1.0"), Some(true));
        assert_eq!(simple_flag("0"), Some(false));
        assert_eq!(simple_flag("false"), Some(false));
        assert_eq!(simple_flag("maybe"), None);
    }

    #[test]
    fn fractional_feeder_ids_are_rejected() {
        let mut simple = simple_row();
        simple.fidder_id = Some("1.5".to_string());
        assert!(matches!(
            normalize_simple(&simple, 101, MissingCellPolicy::ZeroFill),
            Err(RowRejected::NotANumber { .. })
        ));
    }
}
