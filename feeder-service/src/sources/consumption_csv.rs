use csv::{ReaderBuilder, StringRecord};
use feeder_client::domain::HOURS_PER_DAY;

use super::{strip_bom, SourceError, UnreadableRow};

pub const CATEGORY_COUNT: usize = 6;

/// The two supported consumption export layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    /// `fidder_id,date,is_off,H1..H24` with Gregorian dates.
    Simple,
    /// Feeder code, Jalali date, holiday flag, `H1..H24` and six category columns.
    Legacy,
}

impl SchemaVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Legacy => "legacy",
        }
    }
}

/// Cells of a simple-layout row. `None` means absent or blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleRow {
    pub line: u64,
    pub fidder_id: Option<String>,
    pub date: Option<String>,
    pub is_off: Option<String>,
    pub hours: [Option<String>; HOURS_PER_DAY],
}

/// Cells of a legacy-layout row. `None` means absent or blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyRow {
    pub line: u64,
    pub feeder_code: Option<String>,
    pub date: Option<String>,
    pub holiday: Option<String>,
    pub hours: [Option<String>; HOURS_PER_DAY],
    /// domestic, industrial, agriculture, commercial, lighting, administrative
    pub categories: [Option<String>; CATEGORY_COUNT],
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    Simple(SimpleRow),
    Legacy(LegacyRow),
}

impl RawRow {
    pub fn line(&self) -> u64 {
        match self {
            Self::Simple(r) => r.line,
            Self::Legacy(r) => r.line,
        }
    }

    pub fn variant(&self) -> SchemaVariant {
        match self {
            Self::Simple(_) => SchemaVariant::Simple,
            Self::Legacy(_) => SchemaVariant::Legacy,
        }
    }
}

const SIMPLE_FEEDER: &[&str] = &["fidder_id", "feeder_id"];
const SIMPLE_DATE: &[&str] = &["date"];
const SIMPLE_HOLIDAY: &[&str] = &["is_off"];

const LEGACY_FEEDER: &[&str] = &["کد فیدر", "feeder_code", "fidder_code", "feeder_id"];
const LEGACY_DATE: &[&str] = &["تاریخ", "date"];
const LEGACY_HOLIDAY: &[&str] = &["تعطیلات", "holiday", "is_off"];
const LEGACY_CATEGORIES: [&[&str]; CATEGORY_COUNT] = [
    &["خانگی", "domestic"],
    &["صنعتی", "industrial"],
    &["کشاورزی", "agriculture", "agricultural"],
    &["تجاری", "commercial"],
    &["روشنایی", "lighting"],
    &["اداری", "administrative"],
];

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
}

/// Resolved column positions for one file.
struct Columns {
    feeder: Option<usize>,
    date: Option<usize>,
    holiday: Option<usize>,
    hours: [Option<usize>; HOURS_PER_DAY],
    categories: [Option<usize>; CATEGORY_COUNT],
}

impl Columns {
    fn resolve(headers: &[String], variant: SchemaVariant) -> Result<Self, SourceError> {
        let (feeder, date, holiday) = match variant {
            SchemaVariant::Simple => (SIMPLE_FEEDER, SIMPLE_DATE, SIMPLE_HOLIDAY),
            SchemaVariant::Legacy => (LEGACY_FEEDER, LEGACY_DATE, LEGACY_HOLIDAY),
        };

        let mut hours = [None; HOURS_PER_DAY];
        for (i, slot) in hours.iter_mut().enumerate() {
            *slot = find_column(headers, &[format!("H{}", i + 1).as_str()]);
        }

        let mut categories = [None; CATEGORY_COUNT];
        if variant == SchemaVariant::Legacy {
            for (slot, names) in categories.iter_mut().zip(LEGACY_CATEGORIES) {
                *slot = find_column(headers, names);
            }
        }

        let cols = Self {
            feeder: find_column(headers, feeder),
            date: find_column(headers, date),
            holiday: find_column(headers, holiday),
            hours,
            categories,
        };

        let mut missing = Vec::new();
        for (idx, names) in [(cols.feeder, feeder), (cols.date, date), (cols.holiday, holiday)] {
            if idx.is_none() {
                missing.push(names[0].to_string());
            }
        }
        for (i, idx) in cols.hours.iter().enumerate() {
            if idx.is_none() {
                missing.push(format!("H{}", i + 1));
            }
        }
        if variant == SchemaVariant::Legacy {
            for (idx, names) in cols.categories.iter().zip(LEGACY_CATEGORIES) {
                if idx.is_none() {
                    missing.push(names[0].to_string());
                }
            }
        }

        if missing.is_empty() {
            Ok(cols)
        } else {
            Err(SourceError::MissingColumns(missing))
        }
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn to_raw_row(record: &StringRecord, cols: &Columns, variant: SchemaVariant, line: u64) -> RawRow {
    let mut hours: [Option<String>; HOURS_PER_DAY] = Default::default();
    for (slot, idx) in hours.iter_mut().zip(cols.hours) {
        *slot = cell(record, idx);
    }

    match variant {
        SchemaVariant::Simple => RawRow::Simple(SimpleRow {
            line,
            fidder_id: cell(record, cols.feeder),
            date: cell(record, cols.date),
            is_off: cell(record, cols.holiday),
            hours,
        }),
        SchemaVariant::Legacy => {
            let mut categories: [Option<String>; CATEGORY_COUNT] = Default::default();
            for (slot, idx) in categories.iter_mut().zip(cols.categories) {
                *slot = cell(record, idx);
            }
            RawRow::Legacy(LegacyRow {
                line,
                feeder_code: cell(record, cols.feeder),
                date: cell(record, cols.date),
                holiday: cell(record, cols.holiday),
                hours,
                categories,
            })
        }
    }
}

/// Reads a consumption CSV export into raw rows of one schema variant.
///
/// A UTF-8 byte-order mark is ignored and header names are matched after
/// trimming. Rows the CSV reader cannot decode are reported individually.
pub struct ConsumptionCsvSource {
    variant: SchemaVariant,
}

impl ConsumptionCsvSource {
    pub fn new(variant: SchemaVariant) -> Self {
        Self { variant }
    }

    pub fn read(&self, input: &[u8]) -> Result<Vec<Result<RawRow, UnreadableRow>>, SourceError> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .from_reader(strip_bom(input));

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| SourceError::Header(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let cols = Columns::resolve(&headers, self.variant)?;

        let mut rows = Vec::new();
        for (n, result) in rdr.records().enumerate() {
            // Header occupies line 1.
            let fallback_line = n as u64 + 2;
            match result {
                Ok(record) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                    rows.push(Ok(to_raw_row(&record, &cols, self.variant, line)));
                }
                Err(e) => {
                    metrics::counter!("consumption_csv_parse_errors_total").increment(1);
                    let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                    rows.push(Err(UnreadableRow {
                        line,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours_header() -> String {
        (1..=24).map(|i| format!("H{i}")).collect::<Vec<_>>().join(",")
    }

    #[test]
    fn reads_simple_rows_with_blank_cells() {
        let hours: Vec<String> = (1..=24)
            .map(|i| if i == 13 { String::new() } else { format!("{i}.5") })
            .collect();
        let csv = format!(
            "fidder_id,date,is_off,{}\n1,2024-03-20,1,{}\n",
            hours_header(),
            hours.join(",")
        );

        let rows = ConsumptionCsvSource::new(SchemaVariant::Simple)
            .read(csv.as_bytes())
            .unwrap();
        assert_eq!(rows.len(), 1);

        let RawRow::Simple(row) = rows[0].clone().unwrap() else {
            panic!("expected simple row");
        };
        assert_eq!(row.line, 2);
        assert_eq!(row.fidder_id.as_deref(), Some("1"));
        assert_eq!(row.date.as_deref(), Some("2024-03-20"));
        assert_eq!(row.hours[0].as_deref(), Some("1.5"));
        assert_eq!(row.hours[12], None);
    }

    #[test]
    fn reads_legacy_rows_by_persian_headers_behind_bom() {
        let header = format!(
            "\u{feff}کد فیدر, تاریخ ,تعطیلات,{},خانگی,صنعتی,کشاورزی,تجاری,روشنایی,اداری",
            hours_header()
        );
        let values = vec!["2"; 24].join(",");
        let csv = format!("{header}\n12,1403/01/01,true,{values},0.4,0.25,0.1,0.12,0.1,0.03\n");

        let rows = ConsumptionCsvSource::new(SchemaVariant::Legacy)
            .read(csv.as_bytes())
            .unwrap();

        let RawRow::Legacy(row) = rows[0].clone().unwrap() else {
            panic!("expected legacy row");
        };
        assert_eq!(row.feeder_code.as_deref(), Some("12"));
        assert_eq!(row.date.as_deref(), Some("1403/01/01"));
        assert_eq!(row.holiday.as_deref(), Some("true"));
        assert_eq!(row.categories[5].as_deref(), Some("0.03"));
    }

    #[test]
    fn reads_legacy_rows_by_english_aliases() {
        let header = format!(
            "feeder_code,date,holiday,{},domestic,industrial,agriculture,commercial,lighting,administrative",
            hours_header()
        );
        let values = vec!["1"; 24].join(",");
        let csv = format!("{header}\n5,1403-02-10,0,{values},0,0,0,0,0,0\n");

        let rows = ConsumptionCsvSource::new(SchemaVariant::Legacy)
            .read(csv.as_bytes())
            .unwrap();
        assert!(matches!(&rows[0], Ok(RawRow::Legacy(r)) if r.feeder_code.as_deref() == Some("5")));
    }

    #[test]
    fn missing_header_columns_fail_the_file() {
        let csv = "fidder_id,date,H1\n1,2024-03-20,3\n";
        let err = ConsumptionCsvSource::new(SchemaVariant::Simple)
            .read(csv.as_bytes())
            .unwrap_err();

        let SourceError::MissingColumns(missing) = err else {
            panic!("expected missing columns");
        };
        assert!(missing.contains(&"is_off".to_string()));
        assert!(missing.contains(&"H24".to_string()));
        assert!(!missing.contains(&"H1".to_string()));
    }

    #[test]
    fn short_rows_leave_trailing_cells_empty() {
        let csv = format!("fidder_id,date,is_off,{}\n1,2024-03-20,0,5\n", hours_header());
        let rows = ConsumptionCsvSource::new(SchemaVariant::Simple)
            .read(csv.as_bytes())
            .unwrap();

        let RawRow::Simple(row) = rows[0].clone().unwrap() else {
            panic!("expected simple row");
        };
        assert_eq!(row.hours[0].as_deref(), Some("5"));
        assert!(row.hours[1..].iter().all(Option::is_none));
    }
}
