pub mod consumption_csv;
pub mod feeder_csv;

pub use consumption_csv::{ConsumptionCsvSource, LegacyRow, RawRow, SchemaVariant, SimpleRow};
pub use feeder_csv::{read_feeders, FeederRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to read CSV headers: {0}")]
    Header(String),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// A CSV record that could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRow {
    pub line: u64,
    pub reason: String,
}

pub(crate) fn strip_bom(input: &[u8]) -> &[u8] {
    input.strip_prefix(UTF8_BOM).unwrap_or(input)
}
