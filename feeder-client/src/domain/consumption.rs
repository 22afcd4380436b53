use time::Date;

pub const HOURS_PER_DAY: usize = 24;

/// Consumption split across customer categories. Zero when the source
/// does not carry a breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CategoryBreakdown {
    pub domestic: f64,
    pub industrial: f64,
    pub agriculture: f64,
    pub commercial: f64,
    pub lighting: f64,
    pub administrative: f64,
}

/// One feeder's hourly consumption for one Gregorian calendar day.
///
/// `(feeder_id, date)` is the storage identity of a record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConsumptionRecord {
    pub tenant_id: i64,
    pub feeder_id: i64,
    pub date: Date,
    pub is_holiday: bool,
    pub hourly: [f64; HOURS_PER_DAY],
    pub categories: CategoryBreakdown,
}

impl ConsumptionRecord {
    pub fn total_consumption(&self) -> f64 {
        self.hourly.iter().sum()
    }

    pub fn key(&self) -> (i64, Date) {
        (self.feeder_id, self.date)
    }
}
