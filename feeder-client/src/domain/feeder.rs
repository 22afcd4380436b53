#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Feeder {
    pub id: i64,
    pub feeder_name: String,
    pub area: i64,
    pub distribution_id: i64,
}

/// A feeder name paired with the area (region) it was found under.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeederArea {
    pub feeder_name: String,
    pub area: i64,
}

/// Feeder row as supplied by an administrative bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeeder {
    pub feeder_name: String,
    pub area: i64,
    pub distribution_id: i64,
}
