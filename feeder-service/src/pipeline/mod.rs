//! Import orchestration: CSV rows are read and normalized sequentially, the
//! surviving records are committed in one atomic batch.

use std::sync::Arc;

use feeder_client::domain::{ConsumptionRecord, NewFeeder};
use serde::Serialize;
use time::Date;

use crate::sources::{read_feeders, ConsumptionCsvSource, RawRow, SchemaVariant, SourceError, UnreadableRow};
use crate::transform::{RowNormalizer, RowRejected};

/// Counts reported back to the caller of an import.
///
/// `added` is the number of rows accepted for writing; inserts and
/// conflict-updates are not told apart, so `updated` stays zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: u64,
    pub updated: u64,
    pub skipped: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(e: anyhow::Error) -> Self {
        Self(e.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("import task failed: {0}")]
    Task(String),
}

/// Batch upsert engine over the consumption table.
#[async_trait::async_trait]
pub trait ConsumptionStore: Send + Sync {
    /// Apply every record or none. A record whose `(feeder_id, date)` already
    /// exists replaces the stored measurements and refreshes `updated_at`.
    async fn upsert(&self, records: &[ConsumptionRecord]) -> Result<ImportSummary, StorageError>;

    async fn fetch_day(
        &self,
        feeder_id: i64,
        date: Date,
    ) -> Result<Option<ConsumptionRecord>, StorageError>;
}

#[async_trait::async_trait]
pub trait FeederStore: Send + Sync {
    /// Insert new feeders, returning how many rows were created.
    async fn insert_feeders(&self, feeders: &[NewFeeder]) -> Result<u64, StorageError>;
}

/// Keep only the last record for each `(feeder_id, date)` key, preserving
/// the order in which keys first appeared.
pub fn dedupe_last_wins(records: Vec<ConsumptionRecord>) -> Vec<ConsumptionRecord> {
    let mut index: std::collections::HashMap<(i64, Date), usize> = Default::default();
    let mut out: Vec<ConsumptionRecord> = Vec::with_capacity(records.len());

    for record in records {
        match index.get(&record.key()) {
            Some(&pos) => out[pos] = record,
            None => {
                index.insert(record.key(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Result of validating one file before anything is written.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ConsumptionRecord>,
    pub rejected: Vec<RowRejected>,
}

pub fn normalize_rows(
    normalizer: &RowNormalizer,
    rows: Vec<Result<RawRow, UnreadableRow>>,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for row in rows {
        let outcome = match row {
            Ok(raw) => normalizer.normalize(&raw),
            Err(UnreadableRow { line, reason }) => Err(RowRejected::Unreadable { line, reason }),
        };
        match outcome {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                tracing::debug!(error = %e, "row rejected");
                batch.rejected.push(e);
            }
        }
    }
    batch
}

pub struct ConsumptionImporter {
    normalizer: RowNormalizer,
    store: Arc<dyn ConsumptionStore>,
}

impl ConsumptionImporter {
    pub fn new(normalizer: RowNormalizer, store: Arc<dyn ConsumptionStore>) -> Self {
        Self { normalizer, store }
    }

    /// Parse, normalize and commit one CSV export.
    ///
    /// Rejected rows only increment `skipped`; a failed batch write fails
    /// the whole call and nothing is reported as written.
    pub async fn import(&self, variant: SchemaVariant, input: Vec<u8>) -> Result<ImportSummary, ImportError> {
        let normalizer = self.normalizer.clone();
        let batch = tokio::task::spawn_blocking(move || -> Result<NormalizedBatch, SourceError> {
            let rows = ConsumptionCsvSource::new(variant).read(&input)?;
            Ok(normalize_rows(&normalizer, rows))
        })
        .await
        .map_err(|e| ImportError::Task(e.to_string()))??;

        self.commit(variant, batch).await.map_err(ImportError::from)
    }

    pub async fn commit(&self, variant: SchemaVariant, batch: NormalizedBatch) -> Result<ImportSummary, StorageError> {
        let skipped = batch.rejected.len() as u64;
        metrics::counter!("import_rows_skipped_total", "variant" => variant.as_str()).increment(skipped);

        if batch.records.is_empty() {
            tracing::info!(variant = variant.as_str(), skipped, "import had no valid rows");
            return Ok(ImportSummary {
                skipped,
                ..ImportSummary::default()
            });
        }

        let mut summary = match self.store.upsert(&batch.records).await {
            Ok(s) => s,
            Err(e) => {
                metrics::counter!("import_batches_failed_total").increment(1);
                tracing::error!(error = %e, variant = variant.as_str(), "consumption batch write failed");
                return Err(e);
            }
        };
        summary.skipped += skipped;

        metrics::counter!("import_rows_written_total", "variant" => variant.as_str()).increment(summary.added);
        tracing::info!(
            variant = variant.as_str(),
            added = summary.added,
            skipped = summary.skipped,
            "consumption import committed"
        );
        Ok(summary)
    }

    pub async fn fetch_day(&self, feeder_id: i64, date: Date) -> Result<Option<ConsumptionRecord>, StorageError> {
        self.store.fetch_day(feeder_id, date).await
    }
}

pub struct FeederImporter {
    tenant_id: i64,
    store: Arc<dyn FeederStore>,
}

impl FeederImporter {
    pub fn new(tenant_id: i64, store: Arc<dyn FeederStore>) -> Self {
        Self { tenant_id, store }
    }

    /// Bulk-register feeders from a `feeder_id,area_code` export. Rows that
    /// cannot be read, and feeders already registered, count as skipped.
    pub async fn import(&self, input: &[u8]) -> Result<ImportSummary, ImportError> {
        let rows = read_feeders(input)?;

        let mut skipped = 0u64;
        let mut feeders = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                Ok(r) => feeders.push(NewFeeder {
                    feeder_name: r.feeder_name,
                    area: r.area,
                    distribution_id: self.tenant_id,
                }),
                Err(e) => {
                    tracing::debug!(line = e.line, reason = %e.reason, "feeder row rejected");
                    skipped += 1;
                }
            }
        }

        let inserted = self.store.insert_feeders(&feeders).await?;
        let summary = ImportSummary {
            added: inserted,
            updated: 0,
            skipped: skipped + (feeders.len() as u64).saturating_sub(inserted),
        };
        tracing::info!(added = summary.added, skipped = summary.skipped, "feeder import committed");
        Ok(summary)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::MemoryStore;
    use super::*;
    use time::macros::date;

    fn simple_csv(rows: &[&str]) -> Vec<u8> {
        let hours = (1..=24).map(|i| format!("H{i}")).collect::<Vec<_>>().join(",");
        let mut out = format!("fidder_id,date,is_off,{hours}\n");
        for r in rows {
            out.push_str(r);
            out.push('\n');
        }
        out.into_bytes()
    }

    fn hours(value: &str) -> String {
        vec![value; 24].join(",")
    }

    fn legacy_csv(rows: &[String]) -> Vec<u8> {
        let hours = (1..=24).map(|i| format!("H{i}")).collect::<Vec<_>>().join(",");
        let mut out = format!("کد فیدر,تاریخ,تعطیلات,{hours},خانگی,صنعتی,کشاورزی,تجاری,روشنایی,اداری\n");
        for r in rows {
            out.push_str(r);
            out.push('\n');
        }
        out.into_bytes()
    }

    fn importer(store: Arc<MemoryStore>) -> ConsumptionImporter {
        ConsumptionImporter::new(RowNormalizer::default(), store)
    }

    #[tokio::test]
    async fn reimporting_the_same_batch_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let imp = importer(store.clone());
        let csv = simple_csv(&[
            &format!("1,2024-03-20,0,{}", hours("2")),
            &format!("1,2024-03-21,1,{}", hours("3")),
        ]);

        let first = imp.import(SchemaVariant::Simple, csv.clone()).await.unwrap();
        let snapshot = store.rows.lock().unwrap().clone();
        let second = imp.import(SchemaVariant::Simple, csv).await.unwrap();

        assert_eq!(first.added, 2);
        assert_eq!(second.added, 2);
        assert_eq!(*store.rows.lock().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn later_batch_replaces_measurements_for_same_key() {
        let store = Arc::new(MemoryStore::default());
        let imp = importer(store.clone());

        imp.import(SchemaVariant::Simple, simple_csv(&[&format!("1,2024-03-20,0,{}", hours("2"))]))
            .await
            .unwrap();
        imp.import(SchemaVariant::Simple, simple_csv(&[&format!("1,2024-03-20,1,{}", hours("5"))]))
            .await
            .unwrap();

        let stored = imp.fetch_day(1, date!(2024 - 03 - 20)).await.unwrap().unwrap();
        assert!(stored.is_holiday);
        assert_eq!(stored.total_consumption(), 120.0);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn legacy_row_missing_hour_is_skipped_but_simple_row_is_zero_filled() {
        let store = Arc::new(MemoryStore::default());
        let imp = importer(store.clone());

        let mut cells: Vec<&str> = vec!["4"; 24];
        cells[12] = "";
        let gapped = cells.join(",");

        let legacy = legacy_csv(&[format!("7,1403/01/01,0,{gapped},0,0,0,0,0,0")]);
        let summary = imp.import(SchemaVariant::Legacy, legacy).await.unwrap();
        assert_eq!(summary, ImportSummary { added: 0, updated: 0, skipped: 1 });
        assert_eq!(*store.batches.lock().unwrap(), 0);

        let simple = simple_csv(&[&format!("7,2024-03-20,0,{gapped}")]);
        let summary = imp.import(SchemaVariant::Simple, simple).await.unwrap();
        assert_eq!(summary, ImportSummary { added: 1, updated: 0, skipped: 0 });

        let stored = store.rows.lock().unwrap()[&(7, date!(2024 - 03 - 20))].clone();
        assert_eq!(stored.hourly[12], 0.0);
        assert_eq!(stored.hourly[11], 4.0);
    }

    #[tokio::test]
    async fn bad_rows_are_counted_without_aborting_the_batch() {
        let store = Arc::new(MemoryStore::default());
        let imp = importer(store.clone());
        let csv = legacy_csv(&[
            format!("7,1403/01/01,1,{},0.4,0.2,0,0,0,0", hours("1")),
            format!("8,1402/12/30,0,{},0,0,0,0,0,0", hours("1")),
            format!("9,1403/01/02,0,{},x,0,0,0,0,0", hours("1")),
        ]);

        let summary = imp.import(SchemaVariant::Legacy, csv).await.unwrap();
        assert_eq!(summary, ImportSummary { added: 1, updated: 0, skipped: 2 });
        assert!(store.rows.lock().unwrap().contains_key(&(7, date!(2024 - 03 - 20))));
    }

    #[tokio::test]
    async fn storage_failure_fails_the_whole_import() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..MemoryStore::default()
        });
        let imp = importer(store.clone());
        let csv = simple_csv(&[&format!("1,2024-03-20,0,{}", hours("2"))]);

        let err = imp.import(SchemaVariant::Simple, csv).await.unwrap_err();
        assert!(matches!(err, ImportError::Storage(_)));
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_columns_fail_before_any_write() {
        let store = Arc::new(MemoryStore::default());
        let imp = importer(store.clone());

        let err = imp
            .import(SchemaVariant::Legacy, b"date,H1\n1403/01/01,1\n".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Source(SourceError::MissingColumns(_))));
        assert_eq!(*store.batches.lock().unwrap(), 0);
    }

    #[test]
    fn dedupe_keeps_last_occurrence_in_first_seen_order() {
        let base = ConsumptionRecord {
            tenant_id: 3,
            feeder_id: 1,
            date: date!(2024 - 03 - 20),
            is_holiday: false,
            hourly: [1.0; 24],
            categories: Default::default(),
        };
        let other_day = ConsumptionRecord {
            date: date!(2024 - 03 - 21),
            ..base.clone()
        };
        let replacement = ConsumptionRecord {
            is_holiday: true,
            ..base.clone()
        };

        let out = dedupe_last_wins(vec![base, other_day.clone(), replacement.clone()]);
        assert_eq!(out, vec![replacement, other_day]);
    }

    #[derive(Default)]
    struct MemoryFeeders {
        existing: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait::async_trait]
    impl FeederStore for MemoryFeeders {
        async fn insert_feeders(&self, feeders: &[NewFeeder]) -> Result<u64, StorageError> {
            let mut existing = self.existing.lock().unwrap();
            let mut inserted = 0;
            for f in feeders {
                let key = (f.feeder_name.clone(), f.area);
                if !existing.contains(&key) {
                    existing.push(key);
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }

    #[tokio::test]
    async fn feeder_import_counts_duplicates_and_bad_rows_as_skipped() {
        let store = Arc::new(MemoryFeeders::default());
        store.existing.lock().unwrap().push(("Fdr-1".to_string(), 1));
        let imp = FeederImporter::new(3, store.clone());

        let summary = imp
            .import(b"feeder_id,area_code\nFdr-1,1\nFdr-2,1\nFdr-3,\n")
            .await
            .unwrap();

        assert_eq!(summary, ImportSummary { added: 1, updated: 0, skipped: 2 });
        assert_eq!(store.existing.lock().unwrap().len(), 2);
    }
}
