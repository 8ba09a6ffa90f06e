//! Postal-code reconciliation: fills blank neighborhood cells of the primary
//! dataset from the postal-code mapping dataset and writes the result back.

use crate::dataset::DatasetName;
use crate::error::{Result, ServiceError};
use crate::storage::Storage;
use crate::table::Table;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

pub const POSTAL_CODE_COLUMN: &str = "postalCode";
pub const NEIGHBORHOOD_COLUMN: &str = "neighborhood";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub rows_total: usize,
    pub rows_missing: usize,
    pub rows_filled: usize,
    pub rows_unmatched: usize,
}

fn require_columns(table: &Table, dataset: &str) -> Result<()> {
    for column in [POSTAL_CODE_COLUMN, NEIGHBORHOOD_COLUMN] {
        if !table.has_column(column) {
            return Err(ServiceError::MissingColumn {
                dataset: dataset.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Fills every empty `neighborhood` in `primary` with the neighborhood of the
/// first `mapping` row sharing its postal code. Non-empty cells are left alone.
pub fn fill_neighborhoods(primary: &mut Table, mapping: &Table) -> ReconcileSummary {
    let mut lookup: HashMap<&str, &str> = HashMap::new();
    for row in mapping.rows() {
        if let (Some(code), Some(hood)) = (row.get(POSTAL_CODE_COLUMN), row.get(NEIGHBORHOOD_COLUMN)) {
            lookup.entry(code).or_insert(hood);
        }
    }

    let mut summary = ReconcileSummary {
        rows_total: primary.len(),
        ..Default::default()
    };

    for row in primary.rows_mut() {
        if !row.get(NEIGHBORHOOD_COLUMN).unwrap_or("").is_empty() {
            continue;
        }
        summary.rows_missing += 1;

        let found = row
            .get(POSTAL_CODE_COLUMN)
            .and_then(|code| lookup.get(code))
            .map(|hood| hood.to_string());
        match found {
            Some(hood) => {
                row.set(NEIGHBORHOOD_COLUMN, hood);
                summary.rows_filled += 1;
            }
            None => summary.rows_unmatched += 1,
        }
    }

    summary
}

/// Runs reconciliation against a [`Storage`]; concurrent runs are serialized.
pub struct Reconciler {
    storage: Arc<dyn Storage>,
    primary: DatasetName,
    mapping: DatasetName,
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn Storage>, primary: DatasetName, mapping: DatasetName) -> Self {
        Self {
            storage,
            primary,
            mapping,
            lock: Mutex::new(()),
        }
    }

    #[instrument(skip(self), fields(primary = %self.primary, mapping = %self.mapping))]
    pub async fn run(&self) -> Result<ReconcileSummary> {
        let _guard = self.lock.lock().await;

        let mapping = self.storage.load(&self.mapping).await?;
        require_columns(&mapping, self.mapping.as_str())?;
        let mut primary = self.storage.load(&self.primary).await?;
        require_columns(&primary, self.primary.as_str())?;

        let summary = fill_neighborhoods(&mut primary, &mapping);
        self.storage.replace(&self.primary, &primary).await?;

        crate::metrics::reconcile::run_complete(&summary);
        info!(
            rows_total = summary.rows_total,
            rows_filled = summary.rows_filled,
            rows_unmatched = summary.rows_unmatched,
            "postal code mapping complete"
        );
        Ok(summary)
    }
}
