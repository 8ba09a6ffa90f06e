use crate::dataset::{DataDir, DatasetName};
use crate::error::{Result, ServiceError};
use crate::loader::{load_table, write_table_atomic};
use crate::table::Table;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Where datasets are read from and written back to.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self, name: &DatasetName) -> Result<Table>;

    /// Replaces the whole dataset with `table`.
    async fn replace(&self, name: &DatasetName, table: &Table) -> Result<()>;
}

/// Datasets stored as CSV files below a data directory.
pub struct FsStorage {
    data_dir: DataDir,
}

impl FsStorage {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn load(&self, name: &DatasetName) -> Result<Table> {
        let data_dir = self.data_dir.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || {
            let path = data_dir.resolve_existing(&name)?;
            load_table(&path)
        })
        .await?
    }

    async fn replace(&self, name: &DatasetName, table: &Table) -> Result<()> {
        let data_dir = self.data_dir.clone();
        let name = name.clone();
        let table = table.clone();
        tokio::task::spawn_blocking(move || {
            let path = match data_dir.resolve_existing(&name) {
                Ok(path) => path,
                Err(ServiceError::DatasetNotFound(_)) => data_dir.path_of(&name),
                Err(e) => return Err(e),
            };
            write_table_atomic(&path, &table)
        })
        .await?
    }
}

/// Datasets held in a map keyed by name; nothing touches the disk.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<HashMap<DatasetName, Table>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: DatasetName, table: Table) {
        self.tables.lock().await.insert(name, table);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn load(&self, name: &DatasetName) -> Result<Table> {
        let tables = self.tables.lock().await;
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::DatasetNotFound(name.to_string()))
    }

    async fn replace(&self, name: &DatasetName, table: &Table) -> Result<()> {
        self.tables.lock().await.insert(name.clone(), table.clone());
        debug!(dataset = %name, rows = table.len(), "replaced in-memory table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Row;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fs_storage_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.csv"), "a,b\n1,2\n").unwrap();
        let storage = FsStorage::new(DataDir::new(dir.path()));
        let name = DatasetName::parse("data").unwrap();

        let mut table = storage.load(&name).await.unwrap();
        table.rows_mut()[0].set("b", "3");
        storage.replace(&name, &table).await.unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("data.csv")).unwrap(), "a,b\n1,3\n");
    }

    #[tokio::test]
    async fn fs_storage_creates_missing_dataset_on_replace() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(DataDir::new(dir.path()));
        let name = DatasetName::parse("fresh").unwrap();
        let mut table = Table::new(vec!["a".into()]);
        table.push([("a", "x")].into_iter().collect::<Row>());

        storage.replace(&name, &table).await.unwrap();
        assert_eq!(storage.load(&name).await.unwrap(), table);
    }

    #[tokio::test]
    async fn in_memory_storage_reports_missing_dataset() {
        let storage = InMemoryStorage::new();
        let name = DatasetName::parse("absent").unwrap();
        assert!(matches!(
            storage.load(&name).await,
            Err(ServiceError::DatasetNotFound(_))
        ));
    }
}
