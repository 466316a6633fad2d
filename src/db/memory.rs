use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::storage::{ColumnValue, MappingStorage, StorageError, StoredRow, TableDesc};

/// Process-local storage with the same lookup semantics as the database
/// backend. A table that was never written reads as empty.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Vec<StoredRow>>>,
    selects: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `select_matching` calls served so far.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::Relaxed)
    }

    pub fn row_count(&self, desc: &TableDesc) -> usize {
        self.tables
            .read()
            .get(&desc.qualified_name())
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MappingStorage for MemoryStorage {
    async fn recreate_table(
        &self,
        desc: &TableDesc,
        rows: Vec<StoredRow>,
    ) -> Result<(), StorageError> {
        for row in &rows {
            desc.check_row(row)?;
        }
        self.tables.write().insert(desc.qualified_name(), rows);
        Ok(())
    }

    async fn select_matching(
        &self,
        desc: &TableDesc,
        keys: &[(&str, ColumnValue)],
    ) -> Result<Vec<StoredRow>, StorageError> {
        self.selects.fetch_add(1, Ordering::Relaxed);
        let positions = keys
            .iter()
            .map(|(column, value)| Ok((desc.column_index(column)?, value)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let tables = self.tables.read();
        let Some(rows) = tables.get(&desc.qualified_name()) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| positions.iter().all(|(i, value)| row[*i].matches(value)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::storage::{ColumnDesc, ColumnType};

    const DESC: TableDesc = TableDesc {
        schema: "mapping",
        name: "sample",
        columns: &[
            ColumnDesc {
                name: "name",
                column_type: ColumnType::Varchar(200),
            },
            ColumnDesc {
                name: "position",
                column_type: ColumnType::Int4,
            },
        ],
        indexes: &[],
    };

    #[tokio::test]
    async fn test_recreate_replaces_contents() {
        let storage = MemoryStorage::new();
        storage
            .recreate_table(&DESC, vec![vec!["a".into(), 1.into()], vec!["b".into(), 2.into()]])
            .await
            .unwrap();
        storage
            .recreate_table(&DESC, vec![vec!["c".into(), 3.into()]])
            .await
            .unwrap();
        assert_eq!(storage.row_count(&DESC), 1);
    }

    #[tokio::test]
    async fn test_select_matches_text_ignoring_case() {
        let storage = MemoryStorage::new();
        storage
            .recreate_table(&DESC, vec![vec!["Alpha".into(), 1.into()], vec!["beta".into(), 2.into()]])
            .await
            .unwrap();

        let rows = storage
            .select_matching(&DESC, &[("name", "ALPHA".into())])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![ColumnValue::from("Alpha"), ColumnValue::from(1)]]);

        let rows = storage
            .select_matching(&DESC, &[("name", "beta".into()), ("position", 1.into())])
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(storage.select_count(), 2);
    }

    #[tokio::test]
    async fn test_unwritten_table_reads_empty() {
        let storage = MemoryStorage::new();
        let rows = storage
            .select_matching(&DESC, &[("name", "a".into())])
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_bad_row_is_rejected() {
        let storage = MemoryStorage::new();
        let err = storage
            .recreate_table(&DESC, vec![vec!["a".into()]])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ColumnCount { .. }));
    }
}
