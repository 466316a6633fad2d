//! Persistent, cached schema mapping store.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::error::MappingError;
use super::source::MappingSource;
use super::types::{index_from_db_name, EnumMapping, PropertyLayout, TableMapping, TableType};
use crate::ast::types::Query;
use crate::ast::visit::collect_table_names;
use crate::db::{
    ColumnDesc, ColumnType, ColumnValue, MappingStorage, StorageError, StoredRow, TableDesc,
};

pub const TABLE_MAPPINGS: TableDesc = TableDesc {
    schema: "mapping",
    name: "tableMappings",
    columns: &[
        ColumnDesc {
            name: "queryTableName",
            column_type: ColumnType::Varchar(200),
        },
        ColumnDesc {
            name: "dbName",
            column_type: ColumnType::Varchar(200),
        },
        ColumnDesc {
            name: "type",
            column_type: ColumnType::Varchar(50),
        },
        ColumnDesc {
            name: "properties",
            column_type: ColumnType::Text,
        },
    ],
    indexes: &["(lower(\"queryTableName\"))"],
};

pub const ENUM_MAPPINGS: TableDesc = TableDesc {
    schema: "mapping",
    name: "enumMappings",
    columns: &[
        ColumnDesc {
            name: "enumName",
            column_type: ColumnType::Varchar(200),
        },
        ColumnDesc {
            name: "enumValueName",
            column_type: ColumnType::Varchar(200),
        },
        ColumnDesc {
            name: "orderIndex",
            column_type: ColumnType::Int4,
        },
    ],
    indexes: &["\"enumName\", \"orderIndex\""],
};

type Cache<K, V> = RwLock<HashMap<K, V>>;

fn cached<K: Hash + Eq, V: Clone>(cache: &Cache<K, V>, key: &K) -> Option<V> {
    cache.read().get(key).cloned()
}

/// Keep the first value stored under `key`; a concurrent loader may have
/// won the race.
fn remember<K: Hash + Eq, V: Clone>(cache: &Cache<K, V>, key: K, value: V) -> V {
    cache.write().entry(key).or_insert(value).clone()
}

/// Reads and writes mapping data through a [`MappingStorage`] backend,
/// caching every lookup for the lifetime of the store. Caches are never
/// invalidated; create a new store after rewriting the mappings.
pub struct SchemaStore<S> {
    storage: S,
    by_query_name: Cache<String, Option<Arc<TableMapping>>>,
    by_db_name: Cache<String, Option<Arc<TableMapping>>>,
    enum_values: Cache<(String, String), Option<i32>>,
}

impl<S: MappingStorage> SchemaStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            by_query_name: RwLock::new(HashMap::new()),
            by_db_name: RwLock::new(HashMap::new()),
            enum_values: RwLock::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mapping whose logical name equals `name` ignoring case.
    pub async fn resolve_by_logical_name(
        &self,
        name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError> {
        if let Some(hit) = cached(&self.by_query_name, &name.to_string()) {
            return Ok(hit);
        }
        let loaded = self.load_table("queryTableName", name).await?;
        Ok(remember(&self.by_query_name, name.to_string(), loaded))
    }

    /// Mapping whose physical name equals `name` ignoring case.
    pub async fn resolve_by_physical_name(
        &self,
        name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError> {
        if let Some(hit) = cached(&self.by_db_name, &name.to_string()) {
            return Ok(hit);
        }
        let loaded = self.load_table("dbName", name).await?;
        Ok(remember(&self.by_db_name, name.to_string(), loaded))
    }

    /// Stored ordinal of one enum value.
    pub async fn resolve_enum_value(
        &self,
        enum_name: &str,
        value_name: &str,
    ) -> Result<Option<i32>, MappingError> {
        let key = (enum_name.to_string(), value_name.to_string());
        if let Some(hit) = cached(&self.enum_values, &key) {
            return Ok(hit);
        }
        let rows = self
            .storage
            .select_matching(
                &ENUM_MAPPINGS,
                &[
                    ("enumName", enum_name.into()),
                    ("enumValueName", value_name.into()),
                ],
            )
            .await?;
        let loaded = match rows.first() {
            Some(row) => Some(integer_at(&ENUM_MAPPINGS, row, 2)?),
            None => None,
        };
        debug!(enum_name, value_name, ?loaded, "enum value loaded");
        Ok(remember(&self.enum_values, key, loaded))
    }

    /// Replace every stored table mapping. Mappings that would not read
    /// back unchanged are rejected before anything is written.
    pub async fn write_table_mappings(&self, mappings: &[TableMapping]) -> Result<(), MappingError> {
        for mapping in mappings {
            mapping.stored_index()?;
            mapping.check_properties()?;
        }
        self.recreate(&TABLE_MAPPINGS, mappings, |m| {
            vec![
                m.query_table_name.as_str().into(),
                m.db_table_name.as_str().into(),
                m.table_type.as_str().into(),
                m.serialize_properties().into(),
            ]
        })
        .await
    }

    /// Replace every stored enum mapping.
    pub async fn write_enum_mappings(&self, mappings: &[EnumMapping]) -> Result<(), MappingError> {
        self.recreate(&ENUM_MAPPINGS, mappings, |m| {
            vec![
                m.enum_name.as_str().into(),
                m.enum_value_name.as_str().into(),
                m.order_index.into(),
            ]
        })
        .await
    }

    /// Load into the caches every mapping a rewrite of `query` can ask for:
    /// each table it names, looked up by physical name, and the nested
    /// targets of their single-layout references.
    pub async fn warm_for_query(&self, query: &Query) -> Result<(), MappingError> {
        for name in collect_table_names(query) {
            let Some(mapping) = self.resolve_by_physical_name(&name).await? else {
                debug!(table = %name, "no mapping for table");
                continue;
            };
            for property in &mapping.properties {
                if let PropertyLayout::Single {
                    nested_table_name: Some(nested),
                    ..
                } = &property.layout
                {
                    self.resolve_by_logical_name(nested).await?;
                }
            }
        }
        Ok(())
    }

    async fn recreate<T>(
        &self,
        desc: &TableDesc,
        items: &[T],
        to_row: impl Fn(&T) -> StoredRow,
    ) -> Result<(), MappingError> {
        let rows = items
            .iter()
            .map(|item| {
                let row = to_row(item);
                desc.check_row(&row)?;
                Ok(row)
            })
            .collect::<Result<Vec<_>, StorageError>>()?;
        let count = rows.len();
        self.storage.recreate_table(desc, rows).await?;
        info!(table = %desc.qualified_name(), rows = count, "mappings written");
        Ok(())
    }

    async fn load_table(
        &self,
        key_column: &str,
        name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError> {
        let rows = self
            .storage
            .select_matching(&TABLE_MAPPINGS, &[(key_column, name.into())])
            .await?;
        if rows.len() > 1 {
            warn!(column = key_column, name, matches = rows.len(), "mapping name is not unique");
        }
        let loaded = match rows.first() {
            Some(row) => Some(Arc::new(table_from_row(row)?)),
            None => None,
        };
        debug!(column = key_column, name, found = loaded.is_some(), "table mapping loaded");
        Ok(loaded)
    }
}

fn text_at<'a>(desc: &TableDesc, row: &'a StoredRow, i: usize) -> Result<&'a str, StorageError> {
    row.get(i)
        .and_then(ColumnValue::as_text)
        .ok_or_else(|| unexpected(desc, i))
}

fn integer_at(desc: &TableDesc, row: &StoredRow, i: usize) -> Result<i32, StorageError> {
    row.get(i)
        .and_then(ColumnValue::as_integer)
        .ok_or_else(|| unexpected(desc, i))
}

fn unexpected(desc: &TableDesc, i: usize) -> StorageError {
    StorageError::UnexpectedValue {
        table: desc.qualified_name(),
        column: desc.columns.get(i).map_or("?", |c| c.name).to_string(),
    }
}

fn table_from_row(row: &StoredRow) -> Result<TableMapping, MappingError> {
    let query_table_name = text_at(&TABLE_MAPPINGS, row, 0)?;
    let db_table_name = text_at(&TABLE_MAPPINGS, row, 1)?;
    let table_type: TableType = text_at(&TABLE_MAPPINGS, row, 2)?.parse()?;
    let properties =
        TableMapping::parse_properties(query_table_name, text_at(&TABLE_MAPPINGS, row, 3)?)?;
    Ok(TableMapping {
        query_table_name: query_table_name.to_string(),
        db_table_name: db_table_name.to_string(),
        table_type,
        properties,
        index: index_from_db_name(db_table_name),
    })
}

impl<S: MappingStorage> MappingSource for SchemaStore<S> {
    fn resolve_table(&self, query_name: &str) -> Result<Option<Arc<TableMapping>>, MappingError> {
        cached(&self.by_query_name, &query_name.to_string())
            .ok_or_else(|| MappingError::NotLoaded(query_name.to_string()))
    }

    fn resolve_table_by_db_name(
        &self,
        db_name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError> {
        cached(&self.by_db_name, &db_name.to_string())
            .ok_or_else(|| MappingError::NotLoaded(db_name.to_string()))
    }
}
