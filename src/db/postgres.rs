use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Row};
use tracing::debug;

use super::storage::{
    ColumnType, ColumnValue, MappingStorage, StorageError, StoredRow, TableDesc,
};

/// Mapping storage backed by a PostgreSQL connection.
pub struct PostgresStorage {
    client: Mutex<Client>,
}

impl PostgresStorage {
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(desc: &TableDesc) -> String {
    format!("{}.{}", quote_ident(desc.schema), quote_ident(desc.name))
}

fn column_list(desc: &TableDesc) -> String {
    desc.columns
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(desc: &TableDesc) -> String {
    let columns = desc
        .columns
        .iter()
        .map(|c| format!("{} {} not null", quote_ident(c.name), c.column_type.ddl()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("create table {} ({})", qualified(desc), columns)
}

fn create_index_sql(desc: &TableDesc, position: usize, key: &str) -> String {
    format!(
        "create index {} on {} ({})",
        quote_ident(&format!("{}_idx{}", desc.name, position)),
        qualified(desc),
        key
    )
}

fn select_sql(desc: &TableDesc, keys: &[(&str, ColumnValue)]) -> String {
    let conditions = keys
        .iter()
        .enumerate()
        .map(|(i, (column, value))| match value {
            ColumnValue::Text(_) => format!("lower({}) = lower(${})", quote_ident(column), i + 1),
            ColumnValue::Integer(_) => format!("{} = ${}", quote_ident(column), i + 1),
        })
        .collect::<Vec<_>>()
        .join(" and ");
    let mut sql = format!("select {} from {}", column_list(desc), qualified(desc));
    if !conditions.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&conditions);
    }
    sql
}

fn read_row(desc: &TableDesc, row: &Row) -> Result<StoredRow, StorageError> {
    desc.columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = match column.column_type {
                ColumnType::Int4 => row.try_get::<_, i32>(i).map(ColumnValue::Integer),
                ColumnType::Varchar(_) | ColumnType::Text => {
                    row.try_get::<_, String>(i).map(ColumnValue::Text)
                }
            };
            value.map_err(|_| StorageError::UnexpectedValue {
                table: desc.qualified_name(),
                column: column.name.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl MappingStorage for PostgresStorage {
    async fn recreate_table(
        &self,
        desc: &TableDesc,
        rows: Vec<StoredRow>,
    ) -> Result<(), StorageError> {
        for row in &rows {
            desc.check_row(row)?;
        }

        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        tx.batch_execute(&format!(
            "create schema if not exists {}; drop table if exists {}; {}",
            quote_ident(desc.schema),
            qualified(desc),
            create_table_sql(desc)
        ))
        .await?;

        let copy_sql = format!(
            "copy {} ({}) from stdin (format binary)",
            qualified(desc),
            column_list(desc)
        );
        let types: Vec<Type> = desc.columns.iter().map(|c| c.column_type.pg_type()).collect();
        let sink = tx.copy_in(copy_sql.as_str()).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        tokio::pin!(writer);
        for row in &rows {
            let values: Vec<&(dyn ToSql + Sync)> = row.iter().map(ColumnValue::as_sql).collect();
            writer.as_mut().write(&values).await?;
        }
        let copied = writer.finish().await?;

        for (position, key) in desc.indexes.iter().enumerate() {
            tx.execute(create_index_sql(desc, position, key).as_str(), &[])
                .await?;
        }
        tx.commit().await?;
        debug!(table = %desc.qualified_name(), rows = copied, "table recreated");
        Ok(())
    }

    async fn select_matching(
        &self,
        desc: &TableDesc,
        keys: &[(&str, ColumnValue)],
    ) -> Result<Vec<StoredRow>, StorageError> {
        for (column, _) in keys {
            desc.column_index(column)?;
        }
        let sql = select_sql(desc, keys);
        let params: Vec<&(dyn ToSql + Sync)> = keys.iter().map(|(_, v)| v.as_sql()).collect();
        let client = self.client.lock().await;
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter().map(|row| read_row(desc, row)).collect()
    }
}
