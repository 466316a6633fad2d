//! Synchronous mapping lookups used during translation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::error::MappingError;
use super::types::{EnumMapping, PropertyLayout, TableMapping};

/// Read access to table mappings. Lookups compare names case-insensitively
/// and report a missing mapping as `Ok(None)`.
pub trait MappingSource {
    /// Resolve a mapping by its logical name.
    fn resolve_table(&self, query_name: &str) -> Result<Option<Arc<TableMapping>>, MappingError>;

    /// Resolve a mapping by its physical table name.
    fn resolve_table_by_db_name(
        &self,
        db_name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError>;
}

/// Contents of a mapping file, as produced by schema generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingFile {
    #[serde(default)]
    pub tables: Vec<TableMapping>,
    #[serde(default)]
    pub enums: Vec<EnumMapping>,
}

impl MappingFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse mapping file: {}", path.display()))
    }
}

/// An in-memory, immutable set of table mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingSet {
    by_query_name: HashMap<String, Arc<TableMapping>>,
    by_db_name: HashMap<String, Arc<TableMapping>>,
}

impl MappingSet {
    /// Index the mappings, rejecting duplicate logical or physical names.
    /// Each mapping's index is settled the way the store settles it on read.
    pub fn new(mappings: impl IntoIterator<Item = TableMapping>) -> Result<Self, MappingError> {
        let mut set = Self::default();
        for mut mapping in mappings {
            mapping.index = mapping.stored_index()?;
            let mapping = Arc::new(mapping);
            let query_key = mapping.query_table_name.to_lowercase();
            if set.by_query_name.contains_key(&query_key) {
                return Err(MappingError::DuplicateName {
                    kind: "logical",
                    name: mapping.query_table_name.clone(),
                });
            }
            let db_key = mapping.db_table_name.to_lowercase();
            if set.by_db_name.contains_key(&db_key) {
                return Err(MappingError::DuplicateName {
                    kind: "physical",
                    name: mapping.db_table_name.clone(),
                });
            }
            set.by_query_name.insert(query_key, mapping.clone());
            set.by_db_name.insert(db_key, mapping);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.by_query_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query_name.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableMapping>> {
        self.by_query_name.values()
    }

    /// Check that every nested reference target exists and carries a type
    /// index.
    pub fn validate(&self) -> Result<(), MappingError> {
        for mapping in self.by_query_name.values() {
            for property in &mapping.properties {
                let PropertyLayout::Single {
                    nested_table_name: Some(nested),
                    ..
                } = &property.layout
                else {
                    continue;
                };
                let target = self.by_query_name.get(&nested.to_lowercase()).ok_or_else(|| {
                    MappingError::UnknownNestedTable {
                        table: mapping.query_table_name.clone(),
                        property: property.property_name.clone(),
                        nested: nested.clone(),
                    }
                })?;
                if target.index.is_none() {
                    return Err(MappingError::MissingIndex(target.query_table_name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl MappingSource for MappingSet {
    fn resolve_table(&self, query_name: &str) -> Result<Option<Arc<TableMapping>>, MappingError> {
        Ok(self.by_query_name.get(&query_name.to_lowercase()).cloned())
    }

    fn resolve_table_by_db_name(
        &self,
        db_name: &str,
    ) -> Result<Option<Arc<TableMapping>>, MappingError> {
        Ok(self.by_db_name.get(&db_name.to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::types::{PropertyMapping, TableType};

    fn items() -> TableMapping {
        TableMapping::new("Catalog.Items", "_reference5", TableType::Catalog).with_index(5)
    }

    fn orders() -> TableMapping {
        TableMapping::new("Document.Orders", "_document9", TableType::Document)
            .with_index(9)
            .with_property(PropertyMapping::single("Item", "_fld10rref", Some("Catalog.Items")))
    }

    #[test]
    fn test_lookups_ignore_case() {
        let set = MappingSet::new([items(), orders()]).unwrap();
        let a = set.resolve_table("Catalog.Items").unwrap().unwrap();
        let b = set.resolve_table("catalog.items").unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = set.resolve_table_by_db_name("_DOCUMENT9").unwrap().unwrap();
        assert_eq!(c.query_table_name, "Document.Orders");
        assert!(set.resolve_table("Catalog.Missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let duplicate = TableMapping::new("CATALOG.ITEMS", "_reference6", TableType::Catalog);
        assert!(matches!(
            MappingSet::new([items(), duplicate]),
            Err(MappingError::DuplicateName { kind: "logical", .. })
        ));

        let duplicate = TableMapping::new("Catalog.Other", "_Reference5", TableType::Catalog);
        assert!(matches!(
            MappingSet::new([items(), duplicate]),
            Err(MappingError::DuplicateName { kind: "physical", .. })
        ));
    }

    #[test]
    fn test_validate_requires_indexed_targets() {
        assert!(MappingSet::new([items(), orders()]).unwrap().validate().is_ok());

        let set = MappingSet::new([orders()]).unwrap();
        assert!(matches!(
            set.validate(),
            Err(MappingError::UnknownNestedTable { nested, .. }) if nested == "Catalog.Items"
        ));

        let unindexed = TableMapping::new("Catalog.Items", "_Items", TableType::Catalog);
        let set = MappingSet::new([unindexed, orders()]).unwrap();
        assert!(matches!(
            set.validate(),
            Err(MappingError::MissingIndex(name)) if name == "Catalog.Items"
        ));
    }

    #[test]
    fn test_mapping_file_parses() {
        let file: MappingFile = serde_json::from_str(
            r#"{
                "tables": [{
                    "queryTableName": "Catalog.Items",
                    "dbTableName": "_reference5",
                    "type": "Catalog",
                    "index": 5,
                    "properties": [
                        {"propertyName": "Code", "layout": "single", "dbColumnName": "_code"}
                    ]
                }],
                "enums": [{"enumName": "Enum.Status", "enumValueName": "Open", "orderIndex": 0}]
            }"#,
        )
        .unwrap();
        assert_eq!(file.tables.len(), 1);
        assert_eq!(
            file.tables[0].properties[0],
            PropertyMapping::single("Code", "_code", None)
        );
        assert_eq!(file.enums[0].order_index, 0);
    }
}
