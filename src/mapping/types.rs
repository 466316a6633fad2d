//! Logical-to-physical mapping types.
//!
//! A `TableMapping` ties a logical table name (e.g. `Catalog.Counterparties`)
//! to the physical table that stores it, and lists how each logical property
//! is laid out in physical columns. Reference properties come in two shapes:
//! a single column pointing at one fixed target table, or a reference column
//! paired with a per-row type discriminator column.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MappingError;

/// Category of a logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableType {
    Catalog,
    Document,
    Enum,
    ChartOfCharacteristicTypes,
    ChartOfAccounts,
    InformationRegister,
    AccumulationRegister,
    AccountingRegister,
    TableSection,
    Constant,
}

impl TableType {
    pub const ALL: [TableType; 10] = [
        TableType::Catalog,
        TableType::Document,
        TableType::Enum,
        TableType::ChartOfCharacteristicTypes,
        TableType::ChartOfAccounts,
        TableType::InformationRegister,
        TableType::AccumulationRegister,
        TableType::AccountingRegister,
        TableType::TableSection,
        TableType::Constant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Catalog => "Catalog",
            TableType::Document => "Document",
            TableType::Enum => "Enum",
            TableType::ChartOfCharacteristicTypes => "ChartOfCharacteristicTypes",
            TableType::ChartOfAccounts => "ChartOfAccounts",
            TableType::InformationRegister => "InformationRegister",
            TableType::AccumulationRegister => "AccumulationRegister",
            TableType::AccountingRegister => "AccountingRegister",
            TableType::TableSection => "TableSection",
            TableType::Constant => "Constant",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableType {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MappingError::UnknownTableType(s.to_string()))
    }
}

/// Physical encoding of one logical property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "camelCase")]
pub enum PropertyLayout {
    /// Stored in exactly one column. With `nested_table_name` set the column
    /// is a reference that always targets that logical table.
    #[serde(rename_all = "camelCase")]
    Single {
        db_column_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nested_table_name: Option<String>,
    },
    /// A reference whose target table varies per row; the row's target is
    /// identified by the value of `table_index_column_name`.
    #[serde(rename_all = "camelCase")]
    Union {
        reference_column_name: String,
        table_index_column_name: String,
    },
}

/// One property of a logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMapping {
    pub property_name: String,
    #[serde(flatten)]
    pub layout: PropertyLayout,
}

const SINGLE_TAG: &str = "single";
const UNION_TAG: &str = "union";
const FIELD_SEPARATOR: char = '|';

impl PropertyMapping {
    pub fn single(
        property_name: impl Into<String>,
        db_column_name: impl Into<String>,
        nested_table_name: Option<&str>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            layout: PropertyLayout::Single {
                db_column_name: db_column_name.into(),
                nested_table_name: nested_table_name.map(str::to_string),
            },
        }
    }

    pub fn union(
        property_name: impl Into<String>,
        reference_column_name: impl Into<String>,
        table_index_column_name: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            layout: PropertyLayout::Union {
                reference_column_name: reference_column_name.into(),
                table_index_column_name: table_index_column_name.into(),
            },
        }
    }

    /// Whether the single-line text form gives this property back unchanged.
    /// Fields holding the separator, a line break or outer whitespace do not.
    pub fn is_storable(&self) -> bool {
        let text = self.to_string();
        !text.contains(['\r', '\n']) && Self::parse(&text).as_ref() == Some(self)
    }

    /// Parse the single-line form produced by `Display`.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text.trim().split(FIELD_SEPARATOR).collect();
        let [name, tag, first, second] = fields.as_slice() else {
            return None;
        };
        if name.is_empty() || first.is_empty() {
            return None;
        }
        let layout = match *tag {
            SINGLE_TAG => PropertyLayout::Single {
                db_column_name: first.to_string(),
                nested_table_name: (!second.is_empty()).then(|| second.to_string()),
            },
            UNION_TAG if !second.is_empty() => PropertyLayout::Union {
                reference_column_name: first.to_string(),
                table_index_column_name: second.to_string(),
            },
            _ => return None,
        };
        Some(Self {
            property_name: name.to_string(),
            layout,
        })
    }
}

impl fmt::Display for PropertyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = FIELD_SEPARATOR;
        match &self.layout {
            PropertyLayout::Single {
                db_column_name,
                nested_table_name,
            } => write!(
                f,
                "{}{sep}{SINGLE_TAG}{sep}{}{sep}{}",
                self.property_name,
                db_column_name,
                nested_table_name.as_deref().unwrap_or("")
            ),
            PropertyLayout::Union {
                reference_column_name,
                table_index_column_name,
            } => write!(
                f,
                "{}{sep}{UNION_TAG}{sep}{}{sep}{}",
                self.property_name, reference_column_name, table_index_column_name
            ),
        }
    }
}

/// Type discriminator encoded in a physical table name, such as the `5` in
/// `_Reference5`.
pub fn index_from_db_name(db_name: &str) -> Option<i32> {
    let digits = db_name.len() - db_name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    db_name[db_name.len() - digits..].parse().ok()
}

/// One logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub query_table_name: String,
    pub db_table_name: String,
    #[serde(rename = "type")]
    pub table_type: TableType,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
    /// Type discriminator of this table when it is one of several possible
    /// targets of a reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
}

impl TableMapping {
    pub fn new(
        query_table_name: impl Into<String>,
        db_table_name: impl Into<String>,
        table_type: TableType,
    ) -> Self {
        Self {
            query_table_name: query_table_name.into(),
            db_table_name: db_table_name.into(),
            table_type,
            properties: Vec::new(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    /// Type index this mapping has once stored. Only the physical name is
    /// persisted, so an explicit `index` must be the one that name encodes;
    /// an absent one is taken from the name.
    pub fn stored_index(&self) -> Result<Option<i32>, MappingError> {
        let derived = index_from_db_name(&self.db_table_name);
        match self.index {
            Some(index) if Some(index) != derived => Err(MappingError::IndexMismatch {
                table: self.query_table_name.clone(),
                index,
                db_table_name: self.db_table_name.clone(),
            }),
            _ => Ok(derived),
        }
    }

    /// Reject properties whose text form would not read back unchanged.
    pub fn check_properties(&self) -> Result<(), MappingError> {
        match self.properties.iter().find(|p| !p.is_storable()) {
            Some(property) => Err(MappingError::MalformedProperty {
                table: self.query_table_name.clone(),
                text: property.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Find a property by its logical name, ignoring case.
    pub fn find_property(&self, name: &str) -> Option<&PropertyMapping> {
        let name = name.to_lowercase();
        self.properties
            .iter()
            .find(|p| p.property_name.to_lowercase() == name)
    }

    /// Newline-joined serialized property list, as stored.
    pub fn serialize_properties(&self) -> String {
        self.properties
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inverse of `serialize_properties`. Blank lines are skipped and
    /// `\r\n` line endings are accepted.
    pub fn parse_properties(
        query_table_name: &str,
        text: &str,
    ) -> Result<Vec<PropertyMapping>, MappingError> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                PropertyMapping::parse(line).ok_or_else(|| MappingError::MalformedProperty {
                    table: query_table_name.to_string(),
                    text: line.to_string(),
                })
            })
            .collect()
    }
}

/// One value of a logical enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumMapping {
    pub enum_name: String,
    pub enum_value_name: String,
    pub order_index: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counterparties() -> TableMapping {
        TableMapping::new("Catalog.Counterparties", "_reference12", TableType::Catalog)
            .with_index(12)
            .with_property(PropertyMapping::single("Name", "_description", None))
            .with_property(PropertyMapping::single(
                "Parent",
                "_parentidrref",
                Some("Catalog.Counterparties"),
            ))
            .with_property(PropertyMapping::union(
                "Owner",
                "_owner_rrref",
                "_owner_rtref",
            ))
    }

    #[test]
    fn test_property_text_round_trip() {
        let mapping = counterparties();
        let text = mapping.serialize_properties();
        assert_eq!(
            text,
            "Name|single|_description|\n\
             Parent|single|_parentidrref|Catalog.Counterparties\n\
             Owner|union|_owner_rrref|_owner_rtref"
        );
        let parsed = TableMapping::parse_properties(&mapping.query_table_name, &text).unwrap();
        assert_eq!(parsed, mapping.properties);
    }

    #[test]
    fn test_parse_properties_accepts_crlf_and_blank_lines() {
        let parsed = TableMapping::parse_properties(
            "Catalog.Items",
            "Code|single|_code|\r\n\r\nKind|union|_kind_rrref|_kind_rtref\r\n",
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                PropertyMapping::single("Code", "_code", None),
                PropertyMapping::union("Kind", "_kind_rrref", "_kind_rtref"),
            ]
        );
    }

    #[test]
    fn test_malformed_property_text_is_rejected() {
        for text in [
            "Name|single",
            "Name|nested|_a|_b",
            "Name|union|_a|",
            "|single|_a|",
            "Name|single||",
            "Name|single|_a|_b|_c",
        ] {
            let err = TableMapping::parse_properties("Catalog.Items", text).unwrap_err();
            assert!(
                matches!(&err, MappingError::MalformedProperty { table, text: t }
                    if table == "Catalog.Items" && t == text),
                "unexpected error for {:?}: {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_unstorable_properties_are_detected() {
        assert!(PropertyMapping::single("Name", "_description", None).is_storable());
        for property in [
            PropertyMapping::single("A|B", "_ab", None),
            PropertyMapping::single(" Name", "_description", None),
            PropertyMapping::union("Owner", "_owner_rrref", "_owner_rtref "),
            PropertyMapping::single("Name", "_desc\nription", None),
            PropertyMapping::single("Name", "", None),
            PropertyMapping::single("Name", "_ref", Some("")),
        ] {
            let mapping = TableMapping::new("Catalog.X", "_reference3", TableType::Catalog)
                .with_property(property.clone());
            assert!(
                matches!(
                    mapping.check_properties(),
                    Err(MappingError::MalformedProperty { table, text })
                        if table == "Catalog.X" && text == property.to_string()
                ),
                "{:?}",
                property
            );
        }
        assert!(counterparties().check_properties().is_ok());
    }

    #[test]
    fn test_index_from_db_name() {
        assert_eq!(index_from_db_name("_Reference5"), Some(5));
        assert_eq!(index_from_db_name("_document1234"), Some(1234));
        assert_eq!(index_from_db_name("_Const"), None);
        assert_eq!(index_from_db_name(""), None);
    }

    #[test]
    fn test_stored_index_follows_physical_name() {
        assert_eq!(counterparties().stored_index().unwrap(), Some(12));
        let implicit = TableMapping::new("Catalog.Items", "_Reference5", TableType::Catalog);
        assert_eq!(implicit.stored_index().unwrap(), Some(5));
        let plain = TableMapping::new("Catalog.Items", "_Items", TableType::Catalog);
        assert_eq!(plain.stored_index().unwrap(), None);

        for mapping in [
            TableMapping::new("Catalog.Items", "_Items", TableType::Catalog).with_index(5),
            TableMapping::new("Catalog.Items", "_Reference6", TableType::Catalog).with_index(5),
        ] {
            assert!(matches!(
                mapping.stored_index(),
                Err(MappingError::IndexMismatch { table, index: 5, .. }) if table == "Catalog.Items"
            ));
        }
    }

    #[test]
    fn test_table_type_parses_case_insensitively() {
        assert_eq!("catalog".parse::<TableType>().unwrap(), TableType::Catalog);
        assert_eq!(
            "INFORMATIONREGISTER".parse::<TableType>().unwrap(),
            TableType::InformationRegister
        );
        assert!(matches!(
            "Register".parse::<TableType>(),
            Err(MappingError::UnknownTableType(tag)) if tag == "Register"
        ));
        for table_type in TableType::ALL {
            assert_eq!(
                table_type.to_string().parse::<TableType>().unwrap(),
                table_type
            );
        }
    }

    #[test]
    fn test_find_property_ignores_case() {
        let mapping = counterparties();
        assert_eq!(
            mapping.find_property("owner").map(|p| &p.layout),
            Some(&PropertyLayout::Union {
                reference_column_name: "_owner_rrref".into(),
                table_index_column_name: "_owner_rtref".into(),
            })
        );
        assert!(mapping.find_property("Missing").is_none());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(counterparties()).unwrap();
        assert_eq!(json["queryTableName"], "Catalog.Counterparties");
        assert_eq!(json["type"], "Catalog");
        assert_eq!(json["index"], 12);
        assert_eq!(json["properties"][1]["layout"], "single");
        assert_eq!(
            json["properties"][1]["nestedTableName"],
            "Catalog.Counterparties"
        );
        assert_eq!(json["properties"][2]["layout"], "union");
        assert_eq!(json["properties"][2]["tableIndexColumnName"], "_owner_rtref");

        let back: TableMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, counterparties());
    }
}
