mod error;
mod source;
mod store;
mod types;

pub use error::MappingError;
pub use source::{MappingFile, MappingSet, MappingSource};
pub use store::{SchemaStore, ENUM_MAPPINGS, TABLE_MAPPINGS};
pub use types::{
    index_from_db_name, EnumMapping, PropertyLayout, PropertyMapping, TableMapping, TableType,
};
