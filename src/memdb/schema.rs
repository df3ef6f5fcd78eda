use crate::error::PlanedbError;
use crate::memdb::encoded_key::EncodedKey;

/// Extracts the encoded index key from a record. Returning `None` means the
/// record does not carry the indexed fields (it is not indexed under this
/// index); for the primary `id` index that is a schema violation.
pub type Keyer<R> = fn(&R) -> Option<EncodedKey>;

pub struct IndexSchema<R> {
    pub name: &'static str,
    pub unique: bool,
    pub keyer: Keyer<R>,
}

pub struct TableSchema<R> {
    pub name: &'static str,
    /// The first entry must be the unique `id` index; its key is the
    /// table's primary key.
    pub indexes: Vec<IndexSchema<R>>,
}

pub struct Schema<R> {
    pub tables: Vec<TableSchema<R>>,
}

impl<R> Schema<R> {
    /// Every index name is queryable in two forms: exact (`name`) and byte
    /// prefix (`name_prefix`), so declared names must not end in the
    /// reserved suffix.
    pub fn validate(&self) -> Result<(), PlanedbError> {
        for table in &self.tables {
            let first = table.indexes.first().ok_or_else(|| PlanedbError::SchemaViolation {
                table: table.name.to_string(),
            })?;
            if first.name != "id" || !first.unique {
                return Err(PlanedbError::SchemaViolation {
                    table: table.name.to_string(),
                });
            }
            for (i, index) in table.indexes.iter().enumerate() {
                if index.name.ends_with("_prefix") {
                    return Err(PlanedbError::UnknownIndex {
                        table: table.name.to_string(),
                        index: index.name.to_string(),
                    });
                }
                if table.indexes[..i].iter().any(|other| other.name == index.name) {
                    return Err(PlanedbError::UnknownIndex {
                        table: table.name.to_string(),
                        index: index.name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
