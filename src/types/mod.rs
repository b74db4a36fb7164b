mod command_spec;
mod convert;
mod parameter;
mod row;
mod sql_value;

pub use command_spec::{CommandKind, CommandSpec};
pub use convert::{enum_discriminant, ConversionError, FromSqlValue};
pub use parameter::{
    DbType, ParameterDescriptor, ParameterDirection, ParameterMap, ParameterSource, Record,
};
pub use row::{BufferedCursor, RawQueryResult};
pub use sql_value::SqlValue;

/// Locates a column either by zero-based ordinal or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLocator {
    Ordinal(i64),
    Name(String),
}

impl From<i32> for ColumnLocator {
    fn from(ordinal: i32) -> Self {
        ColumnLocator::Ordinal(i64::from(ordinal))
    }
}

impl From<i64> for ColumnLocator {
    fn from(ordinal: i64) -> Self {
        ColumnLocator::Ordinal(ordinal)
    }
}

impl From<usize> for ColumnLocator {
    fn from(ordinal: usize) -> Self {
        ColumnLocator::Ordinal(i64::try_from(ordinal).unwrap_or(i64::MAX))
    }
}

impl From<&str> for ColumnLocator {
    fn from(name: &str) -> Self {
        ColumnLocator::Name(name.to_string())
    }
}

impl From<String> for ColumnLocator {
    fn from(name: String) -> Self {
        ColumnLocator::Name(name)
    }
}
