//! Typed access to the values of the current row.

use crate::error::{DbExecError, Result};
use crate::traits::DataRecord;
use crate::types::{ColumnLocator, FromSqlValue};

/// Read the value at `column` converted to `T`.
///
/// A null cell yields `T`'s zero or default value (the zero member for
/// enumerations declared with [`sql_enum!`](crate::sql_enum)). A non-null
/// cell that cannot be converted yields [`DbExecError::Conversion`].
pub fn value<T, R>(record: &R, column: impl Into<ColumnLocator>) -> Result<T>
where
    T: FromSqlValue,
    R: DataRecord + ?Sized,
{
    let ordinal = match column.into() {
        ColumnLocator::Ordinal(ordinal) if ordinal < 0 => {
            return Err(DbExecError::invalid_argument(
                "ordinal",
                "The ordinal cannot be less than zero",
            ))
        }
        ColumnLocator::Ordinal(ordinal) => usize::try_from(ordinal)
            .map_err(|_| DbExecError::ColumnNotFound(format!("ordinal {}", ordinal)))?,
        ColumnLocator::Name(name) => record.ordinal_of(&name)?,
    };

    let converted = if record.is_null(ordinal)? {
        T::from_null()
    } else {
        T::from_sql_value(record.value_at(ordinal)?)
    };
    converted.map_err(|source| DbExecError::Conversion {
        column: ordinal,
        source,
    })
}

/// Method form of [`value`] for every [`DataRecord`], including cursors.
pub trait RecordExt: DataRecord {
    fn value<T: FromSqlValue>(&self, column: impl Into<ColumnLocator>) -> Result<T> {
        value(self, column)
    }
}

impl<R: DataRecord + ?Sized> RecordExt for R {}
