use async_trait::async_trait;

use crate::error::Result;
use crate::types::SqlValue;

/// Read access to the row a cursor is positioned on.
pub trait DataRecord {
    fn field_count(&self) -> usize;

    fn field_name(&self, ordinal: usize) -> Result<&str>;

    fn is_null(&self, ordinal: usize) -> Result<bool>;

    fn value_at(&self, ordinal: usize) -> Result<SqlValue>;

    fn ordinal_of(&self, name: &str) -> Result<usize>;
}

/// A forward-only, single-pass sequence of rows.
#[async_trait]
pub trait RowCursor: DataRecord + Send {
    /// Move to the next row. Returns false once the rows are exhausted.
    fn advance(&mut self) -> Result<bool>;

    async fn advance_async(&mut self) -> Result<bool> {
        self.advance()
    }
}
