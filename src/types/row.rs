use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::{DbExecError, Result};
use crate::traits::{DataRecord, RowCursor};
use crate::types::SqlValue;

/// Driver-agnostic, fully buffered result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    /// Column names in order
    pub columns: Vec<String>,
    /// Rows, where each row holds one value per column
    pub rows: Vec<Vec<SqlValue>>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Drains a cursor into a buffered result.
    pub async fn read_all(cursor: &mut dyn RowCursor) -> Result<Self> {
        let columns = (0..cursor.field_count())
            .map(|i| cursor.field_name(i).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = Vec::new();
        while cursor.advance_async().await? {
            let row = (0..columns.len())
                .map(|i| cursor.value_at(i))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn into_cursor(self) -> BufferedCursor {
        BufferedCursor::new(self)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A forward-only cursor over rows already held in memory.
#[derive(Debug, Clone)]
pub struct BufferedCursor {
    columns: Vec<String>,
    pending: VecDeque<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
}

impl BufferedCursor {
    pub fn new(result: RawQueryResult) -> Self {
        Self {
            columns: result.columns,
            pending: result.rows.into(),
            current: None,
        }
    }

    fn current_value(&self, ordinal: usize) -> Result<&SqlValue> {
        let row = self.current.as_ref().ok_or_else(|| {
            DbExecError::QueryFailed("The cursor is not positioned on a row".to_string())
        })?;
        row.get(ordinal)
            .ok_or_else(|| DbExecError::ColumnNotFound(format!("ordinal {}", ordinal)))
    }
}

impl DataRecord for BufferedCursor {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn field_name(&self, ordinal: usize) -> Result<&str> {
        self.columns
            .get(ordinal)
            .map(String::as_str)
            .ok_or_else(|| DbExecError::ColumnNotFound(format!("ordinal {}", ordinal)))
    }

    fn is_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.current_value(ordinal)?.is_null())
    }

    fn value_at(&self, ordinal: usize) -> Result<SqlValue> {
        self.current_value(ordinal).cloned()
    }

    /// Exact match first, then a case-insensitive match.
    fn ordinal_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
            .ok_or_else(|| DbExecError::ColumnNotFound(name.to_string()))
    }
}

#[async_trait]
impl RowCursor for BufferedCursor {
    fn advance(&mut self) -> Result<bool> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }
}
