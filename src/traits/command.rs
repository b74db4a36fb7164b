use async_trait::async_trait;

use crate::error::Result;
use crate::traits::RowCursor;
use crate::types::{CommandKind, ParameterDescriptor, SqlValue};

/// Whether a driver has a real non-blocking execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionSupport {
    /// `*_async` methods suspend while the driver performs I/O.
    Native,
    /// `*_async` methods run the blocking call and resolve immediately.
    Degraded,
}

/// A command ready to be executed against its connection.
///
/// The `*_async` methods default to the blocking forms. A driver overriding
/// them should report [`ExecutionSupport::Native`].
#[async_trait]
pub trait Command: Send {
    fn command_text(&self) -> &str;

    fn set_command_text(&mut self, text: &str);

    fn kind(&self) -> CommandKind;

    fn set_kind(&mut self, kind: CommandKind);

    fn timeout(&self) -> Option<u32>;

    fn set_timeout(&mut self, seconds: u32);

    /// Character every parameter name starts with.
    fn parameter_marker(&self) -> char {
        '@'
    }

    fn parameters(&self) -> &[ParameterDescriptor];

    fn parameters_mut(&mut self) -> &mut Vec<ParameterDescriptor>;

    fn execution_support(&self) -> ExecutionSupport {
        ExecutionSupport::Degraded
    }

    fn execute_reader(&mut self) -> Result<Box<dyn RowCursor>>;

    /// First column of the first row, or [`SqlValue::Null`] when there is no row.
    fn execute_scalar(&mut self) -> Result<SqlValue>;

    /// Driver-reported affected row count.
    fn execute_non_query(&mut self) -> Result<i64>;

    async fn execute_reader_async(&mut self) -> Result<Box<dyn RowCursor>> {
        self.execute_reader()
    }

    async fn execute_scalar_async(&mut self) -> Result<SqlValue> {
        self.execute_scalar()
    }

    async fn execute_non_query_async(&mut self) -> Result<i64> {
        self.execute_non_query()
    }
}
