//! The execution engine.
//!
//! One operation per use case, each running in one of two modes:
//!
//! - **Non-blocking** (`ExecutionRequest::execute_*`): every driver call goes
//!   through its `*_async` form. Drivers reporting
//!   [`ExecutionSupport::Degraded`] run those synchronously, so the returned
//!   future resolves to the same result as the blocking form but may block
//!   the polling thread while the driver works.
//! - **Blocking** (`ExecutionRequest::blocking().execute_*`): every driver
//!   call goes through its blocking form and runs to completion on the
//!   calling thread.
//!
//! The engine opens a closed connection before creating the command and
//! never closes a connection unless `dispose_connection_after` is set, in
//! which case the connection is closed on every exit path.

use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::command_factory::create_command;
use crate::error::{DbExecError, Result};
use crate::traits::{Command, Connection, ConnectionState, DataRecord, ExecutionSupport, RowCursor};
use crate::types::{CommandSpec, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Blocking,
    NonBlocking,
}

/// Closes the connection it was given when released or dropped.
struct ConnectionScope<'c> {
    connection: Option<&'c dyn Connection>,
}

impl<'c> ConnectionScope<'c> {
    fn new(connection: &'c dyn Connection, dispose: bool) -> Self {
        Self {
            connection: dispose.then_some(connection),
        }
    }

    fn owns_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn release(mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                warn!(error = %e, driver = connection.type_name(), "failed to close connection");
            }
        }
    }
}

/// A connection plus a command to run on it.
///
/// # Example
/// ```
/// use dbexec::drivers::{InMemoryConnection, InMemoryTestResponseBuilder};
/// use dbexec::engine::ExecutionRequest;
/// use dbexec::types::{CommandSpec, ParameterMap};
/// use dbexec::RecordExt;
///
/// let connection = InMemoryConnection::new().with_rows(
///     InMemoryTestResponseBuilder::new()
///         .columns(&["name"])
///         .text_row(&["Alice"])
///         .build(),
/// );
///
/// let names = ExecutionRequest::new(
///     Some(&connection),
///     CommandSpec::stored_procedure("list_users")
///         .parameters(ParameterMap::new().with("active", true)),
/// )
/// .dispose_connection_after(true)
/// .blocking()
/// .execute_reader_mapped(|row| row.value::<String>("name"))
/// .unwrap();
///
/// assert_eq!(names, vec!["Alice".to_string()]);
/// ```
pub struct ExecutionRequest<'c> {
    connection: Option<&'c dyn Connection>,
    spec: CommandSpec,
    dispose_connection_after: bool,
}

impl<'c> ExecutionRequest<'c> {
    pub fn new(connection: Option<&'c dyn Connection>, spec: CommandSpec) -> Self {
        Self {
            connection,
            spec,
            dispose_connection_after: false,
        }
    }

    /// Hand the connection to the engine, which closes it once the call
    /// (or, for [`execute_reader`](Self::execute_reader), the returned reader) is done.
    pub fn dispose_connection_after(mut self, dispose: bool) -> Self {
        self.dispose_connection_after = dispose;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Run this request in blocking mode.
    pub fn blocking(self) -> BlockingExecution<'c> {
        BlockingExecution { request: self }
    }

    /// Execute and return a forward-only reader.
    ///
    /// With `dispose_connection_after` set, the reader owns connection
    /// teardown: the connection closes when the reader is closed or dropped.
    pub async fn execute_reader(self) -> Result<Reader<'c>> {
        self.reader(Mode::NonBlocking).await
    }

    /// Execute, convert every row with `convert` in cursor order, and release
    /// the cursor, the command and (if owned) the connection before returning.
    pub async fn execute_reader_mapped<T, F>(self, convert: F) -> Result<Vec<T>>
    where
        F: FnMut(&dyn DataRecord) -> Result<T>,
    {
        self.reader_mapped(Mode::NonBlocking, convert).await
    }

    /// First column of the first row, or [`SqlValue::Null`] without rows.
    pub async fn execute_scalar(self) -> Result<SqlValue> {
        self.scalar(Mode::NonBlocking).await
    }

    /// Driver-reported affected row count.
    pub async fn execute_non_query(self) -> Result<i64> {
        self.non_query(Mode::NonBlocking).await
    }

    fn connection(&self) -> Result<&'c dyn Connection> {
        let connection = self.connection.ok_or_else(|| {
            DbExecError::invalid_argument("connection", "The connection cannot be null")
        })?;
        self.spec.validate()?;
        Ok(connection)
    }

    async fn prepare(&self, mode: Mode) -> Result<(ConnectionScope<'c>, Box<dyn Command>)> {
        let connection = self.connection()?;
        let scope = ConnectionScope::new(connection, self.dispose_connection_after);
        if connection.state() == ConnectionState::Closed {
            debug!(driver = connection.type_name(), ?mode, "opening connection");
            match mode {
                Mode::Blocking => connection.open()?,
                Mode::NonBlocking => connection.open_async().await?,
            }
        }
        let command = create_command(Some(connection), &self.spec)?;
        if mode == Mode::NonBlocking && command.execution_support() == ExecutionSupport::Degraded {
            trace!(
                driver = connection.type_name(),
                "driver has no native non-blocking path, running blocking call"
            );
        }
        Ok((scope, command))
    }

    async fn reader(self, mode: Mode) -> Result<Reader<'c>> {
        let (scope, mut command) = self.prepare(mode).await?;
        let cursor = execute_cursor(command.as_mut(), mode).await?;
        drop(command);
        debug!(text = self.spec.command_text(), owns_connection = scope.owns_connection(), "reader opened");
        Ok(Reader { cursor, scope })
    }

    async fn reader_mapped<T, F>(self, mode: Mode, convert: F) -> Result<Vec<T>>
    where
        F: FnMut(&dyn DataRecord) -> Result<T>,
    {
        let (scope, mut command) = self.prepare(mode).await?;
        let output = map_rows(command.as_mut(), mode, convert).await?;
        drop(command);
        scope.release()?;
        debug!(text = self.spec.command_text(), rows = output.len(), "mapped reader completed");
        Ok(output)
    }

    async fn scalar(self, mode: Mode) -> Result<SqlValue> {
        let (scope, mut command) = self.prepare(mode).await?;
        let value = match mode {
            Mode::Blocking => command.execute_scalar()?,
            Mode::NonBlocking => command.execute_scalar_async().await?,
        };
        drop(command);
        scope.release()?;
        debug!(text = self.spec.command_text(), null = value.is_null(), "scalar completed");
        Ok(value)
    }

    async fn non_query(self, mode: Mode) -> Result<i64> {
        let (scope, mut command) = self.prepare(mode).await?;
        let affected = match mode {
            Mode::Blocking => command.execute_non_query()?,
            Mode::NonBlocking => command.execute_non_query_async().await?,
        };
        drop(command);
        scope.release()?;
        debug!(text = self.spec.command_text(), affected, "non-query completed");
        Ok(affected)
    }
}

async fn execute_cursor<C>(command: &mut C, mode: Mode) -> Result<Box<dyn RowCursor>>
where
    C: Command + ?Sized,
{
    match mode {
        Mode::Blocking => command.execute_reader(),
        Mode::NonBlocking => command.execute_reader_async().await,
    }
}

/// Execute `command` as a reader and convert every row in cursor order.
/// The cursor is released before returning, on success or failure.
pub(crate) async fn map_rows<C, T, F>(command: &mut C, mode: Mode, mut convert: F) -> Result<Vec<T>>
where
    C: Command + ?Sized,
    F: FnMut(&dyn DataRecord) -> Result<T>,
{
    let mut cursor = execute_cursor(command, mode).await?;
    let mut output = Vec::new();
    loop {
        let has_row = match mode {
            Mode::Blocking => cursor.advance()?,
            Mode::NonBlocking => cursor.advance_async().await?,
        };
        if !has_row {
            break;
        }
        output.push(convert(&CurrentRow(&*cursor))?);
    }
    Ok(output)
}

/// Exposes only the record accessors of a cursor to conversion callbacks.
struct CurrentRow<'a>(&'a dyn RowCursor);

impl DataRecord for CurrentRow<'_> {
    fn field_count(&self) -> usize {
        self.0.field_count()
    }

    fn field_name(&self, ordinal: usize) -> Result<&str> {
        self.0.field_name(ordinal)
    }

    fn is_null(&self, ordinal: usize) -> Result<bool> {
        self.0.is_null(ordinal)
    }

    fn value_at(&self, ordinal: usize) -> Result<SqlValue> {
        self.0.value_at(ordinal)
    }

    fn ordinal_of(&self, name: &str) -> Result<usize> {
        self.0.ordinal_of(name)
    }
}

/// A cursor returned by [`ExecutionRequest::execute_reader`].
///
/// When the request set `dispose_connection_after`, the reader closes the
/// connection on [`close`](Self::close) or when dropped.
pub struct Reader<'c> {
    cursor: Box<dyn RowCursor>,
    scope: ConnectionScope<'c>,
}

impl Reader<'_> {
    /// Whether dropping this reader closes the connection.
    pub fn owns_connection(&self) -> bool {
        self.scope.owns_connection()
    }

    /// Release the cursor and, if owned, close the connection, reporting
    /// any error the close raises.
    pub fn close(self) -> Result<()> {
        let Reader { cursor, scope } = self;
        drop(cursor);
        scope.release()
    }
}

impl DataRecord for Reader<'_> {
    fn field_count(&self) -> usize {
        self.cursor.field_count()
    }

    fn field_name(&self, ordinal: usize) -> Result<&str> {
        self.cursor.field_name(ordinal)
    }

    fn is_null(&self, ordinal: usize) -> Result<bool> {
        self.cursor.is_null(ordinal)
    }

    fn value_at(&self, ordinal: usize) -> Result<SqlValue> {
        self.cursor.value_at(ordinal)
    }

    fn ordinal_of(&self, name: &str) -> Result<usize> {
        self.cursor.ordinal_of(name)
    }
}

#[async_trait]
impl<'c> RowCursor for Reader<'c> {
    fn advance(&mut self) -> Result<bool> {
        self.cursor.advance()
    }

    async fn advance_async(&mut self) -> Result<bool> {
        self.cursor.advance_async().await
    }
}

/// Blocking form of an [`ExecutionRequest`]. Every call runs to completion
/// on the calling thread.
pub struct BlockingExecution<'c> {
    request: ExecutionRequest<'c>,
}

impl<'c> BlockingExecution<'c> {
    pub fn execute_reader(self) -> Result<Reader<'c>> {
        run_blocking(self.request.reader(Mode::Blocking))
    }

    pub fn execute_reader_mapped<T, F>(self, convert: F) -> Result<Vec<T>>
    where
        F: FnMut(&dyn DataRecord) -> Result<T>,
    {
        run_blocking(self.request.reader_mapped(Mode::Blocking, convert))
    }

    pub fn execute_scalar(self) -> Result<SqlValue> {
        run_blocking(self.request.scalar(Mode::Blocking))
    }

    pub fn execute_non_query(self) -> Result<i64> {
        run_blocking(self.request.non_query(Mode::Blocking))
    }
}

// Blocking mode only calls blocking driver methods, so the future never
// waits on a reactor and can be driven in place.
pub(crate) fn run_blocking<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    futures::executor::block_on(future)
}

/// Shorthand for building an [`ExecutionRequest`] from a connection.
pub trait ConnectionExt: Connection + Sized {
    fn execute(&self, spec: CommandSpec) -> ExecutionRequest<'_> {
        ExecutionRequest::new(Some(self), spec)
    }
}

impl<C: Connection> ConnectionExt for C {}
