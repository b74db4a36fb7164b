//! dbexec - A driver-agnostic command execution layer
//!
//! Issue stored procedures or raw SQL with named parameters against any
//! driver implementing the [`Connection`] capability traits, and read the
//! results back as typed values, in blocking or non-blocking mode.
//!
//! # Example
//! ```ignore
//! use dbexec::{ConnectionExt, PostgresConnection, RecordExt};
//! use dbexec::types::{CommandSpec, ParameterMap};
//!
//! let connection = PostgresConnection::new("host=localhost user=postgres")?;
//!
//! // Execute a stored procedure and map every row
//! let names = connection
//!     .execute(
//!         CommandSpec::stored_procedure("users_by_role")
//!             .parameters(ParameterMap::new().with("role", "admin")),
//!     )
//!     .dispose_connection_after(true)
//!     .execute_reader_mapped(|row| row.value::<String>("name"))
//!     .await?;
//! ```

pub mod accessor;
pub mod binder;
pub mod command_factory;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod traits;
pub mod types;

// Re-export main types for convenient access
pub use accessor::RecordExt;
pub use binder::CommandExt;
pub use command_factory::create_command;
pub use drivers::{InMemoryConnection, PostgresConnection};
pub use engine::{BlockingExecution, ConnectionExt, ExecutionRequest, Reader};
pub use error::{DbExecError, Result};
pub use resolver::{AdapterResolver, ResolutionStrategy};
pub use traits::{
    AdapterCommands, AdapterFactory, Command, Connection, ConnectionState, DataAdapter,
    DataRecord, ExecutionSupport, ProviderFactory, RowCursor,
};
pub use types::{
    CommandKind, CommandSpec, DbType, ParameterDescriptor, ParameterDirection, ParameterMap,
    ParameterSource, SqlValue,
};
