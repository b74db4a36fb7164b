mod adapter;
mod command;
mod connection;
mod cursor;

pub use adapter::{AdapterCommands, AdapterFactory, DataAdapter, ProviderFactory};
pub use command::{Command, ExecutionSupport};
pub use connection::{Connection, ConnectionState};
pub use cursor::{DataRecord, RowCursor};
