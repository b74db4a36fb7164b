use std::any::Any;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{AdapterFactory, Command};

/// Lifecycle state of a connection as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
}

/// A connection to a database.
///
/// Methods take `&self`; drivers keep their mutable state behind interior
/// mutability so that a reader can own connection teardown while borrowing
/// the connection.
#[async_trait]
pub trait Connection: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Open the connection, blocking the calling thread.
    fn open(&self) -> Result<()>;

    /// Open the connection without blocking. Drivers without a native
    /// non-blocking path inherit this default, which runs [`open`](Self::open).
    async fn open_async(&self) -> Result<()> {
        self.open()
    }

    /// Close the connection and release the resources it holds.
    /// Closing an already closed connection is a no-op.
    fn close(&self) -> Result<()>;

    /// Create a new, empty command bound to this connection.
    fn create_command(&self) -> Result<Box<dyn Command>>;

    /// The concrete connection as [`Any`], used to match built-in driver types.
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete connection type, used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Drivers that can build their own bulk data adapter return it here.
    fn adapter_factory(&self) -> Option<&dyn AdapterFactory> {
        None
    }
}
