use async_trait::async_trait;

use crate::error::{DbExecError, Result};
use crate::traits::Command;
use crate::types::RawQueryResult;

/// The four command slots of a bulk data adapter.
#[derive(Default)]
pub struct AdapterCommands {
    pub select: Option<Box<dyn Command>>,
    pub insert: Option<Box<dyn Command>>,
    pub update: Option<Box<dyn Command>>,
    pub delete: Option<Box<dyn Command>>,
}

impl AdapterCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, command: Box<dyn Command>) -> Self {
        self.select = Some(command);
        self
    }

    pub fn insert(mut self, command: Box<dyn Command>) -> Self {
        self.insert = Some(command);
        self
    }

    pub fn update(mut self, command: Box<dyn Command>) -> Self {
        self.update = Some(command);
        self
    }

    pub fn delete(mut self, command: Box<dyn Command>) -> Self {
        self.delete = Some(command);
        self
    }
}

/// A vendor-specific bundle of select/insert/update/delete commands.
#[async_trait]
pub trait DataAdapter: Send {
    fn driver_name(&self) -> &str;

    fn commands(&self) -> &AdapterCommands;

    fn commands_mut(&mut self) -> &mut AdapterCommands;

    /// Run the select command and buffer every row it yields.
    async fn fill(&mut self) -> Result<RawQueryResult> {
        let command = self.commands_mut().select.as_mut().ok_or_else(|| {
            DbExecError::invalid_argument("select_command", "The adapter has no select command")
        })?;
        let mut cursor = command.execute_reader_async().await?;
        RawQueryResult::read_all(cursor.as_mut()).await
    }
}

/// Implemented by connections that know how to build their own adapter.
pub trait AdapterFactory: Send + Sync {
    fn create_data_adapter(&self) -> Box<dyn DataAdapter>;
}

/// A driver-supplied object that manufactures adapters for one connection type.
/// Registered with the [`AdapterResolver`](crate::resolver::AdapterResolver)
/// for drivers that do not implement [`AdapterFactory`].
pub trait ProviderFactory: Send + Sync {
    fn create_data_adapter(&self) -> Box<dyn DataAdapter>;
}
