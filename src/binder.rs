//! Attaching named parameters to commands.

use async_trait::async_trait;

use crate::engine::{map_rows, run_blocking, Mode};
use crate::error::{DbExecError, Result};
use crate::traits::{Command, DataRecord};
use crate::types::{DbType, ParameterDescriptor, ParameterDirection, ParameterSource, SqlValue};

/// Prefix `name` with `marker` unless it already starts with it.
/// Rejects names that are empty or whitespace once the marker is removed.
pub fn normalize_parameter_name(name: &str, marker: char) -> Result<String> {
    let mut chars = name.chars();
    let has_marker = chars
        .next()
        .is_some_and(|first| first.to_lowercase().eq(marker.to_lowercase()));
    let bare = if has_marker { chars.as_str() } else { name };
    if bare.trim().is_empty() {
        return Err(DbExecError::invalid_argument(
            "name",
            "The name cannot be empty or whitespace",
        ));
    }
    if has_marker {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", marker, name))
    }
}

/// Parameter binding on any [`Command`].
///
/// Binding a name that is already attached replaces that descriptor, so a
/// command never carries two descriptors for one parameter.
///
/// # Example
/// ```
/// use dbexec::binder::CommandExt;
/// use dbexec::drivers::InMemoryConnection;
/// use dbexec::traits::Connection;
///
/// let connection = InMemoryConnection::new();
/// let mut command = connection.create_command().unwrap();
/// command.bind("id", 7).unwrap();
/// command.bind_out("total", None, None).unwrap();
/// assert_eq!(command.parameters()[0].name, "@id");
/// ```
#[async_trait]
pub trait CommandExt: Command {
    /// Bind an input parameter with no declared type or size.
    fn bind(&mut self, name: &str, value: impl Into<SqlValue>) -> Result<&mut ParameterDescriptor> {
        self.bind_with(name, value, None, None, ParameterDirection::Input)
    }

    fn bind_with(
        &mut self,
        name: &str,
        value: impl Into<SqlValue>,
        db_type: Option<DbType>,
        size: Option<u32>,
        direction: ParameterDirection,
    ) -> Result<&mut ParameterDescriptor> {
        let name = normalize_parameter_name(name, self.parameter_marker())?;
        let descriptor = ParameterDescriptor {
            name,
            value: value.into(),
            db_type,
            size,
            direction,
        };

        let parameters = self.parameters_mut();
        let index = match parameters.iter().position(|p| p.name == descriptor.name) {
            Some(index) => {
                parameters[index] = descriptor;
                index
            }
            None => {
                parameters.push(descriptor);
                parameters.len() - 1
            }
        };
        Ok(&mut parameters[index])
    }

    fn bind_in_out(
        &mut self,
        name: &str,
        value: impl Into<SqlValue>,
        db_type: Option<DbType>,
        size: Option<u32>,
    ) -> Result<&mut ParameterDescriptor> {
        self.bind_with(name, value, db_type, size, ParameterDirection::InputOutput)
    }

    fn bind_out(
        &mut self,
        name: &str,
        db_type: Option<DbType>,
        size: Option<u32>,
    ) -> Result<&mut ParameterDescriptor> {
        self.bind_with(name, SqlValue::Null, db_type, size, ParameterDirection::Output)
    }

    fn bind_return(
        &mut self,
        name: &str,
        db_type: Option<DbType>,
        size: Option<u32>,
    ) -> Result<&mut ParameterDescriptor> {
        self.bind_with(name, SqlValue::Null, db_type, size, ParameterDirection::ReturnValue)
    }

    /// Bind every entry of `source` as an input parameter, in source order.
    fn bind_all(&mut self, source: &ParameterSource) -> Result<()> {
        for (name, value) in source.entries() {
            self.bind(name, value.clone())?;
        }
        Ok(())
    }

    /// Look up a bound parameter, typically to read an output value after execution.
    fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        let name = normalize_parameter_name(name, self.parameter_marker()).ok()?;
        self.parameters().iter().find(|p| p.name == name)
    }

    /// Execute this command as a reader and convert every row in cursor order.
    ///
    /// The cursor is released before returning. The command stays usable, so
    /// output and return-value parameters can be read afterwards.
    fn execute_reader_mapped<T, F>(&mut self, convert: F) -> Result<Vec<T>>
    where
        F: FnMut(&dyn DataRecord) -> Result<T>,
    {
        run_blocking(map_rows(self, Mode::Blocking, convert))
    }

    /// Non-blocking form of [`execute_reader_mapped`](Self::execute_reader_mapped).
    async fn execute_reader_mapped_async<T, F>(&mut self, convert: F) -> Result<Vec<T>>
    where
        T: Send,
        F: FnMut(&dyn DataRecord) -> Result<T> + Send,
    {
        map_rows(self, Mode::NonBlocking, convert).await
    }
}

#[async_trait]
impl<C: Command + ?Sized> CommandExt for C {}
