use crate::error::{DbExecError, Result};
use crate::types::{ParameterSource, Record};

/// How a command's text is interpreted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    /// The text names a stored procedure.
    #[default]
    StoredProcedure,
    /// The text is a raw SQL statement.
    Text,
}

/// Everything needed to build a command: text, kind, parameters and timeout.
///
/// # Example
/// ```
/// use dbexec::types::{CommandSpec, ParameterMap};
///
/// let spec = CommandSpec::stored_procedure("get_user")
///     .parameters(ParameterMap::new().with("id", 7))
///     .timeout(30);
/// assert_eq!(spec.timeout_seconds(), Some(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    text: String,
    kind: CommandKind,
    parameters: Option<ParameterSource>,
    timeout_seconds: Option<u32>,
}

impl CommandSpec {
    pub fn new(text: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            kind,
            parameters: None,
            timeout_seconds: None,
        }
    }

    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self::new(name, CommandKind::StoredProcedure)
    }

    pub fn text(sql: impl Into<String>) -> Self {
        Self::new(sql, CommandKind::Text)
    }

    pub fn parameters(mut self, source: impl Into<ParameterSource>) -> Self {
        self.parameters = Some(source.into());
        self
    }

    /// Bind the fields of a [`Record`] as parameters.
    pub fn record<R: Record + ?Sized>(self, record: &R) -> Self {
        self.parameters(ParameterSource::from_record(record))
    }

    /// Command timeout in seconds. Without one the driver default applies.
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn command_text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn parameter_source(&self) -> Option<&ParameterSource> {
        self.parameters.as_ref()
    }

    pub fn timeout_seconds(&self) -> Option<u32> {
        self.timeout_seconds
    }

    /// Checks the command text without touching any connection.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(DbExecError::invalid_argument(
                "command_text",
                "The command text cannot be empty or whitespace",
            ));
        }
        Ok(())
    }
}
