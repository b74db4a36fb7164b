use tracing::debug;

use crate::binder::CommandExt;
use crate::error::{DbExecError, Result};
use crate::traits::{Command, Connection};
use crate::types::CommandSpec;

/// Build a ready-to-run command from a [`CommandSpec`].
///
/// Parameters from `spec` are bound as plain inputs. Output parameters and
/// explicit types are bound afterwards through [`CommandExt`]. The returned
/// command is owned by the caller.
pub fn create_command(
    connection: Option<&dyn Connection>,
    spec: &CommandSpec,
) -> Result<Box<dyn Command>> {
    let connection = connection.ok_or_else(|| {
        DbExecError::invalid_argument("connection", "The connection cannot be null")
    })?;
    spec.validate()?;

    let mut command = connection.create_command()?;
    command.set_kind(spec.kind());
    command.set_command_text(spec.command_text());
    if let Some(seconds) = spec.timeout_seconds() {
        command.set_timeout(seconds);
    }
    if let Some(source) = spec.parameter_source() {
        command.bind_all(source)?;
    }

    debug!(
        text = spec.command_text(),
        kind = ?spec.kind(),
        parameters = command.parameters().len(),
        "created command"
    );
    Ok(command)
}
