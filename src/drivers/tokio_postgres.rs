use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error};

use crate::error::{DbExecError, Result};
use crate::traits::{Command, Connection, ConnectionState, ExecutionSupport, RowCursor};
use crate::types::{CommandKind, DbType, ParameterDescriptor, RawQueryResult, SqlValue};

/// PostgreSQL connection using tokio-postgres.
///
/// Non-blocking calls are native. Blocking calls run on the runtime the
/// connection was created on, which must be a multi-threaded runtime.
///
/// Text commands may use `@name` placeholders; they are rewritten to
/// positional `$n` parameters. Stored procedures run as
/// `SELECT * FROM name(arg => $1, ...)`. Output and return-value parameters
/// are not sent to the server.
pub struct PostgresConnection {
    config: Config,
    handle: Handle,
    client: Mutex<Option<Arc<Client>>>,
}

impl PostgresConnection {
    /// Create a closed connection from a connection string, capturing the
    /// current tokio runtime. Nothing is sent to the server until it is opened.
    pub fn new(connection_string: &str) -> Result<Self> {
        let config = parse_config(connection_string)?;
        let handle = Handle::try_current().map_err(|e| {
            DbExecError::ConnectionFailed(format!("A tokio runtime is required: {}", e))
        })?;
        Ok(Self::with_config(config, handle))
    }

    /// Create a closed connection that runs its I/O on `handle`.
    pub fn with_handle(connection_string: &str, handle: Handle) -> Result<Self> {
        Ok(Self::with_config(parse_config(connection_string)?, handle))
    }

    fn with_config(config: Config, handle: Handle) -> Self {
        Self {
            config,
            handle,
            client: Mutex::new(None),
        }
    }

    fn client_slot(&self) -> MutexGuard<'_, Option<Arc<Client>>> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn connect(&self) -> Result<()> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| DbExecError::Driver(Box::new(e)))?;

        // Spawn the connection handler
        self.handle.spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!(host = ?self.config.get_hosts(), "connected to PostgreSQL");
        *self.client_slot() = Some(Arc::new(client));
        Ok(())
    }
}

fn parse_config(connection_string: &str) -> Result<Config> {
    connection_string
        .parse::<Config>()
        .map_err(|e| DbExecError::ConnectionFailed(e.to_string()))
}

/// Drive `future` to completion on `handle` from synchronous code.
fn run_blocking<F, T>(handle: &Handle, future: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
    T: Send,
{
    if Handle::try_current().is_ok() {
        std::thread::scope(|s| {
            s.spawn(|| handle.block_on(future))
                .join()
                .map_err(|_| DbExecError::QueryFailed("Blocking worker panicked".to_string()))?
        })
    } else {
        handle.block_on(future)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn state(&self) -> ConnectionState {
        match self.client_slot().as_ref() {
            Some(client) if !client.is_closed() => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    fn open(&self) -> Result<()> {
        run_blocking(&self.handle, self.connect())
    }

    async fn open_async(&self) -> Result<()> {
        self.connect().await
    }

    fn close(&self) -> Result<()> {
        // Dropping the last client handle ends the connection task.
        self.client_slot().take();
        Ok(())
    }

    fn create_command(&self) -> Result<Box<dyn Command>> {
        let client = self
            .client_slot()
            .clone()
            .ok_or_else(|| DbExecError::ConnectionFailed("The connection is not open".to_string()))?;
        Ok(Box::new(PostgresCommand {
            client,
            handle: self.handle.clone(),
            text: String::new(),
            kind: CommandKind::default(),
            timeout: None,
            parameters: Vec::new(),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct PostgresCommand {
    client: Arc<Client>,
    handle: Handle,
    text: String,
    kind: CommandKind,
    timeout: Option<u32>,
    parameters: Vec<ParameterDescriptor>,
}

impl PostgresCommand {
    fn statement(&self) -> Result<(String, Vec<&ParameterDescriptor>)> {
        let marker = self.parameter_marker();
        match self.kind {
            CommandKind::Text => Ok(rewrite_named_markers(&self.text, marker, &self.parameters)),
            CommandKind::StoredProcedure => {
                stored_procedure_call(&self.text, marker, &self.parameters)
            }
        }
    }

    async fn query(&self) -> Result<RawQueryResult> {
        let (sql, parameters) = self.statement()?;
        let converted: Vec<Box<dyn ToSql + Sync + Send>> =
            parameters.iter().map(|p| sql_value_to_tosql(p)).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let client = &self.client;
        let (columns, rows) = with_timeout(self.timeout, async {
            let statement = client.prepare(&sql).await?;
            let columns = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>();
            let rows = client.query(&statement, &param_refs).await?;
            Ok::<_, tokio_postgres::Error>((columns, rows))
        })
        .await?;

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| column_value(row, i)).collect())
            .collect::<Result<Vec<Vec<SqlValue>>>>()?;
        Ok(RawQueryResult::new(columns, rows))
    }

    async fn execute(&self) -> Result<i64> {
        if self.kind == CommandKind::StoredProcedure {
            return Ok(self.query().await?.len() as i64);
        }
        let (sql, parameters) = self.statement()?;
        let converted: Vec<Box<dyn ToSql + Sync + Send>> =
            parameters.iter().map(|p| sql_value_to_tosql(p)).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let affected =
            with_timeout(self.timeout, self.client.execute(sql.as_str(), &param_refs)).await?;
        Ok(i64::try_from(affected).unwrap_or(i64::MAX))
    }
}

async fn with_timeout<T>(
    timeout: Option<u32>,
    future: impl Future<Output = std::result::Result<T, tokio_postgres::Error>>,
) -> Result<T> {
    let driver_error = |e: tokio_postgres::Error| DbExecError::Driver(Box::new(e));
    match timeout {
        Some(seconds) if seconds > 0 => {
            tokio::time::timeout(Duration::from_secs(u64::from(seconds)), future)
                .await
                .map_err(|_| DbExecError::Timeout(seconds))?
                .map_err(driver_error)
        }
        _ => future.await.map_err(driver_error),
    }
}

#[async_trait]
impl Command for PostgresCommand {
    fn command_text(&self) -> &str {
        &self.text
    }

    fn set_command_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn kind(&self) -> CommandKind {
        self.kind
    }

    fn set_kind(&mut self, kind: CommandKind) {
        self.kind = kind;
    }

    fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    fn set_timeout(&mut self, seconds: u32) {
        self.timeout = Some(seconds);
    }

    fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Vec<ParameterDescriptor> {
        &mut self.parameters
    }

    fn execution_support(&self) -> ExecutionSupport {
        ExecutionSupport::Native
    }

    fn execute_reader(&mut self) -> Result<Box<dyn RowCursor>> {
        let handle = self.handle.clone();
        run_blocking(&handle, self.execute_reader_async())
    }

    fn execute_scalar(&mut self) -> Result<SqlValue> {
        let handle = self.handle.clone();
        run_blocking(&handle, self.execute_scalar_async())
    }

    fn execute_non_query(&mut self) -> Result<i64> {
        let handle = self.handle.clone();
        run_blocking(&handle, self.execute_non_query_async())
    }

    async fn execute_reader_async(&mut self) -> Result<Box<dyn RowCursor>> {
        Ok(Box::new(self.query().await?.into_cursor()))
    }

    async fn execute_scalar_async(&mut self) -> Result<SqlValue> {
        let result = self.query().await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(SqlValue::Null))
    }

    async fn execute_non_query_async(&mut self) -> Result<i64> {
        self.execute().await
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// An unquoted identifier: ASCII letters, digits and underscores, not
/// starting with a digit.
fn is_plain_identifier(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(is_identifier_char)
}

/// Index just past the first `terminator` at or after `from`, or the end.
fn skip_past(chars: &[char], from: usize, terminator: &[char]) -> usize {
    let mut i = from;
    while i + terminator.len() <= chars.len() {
        if chars[i..i + terminator.len()] == *terminator {
            return i + terminator.len();
        }
        i += 1;
    }
    chars.len()
}

/// End of a `$tag$` opener starting at `start`, if there is one.
/// `$1` style positional parameters are not tags.
fn dollar_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while let Some(&c) = chars.get(i) {
        if c == '$' {
            return Some(i + 1);
        }
        if !is_identifier_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

/// Replace `@name` placeholders with positional `$n` parameters.
///
/// Only names bound as input parameters are replaced. String literals,
/// quoted identifiers, dollar-quoted bodies and comments are copied as is.
/// Returns the rewritten SQL and the parameters in positional order.
pub(crate) fn rewrite_named_markers<'p>(
    sql: &str,
    marker: char,
    parameters: &'p [ParameterDescriptor],
) -> (String, Vec<&'p ParameterDescriptor>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut output = String::with_capacity(sql.len());
    let mut ordered: Vec<&ParameterDescriptor> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let verbatim_end = match c {
            '\'' => Some(skip_past(&chars, i + 1, &['\''])),
            '"' => Some(skip_past(&chars, i + 1, &['"'])),
            '-' if next == Some('-') => Some(skip_past(&chars, i + 2, &['\n'])),
            '/' if next == Some('*') => Some(skip_past(&chars, i + 2, &['*', '/'])),
            '$' => dollar_tag_end(&chars, i).map(|tag_end| {
                skip_past(&chars, tag_end, &chars[i..tag_end])
            }),
            _ => None,
        };
        if let Some(end) = verbatim_end {
            output.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if c != marker {
            output.push(c);
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && is_identifier_char(chars[end]) {
            end += 1;
        }
        let ident: String = chars[i + 1..end].iter().collect();
        i = end;

        let name = format!("{}{}", marker, ident);
        let bound = parameters
            .iter()
            .find(|p| p.direction.is_input() && p.name == name);
        match bound {
            Some(parameter) if !ident.is_empty() => {
                let position = match ordered.iter().position(|p| p.name == parameter.name) {
                    Some(index) => index + 1,
                    None => {
                        ordered.push(parameter);
                        ordered.len()
                    }
                };
                output.push('$');
                output.push_str(&position.to_string());
            }
            _ => output.push_str(&name),
        }
    }

    (output, ordered)
}

/// Build the call for a stored procedure using named argument notation.
///
/// The procedure name may be schema-qualified. It and every argument name
/// must be plain identifiers, since both are written into the SQL text.
pub(crate) fn stored_procedure_call<'p>(
    name: &str,
    marker: char,
    parameters: &'p [ParameterDescriptor],
) -> Result<(String, Vec<&'p ParameterDescriptor>)> {
    let name = name.trim();
    if !name.split('.').all(is_plain_identifier) {
        return Err(DbExecError::invalid_argument(
            "command_text",
            format!("{:?} is not a valid procedure name", name),
        ));
    }

    let inputs: Vec<&ParameterDescriptor> =
        parameters.iter().filter(|p| p.direction.is_input()).collect();
    let mut arguments = Vec::with_capacity(inputs.len());
    for (i, parameter) in inputs.iter().enumerate() {
        let argument = parameter
            .name
            .strip_prefix(marker)
            .unwrap_or(&parameter.name);
        if !is_plain_identifier(argument) {
            return Err(DbExecError::invalid_argument(
                "name",
                format!("{:?} is not a valid procedure argument name", parameter.name),
            ));
        }
        arguments.push(format!("{} => ${}", argument, i + 1));
    }
    Ok((format!("SELECT * FROM {}({})", name, arguments.join(", ")), inputs))
}

/// Convert a parameter to a boxed ToSql trait object.
fn sql_value_to_tosql(parameter: &ParameterDescriptor) -> Box<dyn ToSql + Sync + Send> {
    match &parameter.value {
        SqlValue::Null => typed_null(parameter.db_type),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int16(i) => Box::new(*i),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float64(v) => Box::new(*v),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
    }
}

fn typed_null(db_type: Option<DbType>) -> Box<dyn ToSql + Sync + Send> {
    match db_type {
        Some(DbType::Boolean) => Box::new(None::<bool>),
        Some(DbType::Int16) => Box::new(None::<i16>),
        Some(DbType::Int32) => Box::new(None::<i32>),
        Some(DbType::Int64) => Box::new(None::<i64>),
        Some(DbType::Double) => Box::new(None::<f64>),
        Some(DbType::Binary) => Box::new(None::<Vec<u8>>),
        Some(DbType::String) | None => Box::new(None::<String>),
    }
}

/// Convert the value at `index` to a SqlValue based on its column type.
fn column_value(row: &Row, index: usize) -> Result<SqlValue> {
    let ty = row.columns()[index].type_();
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index).map(SqlValue::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index).map(SqlValue::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index).map(SqlValue::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index).map(SqlValue::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map(|v| SqlValue::from(v.map(f64::from)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index).map(SqlValue::from)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(index).map(SqlValue::from)
    } else {
        row.try_get::<_, Option<String>>(index).map(SqlValue::from)
    };
    value.map_err(|e| {
        DbExecError::QueryFailed(format!(
            "Unsupported value in column {} of type {}: {}",
            index, ty, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterDirection;

    fn param(name: &str, value: impl Into<SqlValue>, direction: ParameterDirection) -> ParameterDescriptor {
        ParameterDescriptor {
            name: name.to_string(),
            value: value.into(),
            db_type: None,
            size: None,
            direction,
        }
    }

    #[test]
    fn test_rewrite_named_markers() {
        let params = vec![
            param("@id", 1, ParameterDirection::Input),
            param("@name", "x", ParameterDirection::Input),
        ];
        let (sql, ordered) = rewrite_named_markers(
            "SELECT * FROM users WHERE name = @name AND (id = @id OR parent = @id) AND note <> '@id'",
            '@',
            &params,
        );
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE name = $1 AND (id = $2 OR parent = $2) AND note <> '@id'"
        );
        assert_eq!(ordered[0].name, "@name");
        assert_eq!(ordered[1].name, "@id");
    }

    #[test]
    fn test_unbound_markers_are_left_alone() {
        let params = vec![param("@total", SqlValue::Null, ParameterDirection::Output)];
        let (sql, ordered) = rewrite_named_markers("SELECT @total, @other", '@', &params);
        assert_eq!(sql, "SELECT @total, @other");
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_stored_procedure_call_skips_outputs() {
        let params = vec![
            param("@customer", 4, ParameterDirection::Input),
            param("@total", SqlValue::Null, ParameterDirection::Output),
            param("@limit", 10, ParameterDirection::InputOutput),
        ];
        let (sql, ordered) = stored_procedure_call("orders_for", '@', &params).unwrap();
        assert_eq!(sql, "SELECT * FROM orders_for(customer => $1, limit => $2)");
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn test_stored_procedure_call_accepts_schema() {
        let params = vec![param("@id", 1, ParameterDirection::Input)];
        let (sql, _) = stored_procedure_call(" sales.orders_for ", '@', &params).unwrap();
        assert_eq!(sql, "SELECT * FROM sales.orders_for(id => $1)");
    }

    #[test]
    fn test_stored_procedure_call_rejects_non_identifiers() {
        let params = vec![param(
            "@x => 1); DROP TABLE users; --",
            1,
            ParameterDirection::Input,
        )];
        assert!(matches!(
            stored_procedure_call("f", '@', &params),
            Err(DbExecError::InvalidArgument { argument: "name", .. })
        ));

        let params = vec![param("@1st", 1, ParameterDirection::Input)];
        assert!(stored_procedure_call("f", '@', &params).is_err());

        assert!(matches!(
            stored_procedure_call("f(); DROP TABLE users; --", '@', &[]),
            Err(DbExecError::InvalidArgument {
                argument: "command_text",
                ..
            })
        ));
        assert!(stored_procedure_call("sales.", '@', &[]).is_err());
    }

    #[test]
    fn test_markers_in_comments_and_quoted_text_are_kept() {
        let params = vec![param("@id", 1, ParameterDirection::Input)];
        let (sql, ordered) = rewrite_named_markers(
            "SELECT \"@id\", $$ @id $$, $fn$ body @id $fn$ -- uses @id\n\
             FROM t /* @id */ WHERE id = @id AND note = 'it''s @id'",
            '@',
            &params,
        );
        assert_eq!(
            sql,
            "SELECT \"@id\", $$ @id $$, $fn$ body @id $fn$ -- uses @id\n\
             FROM t /* @id */ WHERE id = $1 AND note = 'it''s @id'"
        );
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn test_invalid_connection_string() {
        assert!(matches!(
            parse_config("port=not-a-number"),
            Err(DbExecError::ConnectionFailed(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_connection_starts_closed() {
        let connection = PostgresConnection::new("host=localhost user=postgres").unwrap();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(matches!(
            connection.create_command(),
            Err(DbExecError::ConnectionFailed(_))
        ));
    }
}
