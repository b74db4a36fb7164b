use dbexec::drivers::{
    ExecuteMethod, InMemoryConnection, InMemoryResponse, InMemoryTestResponseBuilder,
};
use dbexec::engine::{ConnectionExt, ExecutionRequest};
use dbexec::error::DbExecError;
use dbexec::traits::{Connection, ConnectionState, DataRecord, RowCursor};
use dbexec::types::{CommandKind, CommandSpec, ParameterMap, RawQueryResult, SqlValue};
use dbexec::RecordExt;

struct NewUser {
    name: String,
    age: i32,
}

dbexec::record!(NewUser { name, age });

dbexec::sql_enum! {
    enum Role {
        Guest = 0,
        Admin = 1,
    }
}

fn three_users() -> RawQueryResult {
    InMemoryTestResponseBuilder::new()
        .columns(&["id", "name", "role"])
        .row(vec![SqlValue::Int32(1), SqlValue::from("Alice"), SqlValue::Int32(1)])
        .row(vec![SqlValue::Int32(2), SqlValue::from("Bob"), SqlValue::Null])
        .row(vec![SqlValue::Int32(3), SqlValue::from("Carol"), SqlValue::Int32(0)])
        .build()
}

fn row_values(row: &dyn DataRecord) -> dbexec::Result<Vec<SqlValue>> {
    (0..row.field_count()).map(|i| row.value_at(i)).collect()
}

#[tokio::test]
async fn test_mapped_reader_preserves_order_and_releases_once() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let rows = ExecutionRequest::new(Some(&connection), CommandSpec::stored_procedure("list_users"))
        .dispose_connection_after(true)
        .execute_reader_mapped(row_values)
        .await
        .unwrap();

    assert_eq!(rows, three_users().rows);
    assert_eq!(connection.open_count(), 1);
    assert_eq!(connection.commands_created(), 1);
    assert_eq!(connection.commands_released(), 1);
    assert_eq!(connection.cursors_released(), 1);
    assert_eq!(connection.close_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_mapped_reader_with_typed_values() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let users = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .execute_reader_mapped(|row| {
            Ok((
                row.value::<i64>("id")?,
                row.value::<String>(1)?,
                row.value::<Role>("role")?,
            ))
        })
        .await
        .unwrap();

    assert_eq!(
        users,
        vec![
            (1, "Alice".to_string(), Role::Admin),
            (2, "Bob".to_string(), Role::Guest),
            (3, "Carol".to_string(), Role::Guest),
        ]
    );
}

#[tokio::test]
async fn test_mapped_reader_over_no_rows_returns_empty() {
    let connection = InMemoryConnection::new().with_rows(
        InMemoryTestResponseBuilder::new().columns(&["id"]).build(),
    );

    let rows = connection
        .execute(CommandSpec::text("SELECT id FROM users WHERE 1 = 0"))
        .execute_reader_mapped(row_values)
        .await
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(connection.cursors_released(), 1);
}

#[tokio::test]
async fn test_missing_connection_is_rejected() {
    let spec = CommandSpec::stored_procedure("anything");

    let err = ExecutionRequest::new(None, spec.clone())
        .execute_non_query()
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let err = ExecutionRequest::new(None, spec.clone())
        .execute_scalar()
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let err = ExecutionRequest::new(None, spec)
        .execute_reader_mapped(row_values)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test]
async fn test_blank_command_text_fails_before_any_io() {
    let connection = InMemoryConnection::new();

    let err = connection
        .execute(CommandSpec::text("   "))
        .dispose_connection_after(true)
        .execute_non_query()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DbExecError::InvalidArgument {
            argument: "command_text",
            ..
        }
    ));
    assert_eq!(connection.open_count(), 0);
    assert_eq!(connection.commands_created(), 0);
    connection.assert_command_count(0);
}

#[tokio::test]
async fn test_failure_still_closes_owned_connection() {
    let connection = InMemoryConnection::new().with_failure("deadlock victim");

    let err = connection
        .execute(CommandSpec::stored_procedure("transfer"))
        .dispose_connection_after(true)
        .execute_non_query()
        .await
        .unwrap_err();

    match err {
        DbExecError::QueryFailed(message) => assert_eq!(message, "deadlock victim"),
        other => panic!("Expected QueryFailed, got {:?}", other),
    }
    assert_eq!(connection.commands_released(), 1);
    assert_eq!(connection.close_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_open_failure_closes_owned_connection() {
    let connection = InMemoryConnection::new().failing_open("host unreachable");

    let err = connection
        .execute(CommandSpec::stored_procedure("ping"))
        .dispose_connection_after(true)
        .execute_scalar()
        .await
        .unwrap_err();

    assert!(matches!(err, DbExecError::ConnectionFailed(_)));
    assert_eq!(connection.commands_created(), 0);
    assert_eq!(connection.close_count(), 1);
}

#[tokio::test]
async fn test_convert_failure_releases_everything() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let err = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .dispose_connection_after(true)
        .execute_reader_mapped(|row| row.value::<bool>("name"))
        .await
        .unwrap_err();

    assert!(matches!(err, DbExecError::Conversion { column: 1, .. }));
    assert_eq!(connection.cursors_released(), 1);
    assert_eq!(connection.commands_released(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_borrowed_connection_is_left_open() {
    let connection = InMemoryConnection::new().with_affected(4);

    let affected = connection
        .execute(CommandSpec::text("DELETE FROM sessions"))
        .execute_non_query()
        .await
        .unwrap();

    assert_eq!(affected, 4);
    assert_eq!(connection.open_count(), 1);
    assert_eq!(connection.close_count(), 0);
    assert_eq!(connection.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_open_connection_is_not_reopened() {
    let connection = InMemoryConnection::new().opened();

    connection
        .execute(CommandSpec::stored_procedure("noop"))
        .execute_non_query()
        .await
        .unwrap();

    assert_eq!(connection.open_count(), 0);
    assert_eq!(connection.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_scalar_returns_first_cell_or_null() {
    let connection = InMemoryConnection::new().with_responses([
        InMemoryResponse::Rows(three_users()),
        InMemoryResponse::Rows(RawQueryResult::empty()),
    ]);

    let first = connection
        .execute(CommandSpec::text("SELECT id FROM users"))
        .execute_scalar()
        .await
        .unwrap();
    let none = connection
        .execute(CommandSpec::text("SELECT id FROM users WHERE 1 = 0"))
        .execute_scalar()
        .await
        .unwrap();

    assert_eq!(first, SqlValue::Int32(1));
    assert_eq!(none, SqlValue::Null);
    assert_eq!(connection.commands_released(), 2);
}

#[tokio::test]
async fn test_command_is_built_from_command_spec() {
    let connection = InMemoryConnection::new().with_affected(1);

    connection
        .execute(
            CommandSpec::stored_procedure("rename_user")
                .parameters(ParameterMap::new().with("id", 7).with("@name", "Dora"))
                .timeout(45),
        )
        .execute_non_query()
        .await
        .unwrap();

    connection.assert_last_command(
        "rename_user",
        &[("@id", SqlValue::Int32(7)), ("@name", SqlValue::from("Dora"))],
    );
    let last = connection.last_command().unwrap();
    assert_eq!(last.kind, CommandKind::StoredProcedure);
    assert_eq!(last.timeout, Some(45));
    assert_eq!(last.method, ExecuteMethod::NonQuery);
}

#[tokio::test]
async fn test_record_parameters() {
    let connection = InMemoryConnection::new().with_affected(1);
    let user = NewUser {
        name: "Eve".to_string(),
        age: 31,
    };

    connection
        .execute(CommandSpec::stored_procedure("add_user").record(&user))
        .execute_non_query()
        .await
        .unwrap();

    let mut parameters: Vec<(String, SqlValue)> = connection
        .last_command()
        .unwrap()
        .parameters
        .into_iter()
        .map(|p| (p.name, p.value))
        .collect();
    parameters.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        parameters,
        vec![
            ("@age".to_string(), SqlValue::Int32(31)),
            ("@name".to_string(), SqlValue::from("Eve")),
        ]
    );
}

#[tokio::test]
async fn test_owned_reader_closes_connection_when_dropped() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let mut reader = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .dispose_connection_after(true)
        .execute_reader()
        .await
        .unwrap();

    assert!(reader.owns_connection());
    assert_eq!(connection.commands_released(), 1);
    assert_eq!(connection.state(), ConnectionState::Open);

    let mut names = Vec::new();
    while reader.advance_async().await.unwrap() {
        names.push(reader.value::<String>("name").unwrap());
    }
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
    assert_eq!(connection.state(), ConnectionState::Open);

    drop(reader);
    assert_eq!(connection.cursors_released(), 1);
    assert_eq!(connection.close_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_borrowed_reader_leaves_connection_open() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let reader = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .execute_reader()
        .await
        .unwrap();

    assert!(!reader.owns_connection());
    reader.close().unwrap();
    assert_eq!(connection.cursors_released(), 1);
    assert_eq!(connection.close_count(), 0);
    assert_eq!(connection.state(), ConnectionState::Open);
}

#[test]
fn test_blocking_mode_matches_non_blocking() {
    let connection = InMemoryConnection::new().with_responses([
        InMemoryResponse::Rows(three_users()),
        InMemoryResponse::Rows(three_users()),
        InMemoryResponse::Affected(9),
    ]);

    let ids = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .blocking()
        .execute_reader_mapped(|row| row.value::<i32>(0))
        .unwrap();
    assert_eq!(ids, vec![1, 2, 3]);

    let scalar = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .blocking()
        .execute_scalar()
        .unwrap();
    assert_eq!(scalar, SqlValue::Int32(1));

    let affected = connection
        .execute(CommandSpec::stored_procedure("purge"))
        .dispose_connection_after(true)
        .blocking()
        .execute_non_query()
        .unwrap();
    assert_eq!(affected, 9);

    assert_eq!(connection.open_count(), 1);
    assert_eq!(connection.commands_released(), 3);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn test_blocking_reader_with_ownership() {
    let connection = InMemoryConnection::new().with_rows(three_users());

    let mut reader = connection
        .execute(CommandSpec::stored_procedure("list_users"))
        .dispose_connection_after(true)
        .blocking()
        .execute_reader()
        .unwrap();

    assert!(reader.advance().unwrap());
    assert_eq!(reader.value::<i32>("id").unwrap(), 1);
    reader.close().unwrap();
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn test_blocking_failure_still_closes_owned_connection() {
    let connection = InMemoryConnection::new().with_failure("boom");

    let err = connection
        .execute(CommandSpec::stored_procedure("transfer"))
        .dispose_connection_after(true)
        .blocking()
        .execute_reader_mapped(row_values)
        .unwrap_err();

    assert!(matches!(err, DbExecError::QueryFailed(ref message) if message == "boom"));
    assert_eq!(connection.commands_released(), 1);
    assert_eq!(connection.close_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}
