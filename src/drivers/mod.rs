mod tokio_postgres;

pub use self::in_memory_test::{
    ExecuteMethod, InMemoryConnection, InMemoryResponse, InMemoryTestResponseBuilder,
    RecordedCommand,
};
pub use self::tokio_postgres::PostgresConnection;
