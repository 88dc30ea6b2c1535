pub mod catalog;
pub mod password;
pub mod postgres_client;
pub mod secret;
pub mod sql;

pub use postgres_client::{PostgresClientError, PostgresSession, apply_statements};
pub use secret::{BasicAuthCredentials, SecretError};
pub use sql::Statement;
