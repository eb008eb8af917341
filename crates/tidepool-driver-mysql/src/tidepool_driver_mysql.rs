//! MySQL/MariaDB driver implementation

mod connection;
mod connector;
mod convert;

pub use connection::MySqlConnection;
pub use connector::MySqlConnector;
