/// SQLite persistence for reference collections, synthetic flows and
/// committed inventory databases.
mod connection;
mod queries;

pub use connection::Database;
pub use queries::{CommitRequest, DatabaseKind};
