mod connection;
mod database;
mod errors;
mod transaction;

pub use database::Database;
pub use errors::DatabaseError;
pub use transaction::Transaction;
