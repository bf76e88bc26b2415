use crate::db::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entity already exists")]
    AlreadyExists,

    #[error("entity not found")]
    NotFound,

    #[error("entity was updated concurrently")]
    UpdatedConcurrently,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
