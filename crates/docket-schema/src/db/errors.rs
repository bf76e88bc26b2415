use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to migrate database to version {version}")]
    Migration {
        version: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("no rows returned")]
    NoRows,

    #[error("failed to decode column `{column}`: {reason}")]
    Decode { column: &'static str, reason: String },
}
