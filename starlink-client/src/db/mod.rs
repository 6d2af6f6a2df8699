pub mod usage_queries;

pub use usage_queries::{
    delete_usage, fetch_usage, insert_usage, list_usage, update_usage, upsert_usage_batch,
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("usage record {0} not found")]
    NotFound(i32),
    #[error("usage for this unit is already logged on that date")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(e),
        }
    }
}
