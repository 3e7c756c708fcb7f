use std::env::VarError;
use std::num::ParseIntError;

use data_model_jobs::db::{ConnectionPoolError, DbPool, establish_sized_connection_pool};

/// Env var holding the PostgreSQL connection string.
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Optional env var capping the number of pooled connections.
pub const DB_POOL_MAX_SIZE: &str = "DB_POOL_MAX_SIZE";

#[derive(Debug)]
pub enum DbEnvError {
    MissingDatabaseUrl(VarError),
    InvalidPoolSize(String),
    Connection(ConnectionPoolError),
}

impl std::error::Error for DbEnvError {}

impl std::fmt::Display for DbEnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDatabaseUrl(e) => write!(f, "{} must be set in .env file or present as an env var: {}", DATABASE_URL, e),
            Self::InvalidPoolSize(msg) => write!(f, "{} must be a positive integer: {}", DB_POOL_MAX_SIZE, msg),
            Self::Connection(e) => write!(f, "Couldn't connect to the database: {}", e),
        }
    }
}

impl From<ConnectionPoolError> for DbEnvError {
    fn from(error: ConnectionPoolError) -> Self {
        Self::Connection(error)
    }
}

impl From<ParseIntError> for DbEnvError {
    fn from(error: ParseIntError) -> Self {
        Self::InvalidPoolSize(error.to_string())
    }
}

/// Retrieves the value for the env var DATABASE_URL.
pub fn get_database_url() -> Result<String, DbEnvError> {
    std::env::var(DATABASE_URL).map_err(DbEnvError::MissingDatabaseUrl)
}

/// Reads DB_POOL_MAX_SIZE. `Ok(None)` when unset, so the pool keeps its default size.
pub fn get_pool_max_size() -> Result<Option<usize>, DbEnvError> {
    match std::env::var(DB_POOL_MAX_SIZE) {
        Ok(v) => parse_pool_size(&v).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_pool_size(value: &str) -> Result<usize, DbEnvError> {
    let size = value.trim().parse::<usize>()?;
    if size == 0 {
        return Err(DbEnvError::InvalidPoolSize("got 0".to_string()));
    }
    Ok(size)
}

/// Uses DATABASE_URL and DB_POOL_MAX_SIZE to establish a database connection pool.
pub async fn get_db_pool() -> Result<DbPool, DbEnvError> {
    let database_url = get_database_url()?;
    let max_size = get_pool_max_size()?;
    let pool = establish_sized_connection_pool(&database_url, max_size).await?;
    tracing::debug!("Connected to database (pool max size: {:?})", max_size);
    Ok(pool)
}
