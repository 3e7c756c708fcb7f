use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::deadpool::Pool;

pub type PoolError = deadpool::managed::PoolError<diesel_async::pooled_connection::PoolError>;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionPoolError {
    #[error("Failed to build connection pool: {0}")]
    BuildError(#[from] deadpool::managed::BuildError),
    #[error("Failed to establish initial database connection: {0}")]
    ConnectionError(#[from] PoolError),
}

/// Builds a pool with deadpool's default size (4 x CPU count).
pub async fn establish_connection_pool(database_url: &str) -> Result<DbPool, ConnectionPoolError> {
    establish_sized_connection_pool(database_url, None).await
}

/// Builds a pool capped at `max_size` connections, or deadpool's default when `None`.
///
/// Each claim and mutation holds one pooled connection for the length of its transaction,
/// so `max_size` bounds how many store operations a single process runs at once.
pub async fn establish_sized_connection_pool(
    database_url: &str,
    max_size: Option<usize>,
) -> Result<DbPool, ConnectionPoolError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let builder = Pool::builder(config);
    let builder = match max_size {
        Some(n) => builder.max_size(n),
        None => builder,
    };
    let pool = builder.build()?;

    // Fail fast if the database is unreachable.
    let _conn = pool.get().await?;

    Ok(pool)
}
