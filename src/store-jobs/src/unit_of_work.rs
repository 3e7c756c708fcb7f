//! Every store operation runs through [`run_in_transaction`]: one pooled connection, one
//! transaction, commit on `Ok`, rollback on `Err`. Diesel and pool errors are classified here
//! and nowhere else.

use data_model_jobs::db::DbPool;
use diesel_async::scoped_futures::ScopedBoxFuture;
use diesel_async::{AsyncConnection, AsyncPgConnection};

use crate::errors::{Error, ErrorKind};

/// Runs `work` inside a single transaction on a connection taken from `pool`.
///
/// `operation` names the caller in logs. A failure to get a connection or any error returned by
/// `work` rolls the transaction back and comes out as a classified [`Error`].
pub async fn run_in_transaction<'a, T, F>(pool: &DbPool, operation: &'static str, work: F) -> Result<T, Error>
where
    F: for<'r> FnOnce(&'r mut AsyncPgConnection) -> ScopedBoxFuture<'a, 'r, Result<T, diesel::result::Error>>
        + Send
        + 'a,
    T: Send + 'a,
{
    let mut conn = match pool.get().await {
        Ok(conn) => conn,
        Err(error) => return Err(report(operation, Error::from(error))),
    };

    tracing::trace!("[{}] Beginning transaction", operation);
    match (*conn).transaction::<T, diesel::result::Error, _>(work).await {
        Ok(value) => {
            tracing::trace!("[{}] Committed", operation);
            Ok(value)
        }
        Err(error) => Err(report(operation, Error::from(error))),
    }
}

fn report(operation: &'static str, error: Error) -> Error {
    match error.kind() {
        ErrorKind::Integrity => tracing::error!("[IntegrityError] {}: {}", operation, error),
        ErrorKind::Transient => tracing::warn!("[TransientError] {}: {} (rolled back, retryable)", operation, error),
        ErrorKind::Unexpected => tracing::error!("[UnexpectedError] {}: {:?}", operation, error),
    }
    error
}
