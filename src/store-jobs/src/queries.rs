// Statements shared by several operations. Each runs on a connection that is already inside a
// transaction opened by `run_in_transaction`.

use data_model_jobs::models::{JobKey, JobStatus};
use data_model_jobs::schema::job_stubs;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

/// Id of the stub with natural key `key`, if any.
pub(crate) async fn find_stub_id(conn: &mut AsyncPgConnection, key: JobKey) -> QueryResult<Option<Uuid>> {
    job_stubs::table
        .filter(job_stubs::source.eq(key.source))
        .filter(job_stubs::external_id.eq(key.external_id))
        .select(job_stubs::id)
        .first::<Uuid>(conn)
        .await
        .optional()
}

pub(crate) async fn set_status(conn: &mut AsyncPgConnection, stub_id: Uuid, status: JobStatus) -> QueryResult<()> {
    diesel::update(job_stubs::table.find(stub_id))
        .set(job_stubs::status.eq(status))
        .execute(conn)
        .await?;
    Ok(())
}
