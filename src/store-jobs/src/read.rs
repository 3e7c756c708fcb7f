//! Point lookups used by producers once they hold a claimed job.

use data_model_jobs::{
    db::DbPool,
    models::{Details, FormField, JobKey, JobStatus, Stub},
    schema::{job_details, job_form_fields, job_stubs},
};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use crate::errors::Error;
use crate::unit_of_work::run_in_transaction;

/// Details of the job with id `id`, if they have been captured.
pub async fn get_details(pool: &DbPool, id: Uuid) -> Result<Option<Details>, Error> {
    run_in_transaction(pool, "get_details", move |conn| {
        async move {
            job_details::table
                .find(id)
                .select(Details::as_select())
                .first(conn)
                .await
                .optional()
        }
        .scope_boxed()
    })
    .await
}

/// All form fields of job `job_id` in capture order. Empty if none were captured or the job is unknown.
pub async fn get_form_fields(pool: &DbPool, job_id: Uuid) -> Result<Vec<FormField>, Error> {
    run_in_transaction(pool, "get_form_fields", move |conn| {
        async move {
            job_form_fields::table
                .filter(job_form_fields::job_id.eq(job_id))
                .order((job_form_fields::position.asc(), job_form_fields::id.asc()))
                .select(FormField::as_select())
                .load(conn)
                .await
        }
        .scope_boxed()
    })
    .await
}

pub async fn get_stub(pool: &DbPool, key: JobKey) -> Result<Option<Stub>, Error> {
    run_in_transaction(pool, "get_stub", move |conn| {
        async move {
            job_stubs::table
                .filter(job_stubs::source.eq(key.source))
                .filter(job_stubs::external_id.eq(key.external_id))
                .select(Stub::as_select())
                .first(conn)
                .await
                .optional()
        }
        .scope_boxed()
    })
    .await
}

/// Number of jobs per status, in lifecycle order. Statuses without jobs are omitted.
pub async fn count_by_status(pool: &DbPool) -> Result<Vec<(JobStatus, i64)>, Error> {
    run_in_transaction(pool, "count_by_status", move |conn| {
        async move {
            job_stubs::table
                .group_by(job_stubs::status)
                .select((job_stubs::status, count_star()))
                .order(job_stubs::status.asc())
                .load::<(JobStatus, i64)>(conn)
                .await
        }
        .scope_boxed()
    })
    .await
}
