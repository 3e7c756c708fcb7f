//! The claim coordinator: the only mutual-exclusion mechanism between workers.
//!
//! A claim selects one job in a given status, row-locks it with `FOR UPDATE SKIP LOCKED`,
//! moves it to the next status and commits. The lock lives only for that short transaction;
//! afterwards the job is "checked out" purely by its new status.

use data_model_jobs::{
    db::DbPool,
    lifecycle::Stage,
    models::{JobKey, JobStatus, Stub},
    schema::job_stubs,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Error;
use crate::queries::set_status;
use crate::unit_of_work::run_in_transaction;

/// A job this caller now owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub key: JobKey,
    /// The status the claim moved the job to.
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    Claimed(ClaimedJob),
    /// No unlocked job is in the requested status. Nothing was changed.
    NotFound,
}

impl ClaimOutcome {
    pub fn claimed(self) -> Option<ClaimedJob> {
        match self {
            ClaimOutcome::Claimed(job) => Some(job),
            ClaimOutcome::NotFound => None,
        }
    }
}

/// Atomically takes one job in `current_status` and moves it to `next_status`.
///
/// Concurrent callers never receive the same job: rows locked by another in-flight claim are
/// skipped rather than waited on. Among eligible jobs the oldest discovery wins (ties broken by id),
/// so a steady stream of new postings cannot starve old ones.
pub async fn claim_next(pool: &DbPool, current_status: JobStatus, next_status: JobStatus) -> Result<ClaimOutcome, Error> {
    let claimed = run_in_transaction(pool, "claim_next", move |conn| {
        async move {
            let candidate = job_stubs::table
                .filter(job_stubs::status.eq(current_status))
                .select(Stub::as_select())
                .order((job_stubs::found_at.asc(), job_stubs::id.asc()))
                .for_update()
                .skip_locked()
                .first::<Stub>(conn)
                .await
                .optional()?;

            let Some(stub) = candidate else {
                return Ok(None);
            };

            // the row stays locked until commit, so no other claimer can see it in `current_status`
            set_status(conn, stub.id, next_status).await?;

            Ok(Some(ClaimedJob {
                id: stub.id,
                key: stub.key(),
                status: next_status,
            }))
        }
        .scope_boxed()
    })
    .await?;

    match claimed {
        Some(job) => {
            tracing::info!("[Claimed] Job {} ({} -> {})", job.key, current_status, next_status);
            Ok(ClaimOutcome::Claimed(job))
        }
        None => {
            tracing::debug!("[Do not exist] No unclaimed job in status {}", current_status);
            Ok(ClaimOutcome::NotFound)
        }
    }
}

/// Claims the next job that is ready for `stage`, moving it to the stage's in-progress status.
pub async fn claim_stage(pool: &DbPool, stage: Stage) -> Result<ClaimOutcome, Error> {
    claim_next(pool, stage.ready_status(), stage.in_progress_status()).await
}
