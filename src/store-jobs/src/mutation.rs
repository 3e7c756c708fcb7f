//! Writes against the job state store. Each operation is one transaction; "no such job" and
//! "already known" are ordinary outcomes, not errors.

use std::collections::HashSet;

use chrono::Utc;
use data_model_jobs::{
    db::DbPool,
    models::{Details, DetailsPayload, FieldAnswer, FormField, JobKey, JobStatus, NewFormField, Stub},
    schema::{job_details, job_form_fields, job_stubs},
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Error;
use crate::queries::{find_stub_id, set_status};
use crate::unit_of_work::run_in_transaction;

/// Result of [`create_stub`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateStubOutcome {
    Created { id: Uuid, key: JobKey },
    /// The natural key was already stored; nothing changed.
    Duplicate { key: JobKey },
}

/// Result of the single-job updates: [`upsert_details`], [`update_status`], [`mark_fields_sent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    Updated { id: Uuid, key: JobKey },
    NotFound { key: JobKey },
}

/// Result of [`replace_form_fields`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceFieldsOutcome {
    /// `count` fields now make up the job's field set.
    Created { id: Uuid, key: JobKey, count: usize },
    NotFound { key: JobKey },
}

/// Result of [`record_answers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordAnswersOutcome {
    Recorded { id: Uuid, key: JobKey, count: usize },
    NotFound { key: JobKey },
    /// `field_id` is not one of the job's fields; no answer was written.
    UnknownField { key: JobKey, field_id: Uuid },
}

/// Result of [`delete_stub`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted { id: Uuid, key: JobKey },
    NotFound { key: JobKey },
}

/// Records a newly discovered job in `IdSaved`.
/// Re-discovering a known job is expected and returns `Duplicate` without touching the stored row.
pub async fn create_stub(pool: &DbPool, key: JobKey) -> Result<CreateStubOutcome, Error> {
    let stub = Stub::discovered(key);

    let inserted = run_in_transaction(pool, "create_stub", move |conn| {
        async move {
            // ON CONFLICT DO NOTHING returns no row for a duplicate, even under concurrent discovery
            diesel::insert_into(job_stubs::table)
                .values(&stub)
                .on_conflict((job_stubs::source, job_stubs::external_id))
                .do_nothing()
                .returning(job_stubs::id)
                .get_result::<Uuid>(conn)
                .await
                .optional()
        }
        .scope_boxed()
    })
    .await?;

    match inserted {
        Some(id) => {
            tracing::info!("[Saved] Job {} inserted successfully.", key);
            Ok(CreateStubOutcome::Created { id, key })
        }
        None => {
            tracing::warn!("[Duplicate] Job {} already exists, skipping insert.", key);
            Ok(CreateStubOutcome::Duplicate { key })
        }
    }
}

/// Inserts or overwrites the job's details, stamps `scraped_at` and moves the job to `DetailsScraped`.
pub async fn upsert_details(pool: &DbPool, key: JobKey, payload: DetailsPayload) -> Result<UpdateOutcome, Error> {
    let outcome = run_in_transaction(pool, "upsert_details", move |conn| {
        async move {
            let Some(stub_id) = find_stub_id(conn, key).await? else {
                return Ok(UpdateOutcome::NotFound { key });
            };

            let details = Details::from_payload(stub_id, payload, Utc::now());
            diesel::insert_into(job_details::table)
                .values(&details)
                .on_conflict(job_details::id)
                .do_update()
                .set(&details)
                .execute(conn)
                .await?;

            set_status(conn, stub_id, JobStatus::DetailsScraped).await?;

            Ok(UpdateOutcome::Updated { id: stub_id, key })
        }
        .scope_boxed()
    })
    .await?;

    match &outcome {
        UpdateOutcome::Updated { .. } => tracing::info!("[Saved] Job {} details updated successfully.", key),
        UpdateOutcome::NotFound { .. } => tracing::warn!("[Do not exist] Job {} does not exist", key),
    }
    Ok(outcome)
}

/// Replaces the job's whole field set with `fields` (possibly empty) and moves the job to
/// `FormFieldsScraped`. Fields keep the order of `fields` and share one `scraped_at`.
///
/// Two concurrent calls for the same job are not serialized against each other: callers must own
/// the job (have claimed it for field capture) before calling.
pub async fn replace_form_fields(
    pool: &DbPool,
    key: JobKey,
    fields: Vec<NewFormField>,
) -> Result<ReplaceFieldsOutcome, Error> {
    let outcome = run_in_transaction(pool, "replace_form_fields", move |conn| {
        async move {
            let Some(stub_id) = find_stub_id(conn, key).await? else {
                return Ok(ReplaceFieldsOutcome::NotFound { key });
            };

            let removed = diesel::delete(job_form_fields::table.filter(job_form_fields::job_id.eq(stub_id)))
                .execute(conn)
                .await?;
            tracing::debug!("[job: {}] Removed {} previously captured fields", key, removed);

            let scraped_at = Utc::now();
            let rows = fields
                .into_iter()
                .enumerate()
                .map(|(index, field)| Ok(FormField::from_new(stub_id, field_position(index)?, field, scraped_at)))
                .collect::<QueryResult<Vec<FormField>>>()?;

            let count = if rows.is_empty() {
                0
            } else {
                diesel::insert_into(job_form_fields::table)
                    .values(&rows)
                    .execute(conn)
                    .await?
            };

            set_status(conn, stub_id, JobStatus::FormFieldsScraped).await?;

            Ok(ReplaceFieldsOutcome::Created {
                id: stub_id,
                key,
                count,
            })
        }
        .scope_boxed()
    })
    .await?;

    match &outcome {
        ReplaceFieldsOutcome::Created { count, .. } => {
            tracing::info!("[Saved] Job {} form fields replaced ({} fields).", key, count)
        }
        ReplaceFieldsOutcome::NotFound { .. } => tracing::warn!("[Do not exist] Job {} does not exist", key),
    }
    Ok(outcome)
}

/// Sets the job's status regardless of its current status.
/// Used for failure and escalation transitions, and for manual recovery.
pub async fn update_status(pool: &DbPool, key: JobKey, new_status: JobStatus) -> Result<UpdateOutcome, Error> {
    let updated = run_in_transaction(pool, "update_status", move |conn| {
        async move {
            diesel::update(
                job_stubs::table
                    .filter(job_stubs::source.eq(key.source))
                    .filter(job_stubs::external_id.eq(key.external_id)),
            )
            .set(job_stubs::status.eq(new_status))
            .returning(job_stubs::id)
            .get_result::<Uuid>(conn)
            .await
            .optional()
        }
        .scope_boxed()
    })
    .await?;

    match updated {
        Some(id) => {
            tracing::info!("[Status] Job {} -> {}", key, new_status);
            Ok(UpdateOutcome::Updated { id, key })
        }
        None => {
            tracing::warn!("[Do not exist] Job {} does not exist, cannot set {}", key, new_status);
            Ok(UpdateOutcome::NotFound { key })
        }
    }
}

/// Writes generated answers onto the job's stored fields and moves the job to `AnswersGenerated`.
/// Every `field_id` must belong to the job; otherwise nothing is written.
pub async fn record_answers(
    pool: &DbPool,
    key: JobKey,
    answers: Vec<FieldAnswer>,
) -> Result<RecordAnswersOutcome, Error> {
    let outcome = run_in_transaction(pool, "record_answers", move |conn| {
        async move {
            let Some(stub_id) = find_stub_id(conn, key).await? else {
                return Ok(RecordAnswersOutcome::NotFound { key });
            };

            let field_ids: HashSet<Uuid> = job_form_fields::table
                .filter(job_form_fields::job_id.eq(stub_id))
                .select(job_form_fields::id)
                .load::<Uuid>(conn)
                .await?
                .into_iter()
                .collect();
            if let Some(unknown) = answers.iter().find(|a| !field_ids.contains(&a.field_id)) {
                return Ok(RecordAnswersOutcome::UnknownField {
                    key,
                    field_id: unknown.field_id,
                });
            }

            for field_answer in &answers {
                diesel::update(job_form_fields::table.find(field_answer.field_id))
                    .set(job_form_fields::answer.eq(&field_answer.answer))
                    .execute(conn)
                    .await?;
            }

            set_status(conn, stub_id, JobStatus::AnswersGenerated).await?;

            Ok(RecordAnswersOutcome::Recorded {
                id: stub_id,
                key,
                count: answers.len(),
            })
        }
        .scope_boxed()
    })
    .await?;

    match &outcome {
        RecordAnswersOutcome::Recorded { count, .. } => {
            tracing::info!("[Saved] Job {} answers recorded ({} fields).", key, count)
        }
        RecordAnswersOutcome::NotFound { .. } => tracing::warn!("[Do not exist] Job {} does not exist", key),
        RecordAnswersOutcome::UnknownField { field_id, .. } => {
            tracing::warn!("[Unknown field] Job {} has no form field {}", key, field_id)
        }
    }
    Ok(outcome)
}

/// Stamps `sent_at` on every not-yet-sent field of the job and moves the job to `Applied`.
pub async fn mark_fields_sent(pool: &DbPool, key: JobKey) -> Result<UpdateOutcome, Error> {
    let outcome = run_in_transaction(pool, "mark_fields_sent", move |conn| {
        async move {
            let Some(stub_id) = find_stub_id(conn, key).await? else {
                return Ok(UpdateOutcome::NotFound { key });
            };

            let sent = diesel::update(
                job_form_fields::table
                    .filter(job_form_fields::job_id.eq(stub_id))
                    .filter(job_form_fields::sent_at.is_null()),
            )
            .set(job_form_fields::sent_at.eq(Utc::now()))
            .execute(conn)
            .await?;
            tracing::debug!("[job: {}] Marked {} fields as sent", key, sent);

            set_status(conn, stub_id, JobStatus::Applied).await?;

            Ok(UpdateOutcome::Updated { id: stub_id, key })
        }
        .scope_boxed()
    })
    .await?;

    match &outcome {
        UpdateOutcome::Updated { .. } => tracing::info!("[Applied] Job {} submitted.", key),
        UpdateOutcome::NotFound { .. } => tracing::warn!("[Do not exist] Job {} does not exist", key),
    }
    Ok(outcome)
}

/// Deletes the job together with its details and form fields.
pub async fn delete_stub(pool: &DbPool, key: JobKey) -> Result<DeleteOutcome, Error> {
    let deleted = run_in_transaction(pool, "delete_stub", move |conn| {
        async move {
            diesel::delete(
                job_stubs::table
                    .filter(job_stubs::source.eq(key.source))
                    .filter(job_stubs::external_id.eq(key.external_id)),
            )
            .returning(job_stubs::id)
            .get_result::<Uuid>(conn)
            .await
            .optional()
        }
        .scope_boxed()
    })
    .await?;

    match deleted {
        Some(id) => {
            tracing::info!("[Deleted] Job {} and its details and form fields.", key);
            Ok(DeleteOutcome::Deleted { id, key })
        }
        None => Ok(DeleteOutcome::NotFound { key }),
    }
}

/// Converts a field's index in the scraped form into its stored `position`.
fn field_position(index: usize) -> QueryResult<i32> {
    i32::try_from(index).map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))
}
