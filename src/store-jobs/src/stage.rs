//! Drives one job through one pipeline stage: claim it, hand it to a producer (scraper, analyzer,
//! answerer, applier), then persist what the producer returned.
//!
//! The runner never retries. A failed or malformed production, or output the store rejects, moves
//! the job to the stage's failed status, where it stays until an operator or scheduler moves it with
//! [`update_status`].
//!
//! [`update_status`]: crate::mutation::update_status

use async_trait::async_trait;
use data_model_jobs::{
    db::DbPool,
    lifecycle::Stage,
    models::{Details, DetailsPayload, FieldAnswer, FormField, JobStatus, NewFormField},
};
use serde::{Deserialize, Serialize};

use crate::claim::{ClaimedJob, claim_stage};
use crate::errors::Error;
use crate::mutation::{
    RecordAnswersOutcome, ReplaceFieldsOutcome, UpdateOutcome, mark_fields_sent, record_answers, replace_form_fields,
    update_status, upsert_details,
};
use crate::read::{get_details, get_form_fields};

/// Everything the store knows about a claimed job when its producer runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: ClaimedJob,
    pub details: Option<Details>,
    pub fields: Vec<FormField>,
}

/// Terminal outcomes a producer may route a job to instead of the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// The posting was taken down.
    Expired,
    /// The job does not fit and should not be applied to.
    Rejected,
    NeedsManualReview,
}

impl Escalation {
    pub fn status(&self) -> JobStatus {
        match self {
            Escalation::Expired => JobStatus::Expired,
            Escalation::Rejected => JobStatus::Rejected,
            Escalation::NeedsManualReview => JobStatus::NeedsManualReview,
        }
    }
}

/// What a producer hands back for a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Result of [`Stage::DetailsScraping`].
    Details(DetailsPayload),
    /// Result of [`Stage::FormFieldsScraping`]; replaces any previously captured fields.
    FormFields(Vec<NewFormField>),
    /// Result of [`Stage::AnswersGenerating`].
    Answers(Vec<FieldAnswer>),
    /// The stage finished with nothing to store (the analysis stages, and applying).
    Completed,
    Escalate(Escalation),
    Failed(String),
}

impl StageOutput {
    /// Whether this output is a valid result of `stage`. Escalations and failures fit every stage.
    pub fn fits(&self, stage: Stage) -> bool {
        match self {
            StageOutput::Details(_) => stage == Stage::DetailsScraping,
            StageOutput::FormFields(_) => stage == Stage::FormFieldsScraping,
            StageOutput::Answers(_) => stage == Stage::AnswersGenerating,
            StageOutput::Completed => matches!(
                stage,
                Stage::DetailsAnalyzing | Stage::FormFieldsAnalyzing | Stage::Applying
            ),
            StageOutput::Escalate(_) | StageOutput::Failed(_) => true,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            StageOutput::Details(_) => "details",
            StageOutput::FormFields(_) => "form fields",
            StageOutput::Answers(_) => "answers",
            StageOutput::Completed => "completion",
            StageOutput::Escalate(_) => "escalation",
            StageOutput::Failed(_) => "failure",
        }
    }
}

/// Work performed on a claimed job for one stage.
#[async_trait]
pub trait StageProducer: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produces the stage's result. Errors are reported as [`StageOutput::Failed`].
    async fn produce(&self, ctx: &JobContext) -> StageOutput;
}

/// How a processed job left its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    /// Moved to the stage's completed status.
    Completed,
    Escalated(Escalation),
    /// Moved to the stage's failed status.
    Failed(String),
    /// The job was deleted while its producer ran; nothing was written.
    Vanished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub job: ClaimedJob,
    pub stage: Stage,
    pub result: StageResult,
}

impl StageReport {
    /// Status the job holds after processing; `None` if it no longer exists.
    pub fn final_status(&self) -> Option<JobStatus> {
        match &self.result {
            StageResult::Completed => Some(self.stage.completed_status()),
            StageResult::Escalated(escalation) => Some(escalation.status()),
            StageResult::Failed(_) => Some(self.stage.failed_status()),
            StageResult::Vanished => None,
        }
    }
}

/// Claims the oldest job ready for `producer`'s stage and runs it through the producer.
///
/// Returns `Ok(None)` when no job is ready. A non-retryable error while storing the output moves the
/// job to the stage's failed status; a transient store error after the claim is returned and leaves
/// the job in the stage's in-progress status.
pub async fn process_next<P>(pool: &DbPool, producer: &P) -> Result<Option<StageReport>, Error>
where
    P: StageProducer + ?Sized,
{
    let stage = producer.stage();
    let Some(job) = claim_stage(pool, stage).await?.claimed() else {
        return Ok(None);
    };

    let ctx = JobContext {
        details: get_details(pool, job.id).await?,
        fields: get_form_fields(pool, job.id).await?,
        job,
    };

    tracing::debug!("[job: {}] Running {} producer", ctx.job.key, stage);
    let output = producer.produce(&ctx).await;
    let job = ctx.job;

    let result = persist(pool, &job, stage, output).await?;
    match &result {
        StageResult::Completed => tracing::info!("[job: {}] {} completed", job.key, stage),
        StageResult::Escalated(escalation) => {
            tracing::info!("[job: {}] {} escalated to {}", job.key, stage, escalation.status())
        }
        StageResult::Failed(reason) => tracing::warn!("[job: {}] {} failed: {}", job.key, stage, reason),
        StageResult::Vanished => tracing::warn!("[job: {}] Deleted while {} was running", job.key, stage),
    }

    Ok(Some(StageReport { job, stage, result }))
}

/// Writes the producer's output. A write that can never succeed (a constraint violation, say) fails
/// the stage instead of leaving the job in-progress; transient errors are returned to the caller.
async fn persist(pool: &DbPool, job: &ClaimedJob, stage: Stage, output: StageOutput) -> Result<StageResult, Error> {
    match write_output(pool, job, stage, output).await {
        Err(error) if !error.is_retryable() => {
            tracing::error!("[job: {}] Could not store {} output: {}", job.key, stage, error);
            fail(pool, job, stage, error.to_string()).await
        }
        result => result,
    }
}

async fn write_output(
    pool: &DbPool,
    job: &ClaimedJob,
    stage: Stage,
    output: StageOutput,
) -> Result<StageResult, Error> {
    if !output.fits(stage) {
        let reason = format!("producer returned {} for stage {}", output.describe(), stage);
        return fail(pool, job, stage, reason).await;
    }

    match output {
        StageOutput::Details(payload) => completed(upsert_details(pool, job.key, payload).await?),
        StageOutput::FormFields(fields) => match replace_form_fields(pool, job.key, fields).await? {
            ReplaceFieldsOutcome::Created { .. } => Ok(StageResult::Completed),
            ReplaceFieldsOutcome::NotFound { .. } => Ok(StageResult::Vanished),
        },
        StageOutput::Answers(answers) => match record_answers(pool, job.key, answers).await? {
            RecordAnswersOutcome::Recorded { .. } => Ok(StageResult::Completed),
            RecordAnswersOutcome::NotFound { .. } => Ok(StageResult::Vanished),
            RecordAnswersOutcome::UnknownField { field_id, .. } => {
                fail(pool, job, stage, format!("answer for unknown form field {}", field_id)).await
            }
        },
        StageOutput::Completed if stage == Stage::Applying => completed(mark_fields_sent(pool, job.key).await?),
        StageOutput::Completed => completed(update_status(pool, job.key, stage.completed_status()).await?),
        StageOutput::Escalate(escalation) => match update_status(pool, job.key, escalation.status()).await? {
            UpdateOutcome::Updated { .. } => Ok(StageResult::Escalated(escalation)),
            UpdateOutcome::NotFound { .. } => Ok(StageResult::Vanished),
        },
        StageOutput::Failed(reason) => fail(pool, job, stage, reason).await,
    }
}

fn completed(outcome: UpdateOutcome) -> Result<StageResult, Error> {
    match outcome {
        UpdateOutcome::Updated { .. } => Ok(StageResult::Completed),
        UpdateOutcome::NotFound { .. } => Ok(StageResult::Vanished),
    }
}

async fn fail(pool: &DbPool, job: &ClaimedJob, stage: Stage, reason: String) -> Result<StageResult, Error> {
    match update_status(pool, job.key, stage.failed_status()).await? {
        UpdateOutcome::Updated { .. } => Ok(StageResult::Failed(reason)),
        UpdateOutcome::NotFound { .. } => Ok(StageResult::Vanished),
    }
}

#[cfg(test)]
mod tests {
    use data_model_jobs::models::{AnswerType, JobKey};
    use uuid::Uuid;

    use super::*;

    fn report(result: StageResult, stage: Stage) -> StageReport {
        StageReport {
            job: ClaimedJob {
                id: Uuid::new_v4(),
                key: JobKey::djinni(7),
                status: stage.in_progress_status(),
            },
            stage,
            result,
        }
    }

    #[test]
    fn test_payload_outputs_fit_only_their_stage() {
        let details = StageOutput::Details(DetailsPayload {
            title: "Rust engineer".to_string(),
            company: "Acme".to_string(),
            description: "Build things".to_string(),
            link: "https://djinni.co/jobs/7".to_string(),
        });
        let fields = StageOutput::FormFields(vec![NewFormField::new("Why us?", AnswerType::FreeText)]);
        let answers = StageOutput::Answers(vec![]);

        for stage in Stage::ALL {
            assert_eq!(details.fits(*stage), *stage == Stage::DetailsScraping);
            assert_eq!(fields.fits(*stage), *stage == Stage::FormFieldsScraping);
            assert_eq!(answers.fits(*stage), *stage == Stage::AnswersGenerating);
        }
    }

    #[test]
    fn test_completed_fits_stages_without_payload() {
        assert!(StageOutput::Completed.fits(Stage::DetailsAnalyzing));
        assert!(StageOutput::Completed.fits(Stage::FormFieldsAnalyzing));
        assert!(StageOutput::Completed.fits(Stage::Applying));
        assert!(!StageOutput::Completed.fits(Stage::DetailsScraping));
        assert!(!StageOutput::Completed.fits(Stage::AnswersGenerating));
    }

    #[test]
    fn test_failures_and_escalations_fit_every_stage() {
        for stage in Stage::ALL {
            assert!(StageOutput::Failed("boom".to_string()).fits(*stage));
            assert!(StageOutput::Escalate(Escalation::Expired).fits(*stage));
        }
    }

    #[test]
    fn test_escalation_statuses_are_terminal() {
        for escalation in [Escalation::Expired, Escalation::Rejected, Escalation::NeedsManualReview] {
            assert!(escalation.status().is_escalation());
            assert!(escalation.status().is_terminal());
        }
    }

    #[test]
    fn test_final_status() {
        let stage = Stage::FormFieldsScraping;
        assert_eq!(
            report(StageResult::Completed, stage).final_status(),
            Some(JobStatus::FormFieldsScraped)
        );
        assert_eq!(
            report(StageResult::Failed("timeout".to_string()), stage).final_status(),
            Some(JobStatus::FormFieldsScrapeFailed)
        );
        assert_eq!(
            report(StageResult::Escalated(Escalation::Rejected), stage).final_status(),
            Some(JobStatus::Rejected)
        );
        assert_eq!(report(StageResult::Vanished, stage).final_status(), None);
    }
}
