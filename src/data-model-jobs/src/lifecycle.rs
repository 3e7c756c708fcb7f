//! The job status state machine.
//!
//! Jobs enter as [`JobStatus::IdSaved`] and move through the stages in order. Claiming a job
//! for a stage moves it from the stage's *ready* status (the previous stage's completed status)
//! to its *in-progress* status; the producer's outcome then moves it to the stage's *completed*
//! or *failed* status. Failed statuses and the escalation statuses (expired, rejected,
//! needs manual review) are terminal: nothing in the store moves a job out of them.

use serde::{Deserialize, Serialize};

use crate::models::{JobStatus, UnknownVariant};

/// A phase of the pipeline, each with its own in-progress / completed / failed triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DetailsScraping,
    FormFieldsScraping,
    DetailsAnalyzing,
    FormFieldsAnalyzing,
    AnswersGenerating,
    Applying,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: &'static [Stage] = &[
        Stage::DetailsScraping,
        Stage::FormFieldsScraping,
        Stage::DetailsAnalyzing,
        Stage::FormFieldsAnalyzing,
        Stage::AnswersGenerating,
        Stage::Applying,
    ];

    /// Status a job must hold to be claimed for this stage.
    pub fn ready_status(&self) -> JobStatus {
        match self.previous() {
            Some(previous) => previous.completed_status(),
            None => JobStatus::IdSaved,
        }
    }

    pub fn in_progress_status(&self) -> JobStatus {
        match self {
            Stage::DetailsScraping => JobStatus::DetailsScraping,
            Stage::FormFieldsScraping => JobStatus::FormFieldsScraping,
            Stage::DetailsAnalyzing => JobStatus::DetailsAnalyzing,
            Stage::FormFieldsAnalyzing => JobStatus::FormFieldsAnalyzing,
            Stage::AnswersGenerating => JobStatus::AnswersGenerating,
            Stage::Applying => JobStatus::Applying,
        }
    }

    pub fn completed_status(&self) -> JobStatus {
        match self {
            Stage::DetailsScraping => JobStatus::DetailsScraped,
            Stage::FormFieldsScraping => JobStatus::FormFieldsScraped,
            Stage::DetailsAnalyzing => JobStatus::DetailsAnalyzed,
            Stage::FormFieldsAnalyzing => JobStatus::FormFieldsAnalyzed,
            Stage::AnswersGenerating => JobStatus::AnswersGenerated,
            Stage::Applying => JobStatus::Applied,
        }
    }

    pub fn failed_status(&self) -> JobStatus {
        match self {
            Stage::DetailsScraping => JobStatus::DetailsScrapeFailed,
            Stage::FormFieldsScraping => JobStatus::FormFieldsScrapeFailed,
            Stage::DetailsAnalyzing => JobStatus::DetailsAnalyzeFailed,
            Stage::FormFieldsAnalyzing => JobStatus::FormFieldsAnalyzeFailed,
            Stage::AnswersGenerating => JobStatus::AnswersGenerateFailed,
            Stage::Applying => JobStatus::ApplyFailed,
        }
    }

    pub fn previous(&self) -> Option<Stage> {
        let index = Stage::ALL.iter().position(|s| s == self)?;
        index.checked_sub(1).map(|i| Stage::ALL[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DetailsScraping => "details_scraping",
            Stage::FormFieldsScraping => "form_fields_scraping",
            Stage::DetailsAnalyzing => "details_analyzing",
            Stage::FormFieldsAnalyzing => "form_fields_analyzing",
            Stage::AnswersGenerating => "answers_generating",
            Stage::Applying => "applying",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownVariant {
                type_name: "Stage",
                value: s.to_string(),
            })
    }
}

impl JobStatus {
    /// The stage this status belongs to. `None` for `IdSaved` and the escalation statuses.
    pub fn stage(&self) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|stage| {
            *self == stage.in_progress_status() || *self == stage.completed_status() || *self == stage.failed_status()
        })
    }

    /// True while a worker has the job checked out.
    pub fn is_in_progress(&self) -> bool {
        self.stage().is_some_and(|stage| *self == stage.in_progress_status())
    }

    pub fn is_failed(&self) -> bool {
        self.stage().is_some_and(|stage| *self == stage.failed_status())
    }

    /// Expired, rejected or needs manual review.
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Expired | Self::Rejected | Self::NeedsManualReview)
    }

    /// No automated transition leaves a terminal status.
    /// `Applied` is terminal too: it is the completed status of the last stage.
    pub fn is_terminal(&self) -> bool {
        self.is_failed() || self.is_escalation() || *self == Self::Applied
    }

    /// True if the pipeline itself may move a job from `self` to `next`:
    /// a forward step along the stage edges, or an escalation from a non-terminal status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.is_escalation() {
            return true;
        }
        match next.stage() {
            Some(stage) if next == stage.in_progress_status() => *self == stage.ready_status(),
            Some(stage) => *self == stage.in_progress_status(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_chain() {
        assert_eq!(Stage::DetailsScraping.ready_status(), JobStatus::IdSaved);
        assert_eq!(Stage::FormFieldsScraping.ready_status(), JobStatus::DetailsScraped);
        assert_eq!(Stage::DetailsAnalyzing.ready_status(), JobStatus::FormFieldsScraped);
        assert_eq!(Stage::FormFieldsAnalyzing.ready_status(), JobStatus::DetailsAnalyzed);
        assert_eq!(Stage::AnswersGenerating.ready_status(), JobStatus::FormFieldsAnalyzed);
        assert_eq!(Stage::Applying.ready_status(), JobStatus::AnswersGenerated);

        assert_eq!(Stage::DetailsScraping.previous(), None);
    }

    #[test]
    fn test_every_stage_status_maps_back_to_its_stage() {
        for stage in Stage::ALL {
            assert_eq!(stage.in_progress_status().stage(), Some(*stage));
            assert_eq!(stage.completed_status().stage(), Some(*stage));
            assert_eq!(stage.failed_status().stage(), Some(*stage));
        }
        assert_eq!(JobStatus::IdSaved.stage(), None);
        assert_eq!(JobStatus::NeedsManualReview.stage(), None);
    }

    #[test]
    fn test_status_partition() {
        // every status is exactly one of: initial, in progress, completed, failed, escalation
        for status in JobStatus::ALL {
            let completed = status.stage().is_some_and(|s| s.completed_status() == *status);
            let kinds = [
                *status == JobStatus::IdSaved,
                status.is_in_progress(),
                completed,
                status.is_failed(),
                status.is_escalation(),
            ];
            assert_eq!(kinds.iter().filter(|k| **k).count(), 1, "{}", status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::DetailsScrapeFailed.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
        assert!(JobStatus::Applied.is_terminal());
        assert!(!JobStatus::IdSaved.is_terminal());
        assert!(!JobStatus::Applying.is_terminal());
    }

    #[test]
    fn test_transitions() {
        // claim
        assert!(JobStatus::IdSaved.can_transition_to(JobStatus::DetailsScraping));
        assert!(JobStatus::FormFieldsScraped.can_transition_to(JobStatus::DetailsAnalyzing));
        // producer outcome
        assert!(JobStatus::DetailsScraping.can_transition_to(JobStatus::DetailsScraped));
        assert!(JobStatus::DetailsScraping.can_transition_to(JobStatus::DetailsScrapeFailed));
        // escalation
        assert!(JobStatus::DetailsAnalyzed.can_transition_to(JobStatus::Rejected));

        // no skipping, no going back, nothing out of terminal states
        assert!(!JobStatus::IdSaved.can_transition_to(JobStatus::DetailsScraped));
        assert!(!JobStatus::IdSaved.can_transition_to(JobStatus::FormFieldsScraping));
        assert!(!JobStatus::DetailsScraped.can_transition_to(JobStatus::IdSaved));
        assert!(!JobStatus::DetailsScrapeFailed.can_transition_to(JobStatus::DetailsScraping));
        assert!(!JobStatus::Rejected.can_transition_to(JobStatus::NeedsManualReview));
        assert!(!JobStatus::Applied.can_transition_to(JobStatus::Expired));
    }

    #[test]
    fn test_stage_parse() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), *stage);
        }
        assert!("scraping".parse::<Stage>().is_err());
    }
}
