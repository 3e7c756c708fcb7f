pub mod claim;
pub mod errors;
pub mod mutation;
mod queries;
pub mod read;
pub mod stage;
pub mod unit_of_work;

pub use errors::{Error, ErrorKind};

pub use claim::{ClaimOutcome, ClaimedJob, claim_next, claim_stage};
pub use mutation::{
    CreateStubOutcome, DeleteOutcome, RecordAnswersOutcome, ReplaceFieldsOutcome, UpdateOutcome, create_stub,
    delete_stub, mark_fields_sent, record_answers, replace_form_fields, update_status, upsert_details,
};
pub use read::{count_by_status, get_details, get_form_fields, get_stub};
pub use stage::{Escalation, JobContext, StageOutput, StageProducer, StageReport, StageResult, process_next};
pub use unit_of_work::run_in_transaction;
