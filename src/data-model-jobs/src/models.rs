use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::{Jsonb, SqlType};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

// SQL type definitions for custom enums
// Note: These types use snake_case to match PostgreSQL type names
#[allow(non_camel_case_types)]
#[derive(SqlType, diesel::query_builder::QueryId, Debug, Clone, Copy)]
#[diesel(postgres_type(name = "job_source"))]
pub struct Job_source;

#[allow(non_camel_case_types)]
#[derive(SqlType, diesel::query_builder::QueryId, Debug, Clone, Copy)]
#[diesel(postgres_type(name = "job_status"))]
pub struct Job_status;

#[allow(non_camel_case_types)]
#[derive(SqlType, diesel::query_builder::QueryId, Debug, Clone, Copy)]
#[diesel(postgres_type(name = "answer_type"))]
pub struct Answer_type;

/// A string that is not one of the values of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {type_name}")]
pub struct UnknownVariant {
    pub type_name: &'static str,
    pub value: String,
}

/// Defines a closed enumeration that is stored as a PostgreSQL enum type.
/// Every variant is bound to exactly one text label: the label is what the database
/// stores, what serde reads & writes, and the only input `FromStr` accepts.
macro_rules! pg_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $sql_type:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[diesel(sql_type = $sql_type)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $label => Ok($name::$variant), )+
                    _ => Err(UnknownVariant {
                        type_name: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl ToSql<$sql_type, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<$sql_type, Pg> for $name {
            fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
                let label = std::str::from_utf8(bytes.as_bytes())?;
                Ok(label.parse::<$name>()?)
            }
        }
    };
}

pg_enum! {
    /// Site a job posting was discovered on.
    JobSource as Job_source {
        Djinni => "djinni",
    }
}

pg_enum! {
    /// Pipeline state of a job. Each stage has an in-progress, a completed and a failed state.
    /// See [`crate::lifecycle`] for how states group into stages.
    JobStatus as Job_status {
        /// Discovered; only the natural key is known.
        IdSaved => "id_saved",
        DetailsScraping => "details_scraping",
        DetailsScraped => "details_scraped",
        DetailsScrapeFailed => "details_scrape_failed",
        FormFieldsScraping => "form_fields_scraping",
        FormFieldsScraped => "form_fields_scraped",
        FormFieldsScrapeFailed => "form_fields_scrape_failed",
        DetailsAnalyzing => "details_analyzing",
        DetailsAnalyzed => "details_analyzed",
        DetailsAnalyzeFailed => "details_analyze_failed",
        FormFieldsAnalyzing => "form_fields_analyzing",
        FormFieldsAnalyzed => "form_fields_analyzed",
        FormFieldsAnalyzeFailed => "form_fields_analyze_failed",
        AnswersGenerating => "answers_generating",
        AnswersGenerated => "answers_generated",
        AnswersGenerateFailed => "answers_generate_failed",
        Applying => "applying",
        Applied => "applied",
        ApplyFailed => "apply_failed",
        /// The posting aged out.
        Expired => "expired",
        /// Disqualified by analysis.
        Rejected => "rejected",
        /// Automation could not proceed with confidence.
        NeedsManualReview => "needs_manual_review",
    }
}

pg_enum! {
    /// Kind of answer a form field expects.
    AnswerType as Answer_type {
        FreeText => "free_text",
        /// Exactly one of the field's `answer_options`.
        SingleChoice => "single_choice",
        Numeric => "numeric",
        SkillList => "skill_list",
    }
}

/// Natural key of a job: the origin site plus the origin's own identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub source: JobSource,
    pub external_id: i64,
}

impl JobKey {
    pub fn new(source: JobSource, external_id: i64) -> Self {
        Self { source, external_id }
    }

    pub fn djinni(external_id: i64) -> Self {
        Self::new(JobSource::Djinni, external_id)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.external_id)
    }
}

// job_stubs table model
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::job_stubs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Stub {
    pub id: Uuid,
    pub source: JobSource,
    pub external_id: i64,
    pub status: JobStatus,
    pub found_at: DateTime<Utc>,
}

impl Stub {
    /// A freshly discovered job: new identity, `IdSaved`, found now.
    pub fn discovered(key: JobKey) -> Self {
        Stub {
            id: Uuid::new_v4(),
            source: key.source,
            external_id: key.external_id,
            status: JobStatus::IdSaved,
            found_at: Utc::now(),
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.source, self.external_id)
    }
}

/// Descriptive content of a posting, as returned by the details scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsPayload {
    pub title: String,
    pub company: String,
    pub description: String,
    pub link: String,
}

// job_details table model; `id` is the owning stub's id
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::job_details)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Details {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub description: String,
    pub link: String,
    pub scraped_at: DateTime<Utc>,
}

impl Details {
    pub fn from_payload(stub_id: Uuid, payload: DetailsPayload, scraped_at: DateTime<Utc>) -> Self {
        Details {
            id: stub_id,
            title: payload.title,
            company: payload.company,
            description: payload.description,
            link: payload.link,
            scraped_at,
        }
    }
}

/// One selectable choice of a single-choice form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub value: String,
}

/// Ordered choices of a form field, stored as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Jsonb)]
#[serde(transparent)]
pub struct AnswerOptions(pub Vec<AnswerOption>);

impl ToSql<Jsonb, Pg> for AnswerOptions {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        // jsonb binary format version
        out.write_all(&[1])?;
        serde_json::to_writer(out, &self.0)?;
        Ok(IsNull::No)
    }
}

impl FromSql<Jsonb, Pg> for AnswerOptions {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        let value = <serde_json::Value as FromSql<Jsonb, Pg>>::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// A form field as captured by the form scraper, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFormField {
    #[serde(default)]
    pub external_field_id: Option<String>,
    pub question: String,
    pub answer_type: AnswerType,
    #[serde(default)]
    pub answer_options: Option<Vec<AnswerOption>>,
}

impl NewFormField {
    pub fn new(question: impl Into<String>, answer_type: AnswerType) -> Self {
        NewFormField {
            external_field_id: None,
            question: question.into(),
            answer_type,
            answer_options: None,
        }
    }

    pub fn with_options(mut self, options: Vec<AnswerOption>) -> Self {
        self.answer_options = Some(options);
        self
    }

    pub fn with_external_field_id(mut self, external_field_id: impl Into<String>) -> Self {
        self.external_field_id = Some(external_field_id.into());
        self
    }
}

// job_form_fields table model
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::job_form_fields)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FormField {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Order of the field within one capture pass, starting at 0.
    pub position: i32,
    pub external_field_id: Option<String>,
    pub question: String,
    pub answer_type: AnswerType,
    pub answer_options: Option<AnswerOptions>,
    pub answer: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl FormField {
    /// Builds an unanswered, unsent row for `job_id` from a captured field.
    pub fn from_new(job_id: Uuid, position: i32, field: NewFormField, scraped_at: DateTime<Utc>) -> Self {
        FormField {
            id: Uuid::new_v4(),
            job_id,
            position,
            external_field_id: field.external_field_id,
            question: field.question,
            answer_type: field.answer_type,
            answer_options: field.answer_options.map(AnswerOptions),
            answer: None,
            scraped_at,
            sent_at: None,
        }
    }

    pub fn options(&self) -> &[AnswerOption] {
        self.answer_options.as_ref().map(|o| o.0.as_slice()).unwrap_or(&[])
    }
}

/// An answer produced for one stored form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub field_id: Uuid,
    pub answer: String,
}
