//! Tests for form field capture, answering and submission
//!
//! Covers replace_form_fields(), get_form_fields(), record_answers() and mark_fields_sent():
//! - Replacing leaves exactly the new field set (including empty old or new sets)
//! - Fields are returned in capture order with their answer options
//! - Answers are only written when every field belongs to the job
//! - Submission stamps sent_at and moves the job to Applied

use data_model_jobs::{
    models::{AnswerOption, AnswerType, FieldAnswer, JobKey, JobStatus, NewFormField},
    test_helpers::{
        TestDbGuard, clean_test_db, count_form_fields, create_test_form_fields, create_test_stub,
        get_form_fields_by_stub_id, get_stub_by_external_id, sample_form_fields, test_db_pool,
    },
};
use store_jobs::{
    RecordAnswersOutcome, ReplaceFieldsOutcome, UpdateOutcome, get_form_fields, mark_fields_sent, record_answers,
    replace_form_fields,
};
use tokio::sync::Mutex;
use uuid::Uuid;

static TEST_MUTEX: Mutex<()> = Mutex::const_new(());

#[tokio::test]
async fn test_replace_form_fields_replaces_every_old_field() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    // (old K, new J) including both empty edges
    for (external_id, (old, new)) in [(3, 2), (0, 4), (5, 0), (0, 0), (2, 6)].into_iter().enumerate() {
        let stub = create_test_stub(&pool, external_id as i64, JobStatus::FormFieldsScraping).await;
        let previous = create_test_form_fields(&pool, &stub, old).await;

        let outcome = replace_form_fields(&pool, stub.key(), sample_form_fields(new)).await.unwrap();

        assert_eq!(
            outcome,
            ReplaceFieldsOutcome::Created {
                id: stub.id,
                key: stub.key(),
                count: new
            }
        );
        let stored = get_form_fields_by_stub_id(&pool, stub.id).await;
        assert_eq!(stored.len(), new, "K={} J={}", old, new);
        assert!(
            stored.iter().all(|field| previous.iter().all(|p| p.id != field.id)),
            "No old field may survive (K={} J={})",
            old,
            new
        );
        assert_eq!(
            get_stub_by_external_id(&pool, stub.external_id).await.unwrap().status,
            JobStatus::FormFieldsScraped
        );
    }
}

#[tokio::test]
async fn test_replace_form_fields_only_touches_its_job() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let stub = create_test_stub(&pool, 1, JobStatus::FormFieldsScraping).await;
    let other = create_test_stub(&pool, 2, JobStatus::FormFieldsScraped).await;
    create_test_form_fields(&pool, &other, 3).await;

    replace_form_fields(&pool, stub.key(), sample_form_fields(1)).await.unwrap();

    assert_eq!(get_form_fields_by_stub_id(&pool, other.id).await.len(), 3);
    assert_eq!(count_form_fields(&pool).await, 4);
}

#[tokio::test]
async fn test_replace_form_fields_unknown_job() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let outcome = replace_form_fields(&pool, JobKey::djinni(5), sample_form_fields(2)).await.unwrap();

    assert_eq!(outcome, ReplaceFieldsOutcome::NotFound { key: JobKey::djinni(5) });
    assert_eq!(count_form_fields(&pool).await, 0);
}

#[tokio::test]
async fn test_get_form_fields_keeps_capture_order() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let stub = create_test_stub(&pool, 1, JobStatus::FormFieldsScraping).await;
    let options = vec![
        AnswerOption {
            label: "Remote".to_string(),
            value: "remote".to_string(),
        },
        AnswerOption {
            label: "Office".to_string(),
            value: "office".to_string(),
        },
    ];
    let fields = vec![
        NewFormField::new("Years of Rust?", AnswerType::Numeric).with_external_field_id("years"),
        NewFormField::new("Work format", AnswerType::SingleChoice).with_options(options.clone()),
        NewFormField::new("Tell us about yourself", AnswerType::FreeText),
    ];
    replace_form_fields(&pool, stub.key(), fields).await.unwrap();

    let stored = get_form_fields(&pool, stub.id).await.unwrap();

    let questions: Vec<&str> = stored.iter().map(|f| f.question.as_str()).collect();
    assert_eq!(questions, vec!["Years of Rust?", "Work format", "Tell us about yourself"]);
    assert_eq!(stored[0].external_field_id.as_deref(), Some("years"));
    assert_eq!(stored[1].options(), options.as_slice());
    assert!(stored[2].options().is_empty());
    assert!(stored.iter().all(|f| f.answer.is_none() && f.sent_at.is_none()));
    assert!(stored.iter().all(|f| f.scraped_at == stored[0].scraped_at));
}

#[tokio::test]
async fn test_get_form_fields_empty_for_unknown_job() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    assert!(get_form_fields(&pool, Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_answers() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let stub = create_test_stub(&pool, 1, JobStatus::AnswersGenerating).await;
    let fields = create_test_form_fields(&pool, &stub, 2).await;
    let answers = vec![
        FieldAnswer {
            field_id: fields[0].id,
            answer: "Five years".to_string(),
        },
        FieldAnswer {
            field_id: fields[1].id,
            answer: "yes".to_string(),
        },
    ];

    let outcome = record_answers(&pool, stub.key(), answers).await.unwrap();

    assert_eq!(
        outcome,
        RecordAnswersOutcome::Recorded {
            id: stub.id,
            key: stub.key(),
            count: 2
        }
    );
    let stored = get_form_fields(&pool, stub.id).await.unwrap();
    assert_eq!(stored[0].answer.as_deref(), Some("Five years"));
    assert_eq!(stored[1].answer.as_deref(), Some("yes"));
    assert_eq!(
        get_stub_by_external_id(&pool, 1).await.unwrap().status,
        JobStatus::AnswersGenerated
    );
}

#[tokio::test]
async fn test_record_answers_rejects_foreign_field() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let stub = create_test_stub(&pool, 1, JobStatus::AnswersGenerating).await;
    let fields = create_test_form_fields(&pool, &stub, 1).await;
    let other = create_test_stub(&pool, 2, JobStatus::AnswersGenerating).await;
    let foreign = create_test_form_fields(&pool, &other, 1).await;

    let answers = vec![
        FieldAnswer {
            field_id: fields[0].id,
            answer: "mine".to_string(),
        },
        FieldAnswer {
            field_id: foreign[0].id,
            answer: "not mine".to_string(),
        },
    ];
    let outcome = record_answers(&pool, stub.key(), answers).await.unwrap();

    assert_eq!(
        outcome,
        RecordAnswersOutcome::UnknownField {
            key: stub.key(),
            field_id: foreign[0].id
        }
    );
    // nothing written for either job
    assert!(get_form_fields(&pool, stub.id).await.unwrap()[0].answer.is_none());
    assert!(get_form_fields(&pool, other.id).await.unwrap()[0].answer.is_none());
    assert_eq!(
        get_stub_by_external_id(&pool, 1).await.unwrap().status,
        JobStatus::AnswersGenerating
    );
}

#[tokio::test]
async fn test_record_answers_unknown_job() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let outcome = record_answers(&pool, JobKey::djinni(3), vec![]).await.unwrap();

    assert_eq!(outcome, RecordAnswersOutcome::NotFound { key: JobKey::djinni(3) });
}

#[tokio::test]
async fn test_mark_fields_sent() {
    let _db = TestDbGuard::acquire().await;
    let pool = test_db_pool().await;
    let _guard = TEST_MUTEX.lock().await;
    clean_test_db(&pool).await;

    let stub = create_test_stub(&pool, 1, JobStatus::Applying).await;
    create_test_form_fields(&pool, &stub, 3).await;
    let untouched = create_test_stub(&pool, 2, JobStatus::Applying).await;
    create_test_form_fields(&pool, &untouched, 1).await;

    let outcome = mark_fields_sent(&pool, stub.key()).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            id: stub.id,
            key: stub.key()
        }
    );
    assert!(get_form_fields(&pool, stub.id).await.unwrap().iter().all(|f| f.sent_at.is_some()));
    assert!(get_form_fields(&pool, untouched.id).await.unwrap()[0].sent_at.is_none());
    assert_eq!(get_stub_by_external_id(&pool, 1).await.unwrap().status, JobStatus::Applied);
}
