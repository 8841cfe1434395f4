//! Integration tests for clarification persistence.

use notegraph_db::test_fixtures::{TestDatabase, TestNote};
use notegraph_db::ClarificationStatus;
use uuid::Uuid;

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_raise_creates_one_pending_per_note() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "Which Raj?").insert(db).await;

    let first = db
        .clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap();
    assert!(first.is_some());
    assert_eq!(first.unwrap().status, ClarificationStatus::Pending);

    // Same ambiguity on a second extraction run.
    let again = db
        .clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap();
    assert!(again.is_none());

    // A different question is also held back while one is pending.
    let other = db
        .clarifications
        .raise(note, user, "Is Atlas a new project?")
        .await
        .unwrap();
    assert!(other.is_none());

    assert_eq!(db.clarifications.list_for_note(note).await.unwrap().len(), 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_concurrent_raise_creates_single_row() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "race").insert(&db).await;

    let (a, b) = tokio::join!(
        db.clarifications.raise(note, user, "Who is Sam?"),
        db.clarifications.raise(note, user, "Who is Sam?")
    );
    let created = [a.unwrap(), b.unwrap()].iter().filter(|c| c.is_some()).count();
    assert_eq!(created, 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_answer_then_apply_lifecycle() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "lifecycle").insert(db).await;

    let raised = db
        .clarifications
        .raise(note, user, "Which Acme?")
        .await
        .unwrap()
        .unwrap();

    let answered = db
        .clarifications
        .answer(note, "Acme Robotics")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answered.id, raised.id);
    assert_eq!(answered.status, ClarificationStatus::Answered);
    assert_eq!(answered.answer.as_deref(), Some("Acme Robotics"));
    assert!(answered.answered_at.is_some());

    // Nothing pending anymore.
    assert!(db.clarifications.answer(note, "again").await.unwrap().is_none());

    let waiting = db.clarifications.answered_for_notes(&[note]).await.unwrap();
    assert_eq!(waiting.len(), 1);

    assert_eq!(db.clarifications.apply(note).await.unwrap(), 1);
    let applied = db.clarifications.get(raised.id).await.unwrap().unwrap();
    assert_eq!(applied.status, ClarificationStatus::Applied);
    assert!(applied.applied_at.is_some());
    assert!(db.clarifications.answered_for_notes(&[note]).await.unwrap().is_empty());

    // Once answered, a new question may be raised for the note.
    let next = db
        .clarifications
        .raise(note, user, "Is this for Atlas?")
        .await
        .unwrap();
    assert!(next.is_some());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_applied_question_can_be_asked_again_after_note_changes() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "Raj sync").insert(db).await;

    db.clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap()
        .unwrap();

    // Answered but not yet applied: the answer is still on its way to the extractor.
    db.clarifications.answer(note, "Raj Patel").await.unwrap();
    let held = db
        .clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap();
    assert!(held.is_none());

    // Applied on the pass that used the answer; a repeat on that pass is dropped.
    assert_eq!(db.clarifications.apply(note).await.unwrap(), 1);
    let repeat = db
        .clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap();
    assert!(repeat.is_none());

    // The note is edited and enriched again; the ambiguity may come back.
    sqlx::query("UPDATE note SET content = 'Raj and Raj again', updated_at = now() WHERE id = $1")
        .bind(note)
        .execute(&db.pool)
        .await
        .unwrap();
    let asked = db
        .clarifications
        .raise(note, user, "Which Raj do you mean?")
        .await
        .unwrap();
    assert!(asked.is_some());
    assert_eq!(asked.unwrap().status, ClarificationStatus::Pending);
    assert_eq!(db.clarifications.list_for_note(note).await.unwrap().len(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_answer_by_message_ref() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "dm").insert(db).await;

    let raised = db
        .clarifications
        .raise(note, user, "Who is J?")
        .await
        .unwrap()
        .unwrap();
    db.clarifications
        .set_message_ref(raised.id, "msg-42")
        .await
        .unwrap();

    assert!(db
        .clarifications
        .answer_by_message_ref("msg-unknown", "x")
        .await
        .unwrap()
        .is_none());

    let answered = db
        .clarifications
        .answer_by_message_ref("msg-42", "Jordan Lee")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answered.id, raised.id);
    assert_eq!(answered.message_ref.as_deref(), Some("msg-42"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_pending_for_user() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    let n1 = TestNote::new(user, "one").insert(db).await;
    let n2 = TestNote::new(user, "two").insert(db).await;
    let n3 = TestNote::new(other, "three").insert(db).await;

    db.clarifications.raise(n1, user, "q1").await.unwrap();
    db.clarifications.raise(n2, user, "q2").await.unwrap();
    db.clarifications.raise(n3, other, "q3").await.unwrap();
    db.clarifications.answer(n2, "a2").await.unwrap();

    let pending = db.clarifications.pending_for_user(user).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].note_id, n1);

    test_db.cleanup().await;
}
