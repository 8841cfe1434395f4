//! Integration tests for entity resolution and linking.

use notegraph_db::test_fixtures::{TestDatabase, TestNote};
use notegraph_db::{EntityExtra, EntityKind, Error};
use uuid::Uuid;

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_same_person_across_notes_resolves_once() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();

    let first_note = TestNote::new(user, "Monday sync").insert(db).await;
    let second_note = TestNote::new(user, "Friday sync").insert(db).await;

    let first = db
        .entities
        .find_or_create(EntityKind::Person, user, "Sarah Johnson", None)
        .await
        .unwrap();
    db.entities.link(EntityKind::Person, first_note, first.id).await.unwrap();

    let second = db
        .entities
        .find_or_create(EntityKind::Person, user, "Sarah Johnson", None)
        .await
        .unwrap();
    db.entities.link(EntityKind::Person, second_note, second.id).await.unwrap();

    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.id, second.id);
    assert_eq!(db.entities.count_for_user(EntityKind::Person, user).await.unwrap(), 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_casing_variants_refresh_display_name() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();

    let a = db
        .entities
        .find_or_create(EntityKind::Company, user, "acme corp", None)
        .await
        .unwrap();
    let b = db
        .entities
        .find_or_create(EntityKind::Company, user, "  ACME Corp. ", None)
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    assert!(!b.is_new);
    assert_eq!(b.name, "ACME Corp.");

    let stored = db.entities.get(EntityKind::Company, a.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "ACME Corp.");
    assert_eq!(stored.normalized_name, "acmecorp");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_same_name_different_users_are_distinct() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;

    let a = db
        .entities
        .find_or_create(EntityKind::Project, Uuid::new_v4(), "Atlas", None)
        .await
        .unwrap();
    let b = db
        .entities
        .find_or_create(EntityKind::Project, Uuid::new_v4(), "Atlas", None)
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert!(a.is_new && b.is_new);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_concurrent_find_or_create_yields_one_row() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for variant in ["Raj Patel", "raj patel", "RAJ PATEL", "Raj-Patel", "raj  patel"] {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.entities
                .find_or_create(EntityKind::Person, user, variant, None)
                .await
        }));
    }

    let mut ids = Vec::new();
    let mut inserted = 0;
    for handle in handles {
        let resolved = handle.await.unwrap().unwrap();
        if resolved.is_new {
            inserted += 1;
        }
        ids.push(resolved.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "every variant resolves to the same row");
    assert_eq!(inserted, 1, "exactly one caller inserted");
    assert_eq!(db.entities.count_for_user(EntityKind::Person, user).await.unwrap(), 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_invalid_name_is_rejected_without_touching_db() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();

    let err = db
        .entities
        .find_or_create(EntityKind::Person, user, "???", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntityName(_)));
    assert_eq!(db.entities.count_for_user(EntityKind::Person, user).await.unwrap(), 0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_kind_specific_attributes() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();

    let project = db
        .entities
        .find_or_create(EntityKind::Project, user, "Atlas", None)
        .await
        .unwrap();
    let stored = db.entities.get(EntityKind::Project, project.id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_deref(), Some("active"));

    let company = db
        .entities
        .find_or_create(
            EntityKind::Company,
            user,
            "Globex",
            Some(&EntityExtra::Category("vendor".into())),
        )
        .await
        .unwrap();

    // A later mention without a category keeps the stored one.
    db.entities
        .find_or_create(EntityKind::Company, user, "globex", None)
        .await
        .unwrap();
    let stored = db.entities.get(EntityKind::Company, company.id).await.unwrap().unwrap();
    assert_eq!(stored.category.as_deref(), Some("vendor"));
    assert!(stored.status.is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_link_is_idempotent() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let note = TestNote::new(user, "link").insert(db).await;

    let person = db
        .entities
        .find_or_create(EntityKind::Person, user, "Ana", None)
        .await
        .unwrap();

    assert!(db.entities.link(EntityKind::Person, note, person.id).await.unwrap());
    assert!(!db.entities.link(EntityKind::Person, note, person.id).await.unwrap());
    assert_eq!(
        db.entities.linked_ids(EntityKind::Person, note).await.unwrap(),
        vec![person.id]
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_known_names_are_user_scoped_and_limited() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    for name in ["Ana", "Ben", "Cara"] {
        db.entities
            .find_or_create(EntityKind::Person, user, name, None)
            .await
            .unwrap();
    }
    db.entities
        .find_or_create(EntityKind::Company, user, "Acme", None)
        .await
        .unwrap();
    db.entities
        .find_or_create(EntityKind::Person, other, "Zed", None)
        .await
        .unwrap();

    let names = db.entities.known_names(user, 2).await.unwrap();
    assert_eq!(names.people.len(), 2);
    assert!(!names.people.contains(&"Zed".to_string()));
    assert_eq!(names.companies, vec!["Acme".to_string()]);
    assert!(names.projects.is_empty());

    test_db.cleanup().await;
}
