//! Transactional persistence against a real SQLite file.

mod common;

use std::sync::Arc;

use common::{count, setup_pool, MockFetcher, MockGitLab};
use content_sync::error::ContentError;
use content_sync::models::{NewContributor, PublicId, SourceType, TextDraft, TextPatch};
use content_sync::people;
use content_sync::writer::ContentWriter;

fn draft(namespace: &str, slug: &str) -> TextDraft {
    TextDraft {
        namespace: namespace.to_string(),
        slug: slug.to_string(),
        title: format!("Title of {}", slug),
        format: "markdown".to_string(),
        text: Some("# hello".to_string()),
        ..Default::default()
    }
}

fn credit(person: PublicId, role: &str, order: i64) -> NewContributor {
    NewContributor {
        person,
        role: role.to_string(),
        credit_order: order,
    }
}

#[tokio::test]
async fn create_then_read_back() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let ada = people::create_person(&pool, "Ada").await.unwrap();

    let mut d = draft("docs", "intro");
    d.summary = Some("first steps".to_string());
    d.contributors = vec![credit(ada.public_id, "author", 0)];
    let created = writer.create_text(&d).await.unwrap();

    assert_eq!(created.summary.content_type, "TEXT");
    assert_eq!(created.summary.last_updated, 1);
    assert_eq!(created.text, "# hello");
    assert_eq!(created.source_type, SourceType::None);
    assert_eq!(created.summary.contributors.len(), 1);
    assert_eq!(created.summary.contributors[0].display_name, "Ada");

    let by_id = writer.get_text(&created.public_id()).await.unwrap();
    let by_slug = writer.get_text_by_slug("docs", "intro").await.unwrap();
    assert_eq!(by_id.public_id(), created.public_id());
    assert_eq!(by_slug.public_id(), created.public_id());
    assert_eq!(by_slug.summary.summary.as_deref(), Some("first steps"));
}

#[tokio::test]
async fn unknown_contributor_rolls_back_everything() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let ada = people::create_person(&pool, "Ada").await.unwrap();
    let entities_before = count(&pool, "entities").await;

    let mut d = draft("docs", "orphan");
    d.contributors = vec![
        credit(ada.public_id, "author", 0),
        credit(PublicId::parse("00000000-0000-4000-8000-000000000000").unwrap(), "editor", 1),
    ];
    let err = writer.create_text(&d).await.unwrap_err();

    assert!(matches!(err, ContentError::Validation(_)), "{:?}", err);
    assert_eq!(count(&pool, "entities").await, entities_before);
    assert_eq!(count(&pool, "content_summary").await, 0);
    assert_eq!(count(&pool, "content_type_text").await, 0);
    assert_eq!(count(&pool, "contributors").await, 0);
    assert!(matches!(
        writer.get_text_by_slug("docs", "orphan").await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_slug_in_namespace_conflicts() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());

    writer.create_text(&draft("docs", "intro")).await.unwrap();
    let err = writer.create_text(&draft("docs", "intro")).await.unwrap_err();
    assert!(matches!(err, ContentError::Conflict(_)), "{:?}", err);
    assert_eq!(err.http_status(), 409);

    // Same slug in another namespace is fine.
    writer.create_text(&draft("blog", "intro")).await.unwrap();
    assert_eq!(count(&pool, "content_summary").await, 2);
}

#[tokio::test]
async fn empty_namespace_or_slug_is_rejected() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());

    assert!(matches!(
        writer.create_text(&draft("", "intro")).await,
        Err(ContentError::Validation(_))
    ));
    assert!(matches!(
        writer.create_text(&draft("docs", " ")).await,
        Err(ContentError::Validation(_))
    ));
    assert_eq!(count(&pool, "entities").await, 0);
}

#[tokio::test]
async fn content_type_is_immutable() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let created = writer.create_text(&draft("docs", "intro")).await.unwrap();

    let patch = TextPatch {
        content_type: Some("VIDEO".to_string()),
        title: Some("renamed".to_string()),
        ..Default::default()
    };
    let err = writer
        .update_text_fields(&created.public_id(), &patch)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::Validation(_)));

    let stored = writer.get_text(&created.public_id()).await.unwrap();
    assert_eq!(stored.summary.content_type, "TEXT");
    assert_eq!(stored.summary.title, "Title of intro");
    assert_eq!(stored.summary.last_updated, 1);
}

#[tokio::test]
async fn patch_touches_only_given_fields_and_bumps_revision() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let created = writer.create_text(&draft("docs", "intro")).await.unwrap();

    let patch = TextPatch {
        title: Some("Introduction".to_string()),
        text: Some("# rewritten".to_string()),
        ..Default::default()
    };
    let updated = writer
        .update_text_fields(&created.public_id(), &patch)
        .await
        .unwrap();

    assert_eq!(updated.summary.title, "Introduction");
    assert_eq!(updated.text, "# rewritten");
    assert_eq!(updated.summary.slug, "intro");
    assert_eq!(updated.format, "markdown");
    assert_eq!(updated.summary.last_updated, 2);
}

#[tokio::test]
async fn text_of_externally_managed_record_is_not_patchable() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());

    let mut d = draft("docs", "remote");
    d.extern_path = Some("https://cdn.example.com/remote.md".to_string());
    d.source_type = SourceType::Url;
    let created = writer.create_text(&d).await.unwrap();
    // Externally managed bodies start empty until synchronized.
    assert_eq!(created.text, "");

    let patch = TextPatch {
        text: Some("local edit".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        writer.update_text_fields(&created.public_id(), &patch).await,
        Err(ContentError::Validation(_))
    ));
}

#[tokio::test]
async fn contributors_are_replaced_wholesale() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let a = people::create_person(&pool, "A").await.unwrap();
    let b = people::create_person(&pool, "B").await.unwrap();
    let c = people::create_person(&pool, "C").await.unwrap();

    let mut d = draft("docs", "credits");
    d.contributors = vec![credit(a.public_id, "author", 0), credit(b.public_id, "editor", 1)];
    let created = writer.create_text(&d).await.unwrap();

    let updated = writer
        .update_contributors(
            &created.public_id(),
            &[credit(b.public_id, "author", 0), credit(c.public_id, "reviewer", 1)],
        )
        .await
        .unwrap();

    let names: Vec<&str> = updated
        .summary
        .contributors
        .iter()
        .map(|c| c.display_name.as_str())
        .collect();
    assert_eq!(names, ["B", "C"]);
    assert_eq!(updated.summary.contributors[0].role, "author");
    assert_eq!(count(&pool, "contributors").await, 2);
    assert_eq!(updated.summary.last_updated, 2);
}

#[tokio::test]
async fn failed_contributor_replacement_keeps_old_list() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let a = people::create_person(&pool, "A").await.unwrap();

    let mut d = draft("docs", "credits");
    d.contributors = vec![credit(a.public_id, "author", 0)];
    let created = writer.create_text(&d).await.unwrap();

    let ghost = PublicId::parse("00000000-0000-4000-8000-000000000001").unwrap();
    assert!(writer
        .update_contributors(&created.public_id(), &[credit(ghost, "author", 0)])
        .await
        .is_err());

    let stored = writer.get_text(&created.public_id()).await.unwrap();
    assert_eq!(stored.summary.contributors.len(), 1);
    assert_eq!(stored.summary.contributors[0].display_name, "A");
    assert_eq!(stored.summary.last_updated, 1);
}

#[tokio::test]
async fn update_text_only_stamps_sync_time_and_cookie() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let created = writer.create_text(&draft("docs", "intro")).await.unwrap();
    assert!(created.summary.last_sync.is_none());

    let synced = writer
        .update_text_only(&created.public_id(), "fresh body", Some("abc123"))
        .await
        .unwrap();
    assert_eq!(synced.text, "fresh body");
    assert_eq!(synced.summary.version_cookie, "abc123");
    assert!(synced.summary.last_sync.is_some());

    // Without a cookie the previous fingerprint stays.
    let again = writer
        .update_text_only(&created.public_id(), "fresher body", None)
        .await
        .unwrap();
    assert_eq!(again.summary.version_cookie, "abc123");
    assert_eq!(again.text, "fresher body");
}

#[tokio::test]
async fn unknown_public_id_is_not_found() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let missing = PublicId::parse("00000000-0000-4000-8000-0000000000ff").unwrap();

    assert!(matches!(
        writer.get_text(&missing).await,
        Err(ContentError::NotFound(_))
    ));
    assert!(matches!(
        writer
            .update_text_fields(&missing, &TextPatch::default())
            .await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn contributors_read_back_by_credit_order_then_insertion() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let a = people::create_person(&pool, "A").await.unwrap();
    let b = people::create_person(&pool, "B").await.unwrap();
    let c = people::create_person(&pool, "C").await.unwrap();

    let mut d = draft("docs", "credits");
    d.contributors = vec![
        credit(c.public_id, "reviewer", 2),
        credit(a.public_id, "author", 0),
        credit(b.public_id, "editor", 1),
    ];
    let created = writer.create_text(&d).await.unwrap();
    let names: Vec<&str> = created
        .summary
        .contributors
        .iter()
        .map(|c| c.display_name.as_str())
        .collect();
    assert_eq!(names, ["A", "B", "C"]);

    let tied = writer
        .update_contributors(
            &created.public_id(),
            &[
                credit(c.public_id, "author", 5),
                credit(a.public_id, "author", 5),
                credit(b.public_id, "author", 5),
            ],
        )
        .await
        .unwrap();
    let names: Vec<&str> = tied
        .summary
        .contributors
        .iter()
        .map(|c| c.display_name.as_str())
        .collect();
    assert_eq!(names, ["C", "A", "B"]);
}

#[tokio::test]
async fn updates_can_address_records_by_namespace_and_slug() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let ada = people::create_person(&pool, "Ada").await.unwrap();
    let created = writer.create_text(&draft("docs", "intro")).await.unwrap();

    let patch = TextPatch {
        title: Some("Introduction".to_string()),
        slug: Some("introduction".to_string()),
        ..Default::default()
    };
    let updated = writer
        .update_text_fields_by_slug("docs", "intro", &patch)
        .await
        .unwrap();
    assert_eq!(updated.public_id(), created.public_id());
    assert_eq!(updated.summary.slug, "introduction");
    assert_eq!(updated.summary.last_updated, 2);

    let credited = writer
        .update_contributors_by_slug(
            "docs",
            "introduction",
            &[credit(ada.public_id, "author", 0)],
        )
        .await
        .unwrap();
    assert_eq!(credited.public_id(), created.public_id());
    assert_eq!(credited.summary.contributors[0].display_name, "Ada");
    assert_eq!(credited.summary.last_updated, 3);

    let err = writer
        .update_text_fields_by_slug("docs", "intro", &TextPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::NotFound(_)), "{:?}", err);
    assert!(err.to_string().contains("docs/intro"));
    assert!(matches!(
        writer.update_contributors_by_slug("blog", "introduction", &[]).await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn person_id_does_not_address_content() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());
    let ada = people::create_person(&pool, "Ada").await.unwrap();

    assert!(matches!(
        writer.update_contributors(&ada.public_id, &[]).await,
        Err(ContentError::NotFound(_))
    ));
    assert_eq!(count(&pool, "persons").await, 1);
}

#[tokio::test]
async fn one_repository_file_maps_to_one_record_per_namespace() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());

    let gitlab = |namespace: &str, slug: &str| TextDraft {
        extern_path: Some("articles/a.md".to_string()),
        source_type: SourceType::Gitlab,
        ..draft(namespace, slug)
    };
    writer.create_text(&gitlab("docs", "a")).await.unwrap();

    let err = writer.create_text(&gitlab("docs", "a-copy")).await.unwrap_err();
    assert!(matches!(err, ContentError::Conflict(_)), "{:?}", err);
    assert_eq!(count(&pool, "content_summary").await, 1);

    // Another namespace, or a URL record with the same path, is fine.
    let other = writer.create_text(&gitlab("blog", "a")).await.unwrap();
    let mut url = draft("docs", "a-url");
    url.extern_path = Some("articles/a.md".to_string());
    url.source_type = SourceType::Url;
    writer.create_text(&url).await.unwrap();

    // Moving a record onto a path already imported there conflicts too.
    let patch = TextPatch {
        namespace: Some("docs".to_string()),
        slug: Some("a-moved".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        writer.update_text_fields(&other.public_id(), &patch).await,
        Err(ContentError::Conflict(_))
    ));
    assert_eq!(
        writer.get_text(&other.public_id()).await.unwrap().summary.namespace,
        "blog"
    );
}

#[tokio::test]
async fn clearing_extern_path_does_not_unlock_text_in_same_patch() {
    let (_tmp, pool) = setup_pool().await;
    let writer = ContentWriter::new(pool.clone());

    let mut d = draft("docs", "remote");
    d.extern_path = Some("https://cdn.example.com/remote.md".to_string());
    d.source_type = SourceType::Url;
    let created = writer.create_text(&d).await.unwrap();

    let patch = TextPatch {
        extern_path: Some(String::new()),
        text: Some("local edit".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        writer.update_text_fields(&created.public_id(), &patch).await,
        Err(ContentError::Validation(_))
    ));

    let stored = writer.get_text(&created.public_id()).await.unwrap();
    assert_eq!(
        stored.summary.extern_path.as_deref(),
        Some("https://cdn.example.com/remote.md")
    );
    assert_eq!(stored.text, "");
    assert_eq!(stored.summary.last_updated, 1);

    // Detaching first, then editing, is allowed.
    let detach = TextPatch {
        extern_path: Some(String::new()),
        ..Default::default()
    };
    writer
        .update_text_fields(&created.public_id(), &detach)
        .await
        .unwrap();
    let edited = writer
        .update_text_fields(
            &created.public_id(),
            &TextPatch {
                text: Some("local edit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.text, "local edit");
}

#[tokio::test]
async fn persons_are_looked_up_by_public_id() {
    let (_tmp, pool) = setup_pool().await;
    let service = common::service(
        &pool,
        &common::test_config(None),
        &Arc::new(MockFetcher::default()),
        &Arc::new(MockGitLab::new("h1", &[])),
    );

    let ada = service.create_person("Ada").await.unwrap();
    let found = service.get_person(&ada.public_id).await.unwrap();
    assert_eq!(found.public_id, ada.public_id);
    assert_eq!(found.display_name, "Ada");

    let missing = PublicId::parse("00000000-0000-4000-8000-0000000000aa").unwrap();
    assert!(matches!(
        service.get_person(&missing).await,
        Err(ContentError::NotFound(_))
    ));
}
