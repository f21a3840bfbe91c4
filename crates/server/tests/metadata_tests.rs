//! Metadata repository integration tests against SQLite.

mod common;

use common::{TestMetadata, forever, object_keys, seed_container, seed_version, unique_checksum};
use depot_metadata::{ErrorKind, MetadataStore};
use depot_metadata::repos::{
    BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, StatsRepo, VersionRepo,
};
use std::collections::HashSet;
use time::Duration;

#[tokio::test]
async fn test_default_namespace_exists() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    assert_eq!(store.list_namespaces().await.unwrap(), vec!["default"]);

    // Migrating again keeps exactly one default namespace.
    store.migrate().await.unwrap();
    assert_eq!(store.list_namespaces().await.unwrap(), vec!["default"]);
}

#[tokio::test]
async fn test_namespace_lifecycle() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    store.create_namespace("acme").await.unwrap();
    let err = store.create_namespace("acme").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    store.rename_namespace("acme", "globex").await.unwrap();
    assert_eq!(
        store.list_namespaces().await.unwrap(),
        vec!["default", "globex"]
    );

    let err = store.rename_namespace("acme", "other").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.rename_namespace("globex", "default").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    store.delete_namespace("globex").await.unwrap();
    let err = store.delete_namespace("globex").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_namespace_with_containers_conflicts() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "acme", "logs", forever()).await;

    let err = store.delete_namespace("acme").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    store.delete_container("acme", "logs").await.unwrap();
    store.delete_namespace("acme").await.unwrap();
}

#[tokio::test]
async fn test_container_lookups_report_not_found() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let err = store
        .create_container("missing", "logs", forever())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.list_containers("missing").await.unwrap_err();
    assert!(err.is_not_found());

    let err = store.create_version("default", "missing").await.unwrap_err();
    assert!(err.is_not_found());

    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let err = store
        .create_container("default", "logs", forever())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_container_ttl_round_trips() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", Duration::hours(6)).await;

    let containers = store.list_containers("default").await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].versions_ttl, Duration::hours(6));
    assert!(!containers[0].retains_forever());

    store
        .set_container_versions_ttl("default", "logs", forever())
        .await
        .unwrap();
    let containers = store.list_containers("default").await.unwrap();
    assert!(containers[0].retains_forever());
}

#[tokio::test]
async fn test_container_pagination_is_consistent() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    for i in 0..23 {
        seed_container(store.as_ref(), "default", &format!("c{i:02}"), forever()).await;
    }

    let mut seen = Vec::new();
    let mut offset = 0;
    let (first_total, _) = store.list_containers_by_page("default", 0, 5).await.unwrap();
    loop {
        let (total, page) = store
            .list_containers_by_page("default", offset, 5)
            .await
            .unwrap();
        assert_eq!(total, first_total);
        if page.is_empty() {
            break;
        }
        offset += page.len() as u64;
        seen.extend(page.into_iter().map(|c| c.name));
    }

    assert_eq!(first_total, 23);
    assert_eq!(seen.len(), 23);
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 23);
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
}

#[tokio::test]
async fn test_rename_and_move_container() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "acme", "logs", forever()).await;
    seed_container(store.as_ref(), "globex", "taken", forever()).await;
    let version = seed_version(store.as_ref(), "acme", "logs", &["a.txt"], 10).await;

    store
        .rename_container("acme", "logs", "globex", "archive")
        .await
        .unwrap();

    assert!(store.list_containers("acme").await.unwrap().is_empty());
    let names: Vec<_> = store
        .list_containers("globex")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["archive", "taken"]);

    // Versions and objects travel with the container.
    let (total, keys) = store
        .list_objects("globex", "archive", &version, 0, 10)
        .await
        .unwrap();
    assert_eq!((total, keys), (1, vec!["a.txt".to_string()]));
}

#[tokio::test]
async fn test_rename_container_conflict_leaves_state_untouched() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "acme", "logs", forever()).await;
    seed_container(store.as_ref(), "globex", "logs", forever()).await;

    let err = store
        .rename_container("acme", "logs", "globex", "logs")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(store.list_containers("acme").await.unwrap().len(), 1);
    assert_eq!(store.list_containers("globex").await.unwrap().len(), 1);

    let err = store
        .rename_container("acme", "logs", "nowhere", "logs")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.list_containers("acme").await.unwrap()[0].name, "logs");
}

#[tokio::test]
async fn test_version_names_strictly_increase() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;

    let mut created = Vec::new();
    for _ in 0..5 {
        created.push(store.create_version("default", "logs").await.unwrap());
    }

    for name in &created {
        assert_eq!(name.len(), 14);
        assert!(name.chars().all(|c| c.is_ascii_digit()), "bad name {name}");
    }
    for pair in created.windows(2) {
        assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
    }

    let listed: Vec<_> = store
        .list_all_versions_by_container("default", "logs")
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(listed, created);
}

#[tokio::test]
async fn test_publish_is_one_way() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let first = store.create_version("default", "logs").await.unwrap();
    let second = store.create_version("default", "logs").await.unwrap();

    let err = store
        .get_latest_published_version_by_container("default", "logs")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    store
        .mark_version_published("default", "logs", &first)
        .await
        .unwrap();
    // Publishing twice is harmless.
    store
        .mark_version_published("default", "logs", &first)
        .await
        .unwrap();

    let published = store
        .list_published_versions_by_container("default", "logs")
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0].is_published);

    let unpublished = store
        .list_unpublished_versions_by_container("default", "logs")
        .await
        .unwrap();
    assert_eq!(unpublished.len(), 1);
    assert_eq!(unpublished[0].name, second);

    let all = store
        .list_all_versions_by_container("default", "logs")
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert_eq!(
        store
            .get_latest_published_version_by_container("default", "logs")
            .await
            .unwrap(),
        first
    );

    store
        .mark_version_published("default", "logs", &second)
        .await
        .unwrap();
    assert_eq!(
        store
            .get_latest_published_version_by_container("default", "logs")
            .await
            .unwrap(),
        second
    );

    let (total, page) = store
        .list_published_versions_by_container_and_page("default", "logs", 1, 1)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(page[0].name, second);
}

#[tokio::test]
async fn test_objects_require_unpublished_version_and_known_blob() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let version = store.create_version("default", "logs").await.unwrap();

    let err = store
        .create_object("default", "logs", &version, "a.txt", "deadbeef")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unknown blob should be not found");

    store.create_blob("deadbeef", 10, "text/plain").await.unwrap();
    store
        .create_object("default", "logs", &version, "a.txt", "deadbeef")
        .await
        .unwrap();

    store
        .mark_version_published("default", "logs", &version)
        .await
        .unwrap();
    let err = store
        .create_object("default", "logs", &version, "b.txt", "deadbeef")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "published version accepts no new objects");

    assert_eq!(
        store
            .get_blob_key_by_object("default", "logs", &version, "a.txt")
            .await
            .unwrap(),
        "deadbeef"
    );
    let blob = store
        .get_blob_by_object("default", "logs", &version, "a.txt")
        .await
        .unwrap();
    assert_eq!(blob.size, 10);
    assert_eq!(blob.mime_type, "text/plain");
}

#[tokio::test]
async fn test_blob_dedup_and_ensure() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let err = store.ensure_blob_key("deadbeef", 10).await.unwrap_err();
    assert!(err.is_not_found());

    store.create_blob("deadbeef", 10, "text/plain").await.unwrap();
    store.ensure_blob_key("deadbeef", 10).await.unwrap();

    let err = store
        .create_blob("deadbeef", 10, "text/plain")
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Same checksum with another size is a different blob.
    assert!(store.ensure_blob_key("deadbeef", 11).await.is_err());

    seed_container(store.as_ref(), "acme", "a", forever()).await;
    seed_container(store.as_ref(), "acme", "b", forever()).await;
    let va = store.create_version("acme", "a").await.unwrap();
    let vb = store.create_version("acme", "b").await.unwrap();
    store
        .create_object("acme", "a", &va, "x", "deadbeef")
        .await
        .unwrap();
    store
        .create_object("acme", "b", &vb, "y", "deadbeef")
        .await
        .unwrap();

    let stats = store.count_stats().await.unwrap();
    assert_eq!(stats.blobs_count, 1);
    assert_eq!(stats.blobs_effective_size_bytes, 10);
    assert_eq!(stats.total_raw_size_bytes(), 20);
}

#[tokio::test]
async fn test_object_pagination_remap_and_delete() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let version = store.create_version("default", "logs").await.unwrap();
    store.create_blob("aa", 1, "text/plain").await.unwrap();
    store.create_blob("bb", 2, "text/plain").await.unwrap();

    let keys = object_keys(12);
    for key in &keys {
        store
            .create_object("default", "logs", &version, key, "aa")
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut offset = 0;
    loop {
        let (total, page) = store
            .list_objects("default", "logs", &version, offset, 5)
            .await
            .unwrap();
        assert_eq!(total, 12);
        if page.is_empty() {
            break;
        }
        offset += page.len() as u64;
        seen.extend(page);
    }
    assert_eq!(seen, keys);

    // Adding an existing key re-points it.
    store
        .create_object("default", "logs", &version, &keys[0], "bb")
        .await
        .unwrap();
    assert_eq!(
        store
            .get_blob_key_by_object("default", "logs", &version, &keys[0])
            .await
            .unwrap(),
        "bb"
    );

    store
        .remap_object("default", "logs", &version, &keys[1], "bb")
        .await
        .unwrap();
    assert_eq!(
        store
            .get_blob_key_by_object("default", "logs", &version, &keys[1])
            .await
            .unwrap(),
        "bb"
    );
    let err = store
        .remap_object("default", "logs", &version, "missing", "bb")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let err = store
        .remap_object("default", "logs", &version, &keys[1], "cc")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let doomed = vec![keys[0].clone(), keys[1].clone(), "missing".to_string()];
    store
        .delete_object("default", "logs", &version, &doomed)
        .await
        .unwrap();
    let (total, _) = store
        .list_objects("default", "logs", &version, 0, 100)
        .await
        .unwrap();
    assert_eq!(total, 10);
}

#[tokio::test]
async fn test_oversized_blob_sizes_are_rejected() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    let largest = i64::MAX as u64;

    let err = store
        .create_blob("deadbeef", u64::MAX, "text/plain")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(store.count_stats().await.unwrap().blobs_count, 0);

    store
        .create_blob("deadbeef", largest, "text/plain")
        .await
        .unwrap();
    store.ensure_blob_key("deadbeef", largest).await.unwrap();

    // Larger sizes must not alias the stored one.
    let err = store
        .ensure_blob_key("deadbeef", largest + 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(
        store
            .delete_blob_if_orphaned("deadbeef", u64::MAX)
            .await
            .is_err()
    );
    assert!(
        store
            .delete_blob_if_orphaned("deadbeef", largest)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_delete_version_and_container_cascade() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let first = seed_version(store.as_ref(), "default", "logs", &["a", "b"], 5).await;
    let second = seed_version(store.as_ref(), "default", "logs", &["c"], 5).await;

    store
        .delete_version("default", "logs", &first)
        .await
        .unwrap();
    let err = store
        .list_objects("default", "logs", &first, 0, 10)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    store.delete_container("default", "logs").await.unwrap();
    let err = store
        .list_objects("default", "logs", &second, 0, 10)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stats = store.count_stats().await.unwrap();
    assert_eq!(stats.containers_count, 0);
    assert!(stats.versions_count.is_empty());
    assert!(stats.objects_count.is_empty());
    // Blobs outlive their objects until reaped.
    assert_eq!(stats.blobs_count, 3);
}

#[tokio::test]
async fn test_guarded_deletes_spare_published_versions() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let published = seed_version(store.as_ref(), "default", "logs", &["a", "b"], 5).await;
    store
        .mark_version_published("default", "logs", &published)
        .await
        .unwrap();
    let draft = seed_version(store.as_ref(), "default", "logs", &["c", "d"], 5).await;

    let keys = vec!["a".to_string(), "b".to_string()];
    let err = store
        .delete_unpublished_objects("default", "logs", &published, &keys)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let err = store
        .delete_unpublished_version("default", "logs", &published)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        store
            .list_objects("default", "logs", &published, 0, 10)
            .await
            .unwrap()
            .0,
        2
    );

    store
        .delete_unpublished_objects("default", "logs", &draft, &["c".to_string()])
        .await
        .unwrap();
    let (total, remaining) = store
        .list_objects("default", "logs", &draft, 0, 10)
        .await
        .unwrap();
    assert_eq!((total, remaining), (1, vec!["d".to_string()]));

    store
        .delete_unpublished_version("default", "logs", &draft)
        .await
        .unwrap();
    let versions = store
        .list_all_versions_by_container("default", "logs")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].name, published);
}

#[tokio::test]
async fn test_orphan_queries() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "default", "logs", forever()).await;
    let version = seed_version(store.as_ref(), "default", "logs", &["kept"], 5).await;
    let orphan = unique_checksum();
    store.create_blob(&orphan, 7, "text/plain").await.unwrap();

    let later = time::OffsetDateTime::now_utc() + Duration::minutes(1);
    let orphans = store.list_orphaned_blobs(later, 10).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].checksum, orphan);

    let earlier = time::OffsetDateTime::now_utc() - Duration::hours(1);
    assert!(store.list_orphaned_blobs(earlier, 10).await.unwrap().is_empty());

    let kept = store
        .get_blob_key_by_object("default", "logs", &version, "kept")
        .await
        .unwrap();
    assert!(!store.delete_blob_if_orphaned(&kept, 5).await.unwrap());
    assert!(store.delete_blob_if_orphaned(&orphan, 7).await.unwrap());
    assert!(!store.delete_blob_if_orphaned(&orphan, 7).await.unwrap());

    assert_eq!(store.delete_orphaned_object_keys().await.unwrap(), 0);
    store
        .delete_object("default", "logs", &version, &["kept".to_string()])
        .await
        .unwrap();
    assert_eq!(store.delete_orphaned_object_keys().await.unwrap(), 1);
}

#[tokio::test]
async fn test_orphan_cutoff_orders_within_a_second() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    store
        .create_blob(&unique_checksum(), 7, "text/plain")
        .await
        .unwrap();

    let later = time::OffsetDateTime::now_utc() + Duration::minutes(1);
    let created = store.list_orphaned_blobs(later, 10).await.unwrap()[0].created_at;

    // A shorter fraction renders as text that sorts after the stored value.
    let cutoff = created
        .replace_nanosecond(created.nanosecond() / 100_000_000 * 100_000_000)
        .unwrap();
    assert!(store.list_orphaned_blobs(cutoff, 10).await.unwrap().is_empty());
    assert_eq!(
        store
            .list_orphaned_blobs(cutoff + Duration::seconds(1), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_count_stats_breakdown() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    seed_container(store.as_ref(), "acme", "logs", forever()).await;
    let published = seed_version(store.as_ref(), "acme", "logs", &["a", "b"], 10).await;
    store
        .mark_version_published("acme", "logs", &published)
        .await
        .unwrap();
    let draft = seed_version(store.as_ref(), "acme", "logs", &["c"], 4).await;

    let stats = store.count_stats().await.unwrap();
    assert_eq!(stats.namespaces_count, 2);
    assert_eq!(stats.containers_count, 1);
    assert_eq!(stats.blobs_count, 3);
    assert_eq!(stats.blobs_effective_size_bytes, 24);

    let published_versions = stats
        .versions_count
        .iter()
        .find(|r| r.is_published)
        .unwrap();
    assert_eq!(published_versions.count, 1);
    assert_eq!(published_versions.namespace, "acme");

    let draft_objects = stats
        .objects_count
        .iter()
        .find(|r| r.version == draft)
        .unwrap();
    assert_eq!(draft_objects.count, 1);
    assert!(!draft_objects.is_published);

    let published_raw = stats
        .blobs_raw_size_bytes
        .iter()
        .find(|r| r.version == published)
        .unwrap();
    assert_eq!(published_raw.size_bytes, 20);
}
