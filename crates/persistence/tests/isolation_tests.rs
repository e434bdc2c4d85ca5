//! Tenant and deployment prefix isolation tests.

mod common;

use serde_json::json;

use formkit_persistence::responses::{CreateResponse, ListOptions};
use formkit_persistence::{MemoryBucket, StorageConfig};

use common::*;

/// Services with different prefixes on one bucket never see each other.
#[tokio::test]
async fn test_path_prefix_isolation() {
    let bucket = MemoryBucket::new();
    let prod = storage_over(bucket.clone(), StorageConfig::new("prod"));
    let staging = storage_over(bucket.clone(), StorageConfig::new("staging"));

    prod.content()
        .put(GUILD, "page-001", &page_html(1), None)
        .await
        .expect("prod put failed");
    prod.content()
        .put(GUILD, "page-001", &page_html(2), None)
        .await
        .expect("prod put failed");

    let first_staging = staging
        .content()
        .put(GUILD, "page-001", &"staging".to_string(), None)
        .await
        .expect("staging put failed");
    assert_eq!(first_staging.version.get(), 1);
    assert_eq!(first_staging.key, format!("staging/content/{GUILD}/page-001/v1.json"));

    assert_eq!(
        prod.content()
            .get_current(GUILD, "page-001")
            .await
            .unwrap()
            .metadata
            .version
            .get(),
        2
    );
    assert_eq!(staging.content().list_entities(GUILD).await.unwrap().len(), 1);

    prod.responses().create(response_input("resp-1")).await.unwrap();
    assert!(
        staging
            .responses()
            .get(GUILD, FORM, "resp-1")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(staging.responses().count(GUILD, FORM, None).await.unwrap(), 0);

    assert_eq!(staging.content().delete_all_versions(GUILD, "page-001").await.unwrap(), 1);
    assert!(prod.content().exists(GUILD, "page-001").await.unwrap());
}

/// Guilds never see each other's records.
#[tokio::test]
async fn test_guild_isolation() {
    let (_bucket, storage) = memory_storage();

    storage
        .schemas()
        .put(GUILD, FORM, &sample_schema(1), None)
        .await
        .unwrap();
    storage
        .responses()
        .create(response_input("resp-1"))
        .await
        .unwrap();
    storage
        .responses()
        .create(CreateResponse::new(OTHER_GUILD, FORM, "resp-9", 1, json!({})))
        .await
        .unwrap();

    assert!(!storage.schemas().exists(OTHER_GUILD, FORM).await.unwrap());
    let page = storage
        .responses()
        .list(OTHER_GUILD, FORM, ListOptions::default())
        .await
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["resp-9"]);
}

/// Content, schemas and responses occupy separate namespaces.
#[tokio::test]
async fn test_namespace_separation() {
    let (bucket, storage) = memory_storage();

    storage
        .content()
        .put(GUILD, FORM, &page_html(1), None)
        .await
        .unwrap();
    storage
        .schemas()
        .put(GUILD, FORM, &sample_schema(1), None)
        .await
        .unwrap();
    storage
        .responses()
        .create(response_input("v1"))
        .await
        .unwrap();

    assert_eq!(
        bucket.keys(),
        vec![
            format!("content/{GUILD}/{FORM}/v1.json"),
            format!("responses/{GUILD}/{FORM}/v1.json"),
            format!("schemas/{GUILD}/{FORM}/v1.json"),
        ]
    );
    assert_eq!(storage.content().list_versions(GUILD, FORM).await.unwrap().len(), 1);
    assert_eq!(storage.schemas().list_versions(GUILD, FORM).await.unwrap().len(), 1);
    assert_eq!(storage.responses().count(GUILD, FORM, None).await.unwrap(), 1);
}
