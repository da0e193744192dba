//! Profile table tests against `LocalStack`
//!
//! Run with `cargo test -p profile_storage -- --ignored` once `LocalStack` is up.

use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use pretty_assertions::assert_eq;
use profile_storage::profile::{
    ProfileAttribute, ProfileCreateRequest, ProfileStorage, ProfileStorageError,
};
use tokio::time::sleep;
use uuid::Uuid;

const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";
const TEST_REGION: &str = "us-east-1";

/// Test context that drops its table when the test ends
struct TestContext {
    storage: ProfileStorage,
    table_name: String,
    dynamodb_client: Arc<DynamoDbClient>,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let client = self.dynamodb_client.clone();
        let table = self.table_name.clone();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.delete_table().table_name(&table).send().await;
            });
        }
    }
}

async fn setup_test() -> TestContext {
    let table_name = format!("test-profiles-{}", Uuid::new_v4());

    let credentials = Credentials::from_keys("test", "test", None);
    let config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(LOCALSTACK_ENDPOINT)
        .region(Region::new(TEST_REGION))
        .credentials_provider(credentials)
        .load()
        .await;

    let dynamodb_client = Arc::new(DynamoDbClient::new(&config));

    dynamodb_client
        .create_table()
        .table_name(&table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(ProfileAttribute::Id.to_string())
                .key_type(KeyType::Hash)
                .build()
                .expect("Failed to build key schema"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(ProfileAttribute::Id.to_string())
                .attribute_type(ScalarAttributeType::S)
                .build()
                .expect("Failed to build attribute definition"),
        )
        .send()
        .await
        .expect("Failed to create test table");

    sleep(Duration::from_millis(100)).await;

    TestContext {
        storage: ProfileStorage::new(dynamodb_client.clone(), table_name.clone()),
        table_name,
        dynamodb_client,
    }
}

fn create_request(photo_url: Option<&str>) -> ProfileCreateRequest {
    ProfileCreateRequest {
        first_name: "Jakov".to_string(),
        last_name: "Marinović".to_string(),
        birth_year: Some(1888),
        place_of_origin: Some("Brač".to_string()),
        arrival_year: Some(1907),
        photo_url: photo_url.map(ToString::to_string),
    }
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_create_and_get_profile() {
    let ctx = setup_test().await;

    let created = ctx
        .storage
        .create(create_request(Some("https://photos.example/a.jpg")))
        .await
        .expect("Failed to create profile");

    let fetched = ctx
        .storage
        .get_one(&created.id)
        .await
        .expect("Failed to get profile")
        .expect("Profile should exist");

    assert_eq!(fetched, created);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_get_missing_profile_returns_none() {
    let ctx = setup_test().await;

    let fetched = ctx
        .storage
        .get_one(&Uuid::new_v4().to_string())
        .await
        .expect("Failed to get profile");

    assert!(fetched.is_none());
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_update_photo_url_sets_and_removes() {
    let ctx = setup_test().await;
    let created = ctx
        .storage
        .create(create_request(Some("https://photos.example/a.jpg")))
        .await
        .expect("Failed to create profile");

    let updated = ctx
        .storage
        .update_photo_url(&created.id, Some("https://photos.example/b.jpg"))
        .await
        .expect("Failed to update photo");
    assert_eq!(
        updated.photo_url.as_deref(),
        Some("https://photos.example/b.jpg")
    );
    assert_eq!(updated.first_name, created.first_name);

    let cleared = ctx
        .storage
        .update_photo_url(&created.id, None)
        .await
        .expect("Failed to clear photo");
    assert_eq!(cleared.photo_url, None);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_update_photo_url_missing_profile() {
    let ctx = setup_test().await;
    let missing_id = Uuid::new_v4().to_string();

    let result = ctx
        .storage
        .update_photo_url(&missing_id, Some("https://photos.example/b.jpg"))
        .await;

    assert!(matches!(result, Err(ProfileStorageError::ProfileNotFound(id)) if id == missing_id));
    assert!(ctx.storage.get_one(&missing_id).await.unwrap().is_none());
}
