mod common;

use axum::http::StatusCode;
use common::*;
use heritage_backend::media_storage::mock::{InMemoryPhotoStore, MOCK_BASE_URL};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let setup = TestSetup::new();

    let response = setup.send_get_request("/health").await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = setup.parse_response_body(response).await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["semver"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_get_profile() {
    let setup = TestSetup::new();
    setup.profiles.insert("p1", Some("mem://photos/profile-photos/a.jpg"));

    let response = setup.send_get_request("/v1/profiles/p1").await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = setup.parse_response_body(response).await.unwrap();
    assert_eq!(
        body,
        json!({
            "id": "p1",
            "firstName": "Marija",
            "lastName": "Novak",
            "birthYear": 1894,
            "placeOfOrigin": "Dalmatia",
            "arrivalYear": 1912,
            "photoUrl": "mem://photos/profile-photos/a.jpg",
            "updatedAt": 1_700_000_000,
        })
    );
}

#[tokio::test]
async fn test_get_missing_profile() {
    let setup = TestSetup::new();

    let response = setup.send_get_request("/v1/profiles/nobody").await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = setup.parse_response_body(response).await.unwrap();
    assert_eq!(body["allowRetry"], false);
    assert_eq!(body["error"]["code"], "profile_not_found");
}

#[tokio::test]
async fn test_photo_url_is_cached() {
    let setup = TestSetup::new();
    let reference = format!("{MOCK_BASE_URL}/profile-photos/a.jpg");
    setup.profiles.insert("p1", Some(reference.as_str()));

    let response = setup.send_get_request("/v1/profiles/p1/photo-url").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = setup.parse_response_body(response).await.unwrap();
    assert_eq!(
        first["url"],
        "https://signed.test/profile-photos/a.jpg?sig=1"
    );
    assert_eq!(first["expiresAt"], "2026-03-01T13:00:00+00:00");

    let response = setup.send_get_request("/v1/profiles/p1/photo-url").await.unwrap();
    let second = setup.parse_response_body(response).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(setup.signer.calls(), 1);
}

#[tokio::test]
async fn test_photo_url_without_photo() {
    let setup = TestSetup::new();
    setup.profiles.insert("p1", None);

    let response = setup.send_get_request("/v1/profiles/p1/photo-url").await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = setup.parse_response_body(response).await.unwrap();
    assert_eq!(body["error"]["code"], "no_photo");
    assert_eq!(setup.signer.calls(), 0);
}

#[tokio::test]
async fn test_save_drops_cached_url_of_replaced_photo() {
    let original = format!("{MOCK_BASE_URL}/profile-photos/a.jpg");
    let setup = TestSetup::with_store(
        InMemoryPhotoStore::new().with_references([format!("{MOCK_BASE_URL}/profile-photos/b.jpg")]),
    );
    setup.profiles.insert("p1", Some(original.as_str()));

    setup.send_get_request("/v1/profiles/p1/photo-url").await.unwrap();
    assert_eq!(setup.signed_urls.len(), 1);

    let session = "/v1/profiles/p1/edit-session";
    setup.send_post_request(session, json!({})).await.unwrap();
    setup
        .send_post_request(&format!("{session}/photo"), png_payload())
        .await
        .unwrap();
    let response = setup
        .send_post_request(&format!("{session}/save"), json!({}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(setup.signed_urls.is_empty());

    let response = setup.send_get_request("/v1/profiles/p1/photo-url").await.unwrap();
    let body = setup.parse_response_body(response).await.unwrap();
    assert_eq!(
        body["url"],
        "https://signed.test/profile-photos/b.jpg?sig=2"
    );
}
