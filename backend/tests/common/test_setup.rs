use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Extension, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use heritage_backend::{
    media_storage::mock::{CountingUrlSigner, InMemoryPhotoStore},
    photo_session::EditSessionRegistry,
    profile_repository::{mock::InMemoryProfileRepository, ProfileRepository},
    routes,
    signed_urls::SignedUrlCache,
    types::Environment,
};
use tower::ServiceExt;

/// Upload limit used by the test router
pub const TEST_MAX_PHOTO_BYTES: usize = 1024;

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    // Initialize tracing for tests
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

/// Fixed clock for the URL signer
pub fn signer_clock() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Router wired to in-memory storage
pub struct TestSetup {
    pub router: Router,
    pub photo_store: Arc<InMemoryPhotoStore>,
    pub profiles: Arc<InMemoryProfileRepository>,
    pub signer: Arc<CountingUrlSigner>,
    pub signed_urls: Arc<SignedUrlCache>,
    pub sessions: Arc<EditSessionRegistry>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_store(InMemoryPhotoStore::new())
    }

    pub fn with_store(photo_store: InMemoryPhotoStore) -> Self {
        Self::with_collaborators(photo_store, InMemoryProfileRepository::new())
    }

    pub fn with_collaborators(
        photo_store: InMemoryPhotoStore,
        profiles: InMemoryProfileRepository,
    ) -> Self {
        setup_test_env();

        let environment = Environment::Development {
            signed_url_expiry_override: None,
        };

        let photo_store = Arc::new(photo_store);
        let profiles = Arc::new(profiles);
        let signer = Arc::new(CountingUrlSigner::new(
            Duration::minutes(60),
            signer_clock(),
        ));

        let profile_repository: Arc<dyn ProfileRepository> = profiles.clone();
        let sessions = Arc::new(EditSessionRegistry::new(
            photo_store.clone(),
            profile_repository.clone(),
            TEST_MAX_PHOTO_BYTES,
        ));
        let signed_urls = Arc::new(SignedUrlCache::new(
            signer.clone(),
            16,
            Duration::minutes(5),
        ));

        let router = routes::handler()
            .layer(Extension(environment))
            .layer(Extension(sessions.clone()))
            .layer(Extension(profile_repository))
            .layer(Extension(signed_urls.clone()))
            .into();

        Self {
            router,
            photo_store,
            profiles,
            signer,
            signed_urls,
            sessions,
        }
    }

    pub async fn send_request(
        &self,
        method: &str,
        route: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let builder = Request::builder().uri(route).method(method);
        let request = match payload {
            Some(payload) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn send_post_request(
        &self,
        route: &str,
        payload: serde_json::Value,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        self.send_request("POST", route, Some(payload)).await
    }

    pub async fn send_get_request(
        &self,
        route: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        self.send_request("GET", route, None).await
    }

    pub async fn send_delete_request(
        &self,
        route: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        self.send_request("DELETE", route, None).await
    }

    pub async fn parse_response_body(
        &self,
        response: Response,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        use http_body_util::BodyExt;

        let body = response.into_body().collect().await?.to_bytes();
        let json = serde_json::from_slice(&body)?;
        Ok(json)
    }
}

/// JSON body of a photo upload
pub fn photo_payload(file_name: &str, content_type: &str, bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "fileName": file_name,
        "contentType": content_type,
        "contentBase64": STANDARD.encode(bytes),
    })
}

/// A small PNG upload body
pub fn png_payload() -> serde_json::Value {
    photo_payload("portrait.png", "image/png", &[0x89, b'P', b'N', b'G', 1, 2, 3, 4])
}
