use std::sync::Arc;

use aide::openapi::OpenApi;
use axum::{extract::DefaultBodyLimit, Extension};
use datadog_tracing::axum::{shutdown_signal, OtelAxumLayer, OtelInResponseLayer};
use tokio::net::TcpListener;

use crate::routes;
use crate::{
    photo_session::EditSessionRegistry, profile_repository::ProfileRepository,
    signed_urls::SignedUrlCache, types::Environment,
};

/// Room left in a request body for the JSON envelope around a photo
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

/// Largest request body accepted for a photo of `max_photo_bytes`
///
/// Photos travel base64-encoded, which grows them by a third.
#[must_use]
pub const fn body_limit(max_photo_bytes: usize) -> usize {
    max_photo_bytes.div_ceil(3) * 4 + BODY_ENVELOPE_BYTES
}

/// Starts the server with the given environment and dependencies
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the port
pub async fn start(
    environment: Environment,
    photo_sessions: Arc<EditSessionRegistry>,
    profiles: Arc<dyn ProfileRepository>,
    signed_urls: Arc<SignedUrlCache>,
) -> anyhow::Result<()> {
    let mut openapi = OpenApi::default();
    let max_body_bytes = body_limit(environment.max_photo_bytes());

    let router = routes::handler()
        .finish_api(&mut openapi)
        .layer(Extension(openapi))
        .layer(Extension(environment))
        .layer(Extension(photo_sessions))
        .layer(Extension(profiles))
        .layer(Extension(signed_urls))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        // Include trace context as header into the response
        .layer(OtelInResponseLayer)
        // Start OpenTelemetry trace on incoming request
        .layer(OtelAxumLayer::default())
        .layer(tower_http::timeout::TimeoutLayer::new(
            std::time::Duration::from_secs(30),
        ));

    let addr = std::net::SocketAddr::from((
        [0, 0, 0, 0],
        std::env::var("PORT").map_or(Ok(8001), |p| p.parse())?,
    ));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🔄 Heritage Directory Backend started on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(anyhow::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_fits_encoded_photo() {
        assert_eq!(body_limit(3), 4 + BODY_ENVELOPE_BYTES);
        assert_eq!(body_limit(4), 8 + BODY_ENVELOPE_BYTES);
        assert!(body_limit(5 * 1024 * 1024) > 5 * 1024 * 1024 * 4 / 3);
    }
}
