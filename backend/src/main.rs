use std::sync::Arc;
use std::time::Duration;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use heritage_backend::{
    media_storage::MediaStorage, photo_session::EditSessionRegistry,
    profile_repository::ProfileRepository, server, signed_urls::SignedUrlCache,
    types::Environment,
};
use profile_storage::profile::ProfileStorage;
use tokio::time::interval;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, EnvFilter};

/// Upper bound on the time between idle session sweeps
const SWEEP_PERIOD_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(environment.tracing_level()).into())
        .from_env_lossy();

    // Use JSON format for staging/production (Datadog), regular format for development
    match environment {
        Environment::Production | Environment::Staging => {
            fmt().json().with_env_filter(env_filter).init();
        }
        Environment::Development { .. } => {
            fmt().with_env_filter(env_filter).init();
        }
    }

    let s3_client = Arc::new(S3Client::from_conf(environment.s3_client_config().await));
    let media_storage = Arc::new(MediaStorage::new(
        s3_client,
        environment.s3_bucket(),
        &environment.photo_public_base_url(),
        environment.signed_url_expiry_secs(),
    ));

    let aws_config = environment.aws_config().await;
    let dynamodb_client = Arc::new(DynamoDbClient::new(&aws_config));
    let profiles: Arc<dyn ProfileRepository> = Arc::new(ProfileStorage::new(
        dynamodb_client,
        environment.profiles_table_name(),
    ));

    let photo_sessions = Arc::new(EditSessionRegistry::new(
        media_storage.clone(),
        profiles.clone(),
        environment.max_photo_bytes(),
    ));

    spawn_idle_session_sweeper(photo_sessions.clone(), environment.edit_session_idle_secs());

    #[allow(clippy::cast_possible_wrap)]
    let refresh_margin =
        chrono::Duration::seconds(environment.signed_url_refresh_margin_secs() as i64);
    let signed_urls = Arc::new(SignedUrlCache::new(
        media_storage,
        environment.signed_url_cache_capacity(),
        refresh_margin,
    ));

    server::start(environment, photo_sessions, profiles, signed_urls).await
}

/// Periodically cancels edit sessions nobody touched for `idle_secs`
fn spawn_idle_session_sweeper(sessions: Arc<EditSessionRegistry>, idle_secs: u64) {
    #[allow(clippy::cast_possible_wrap)]
    let max_idle = chrono::Duration::seconds(idle_secs as i64);
    let period = Duration::from_secs((idle_secs / 4).clamp(1, SWEEP_PERIOD_SECS));

    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let cancelled = sessions.cancel_idle(chrono::Utc::now(), max_idle).await;
            if cancelled > 0 {
                info!("Cancelled {} idle photo edit sessions", cancelled);
            }
        }
    });
}
