use axum::Router;
use std::sync::Arc;

use lms_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::AppState,
};

/// Builds the app against the databases named in the environment. Returns
/// `None` (test skips) when no test database is configured, so the suite can
/// run on machines without local Mongo/Redis.
pub async fn create_test_app() -> Option<(Router, Config)> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    dotenvy::from_filename(".env.test").ok();

    if std::env::var("MONGO_URI").is_err() {
        eprintln!("MONGO_URI not set; skipping integration test");
        return None;
    }

    let config = Config::load().expect("Failed to load test configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");

    let app_state = Arc::new(
        AppState::new(config.clone(), mongo_client, redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    Some((create_router(app_state), config))
}

pub fn bearer_token(config: &Config, user_id: &str, role: &str) -> String {
    let service = JwtService::new(&config.jwt_secret);
    let claims = JwtClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        iat: chrono::Utc::now().timestamp() as usize,
    };
    format!("Bearer {}", service.generate_token(claims).unwrap())
}
