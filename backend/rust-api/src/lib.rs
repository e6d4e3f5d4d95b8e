use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; connect-src 'self'"),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS for the reporting endpoints consumed by the admin dashboard
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Protected endpoints (require JWT)
        .nest(
            "/api/v1",
            api_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/stats",
            stats_routes()
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<std::sync::Arc<services::AppState>> {
    content_routes()
        .merge(progress_routes())
        .merge(assessment_routes())
        .merge(engagement_routes())
}

fn content_routes() -> Router<std::sync::Arc<services::AppState>> {
    // Roster mutations are instructor-only; the roster itself is readable by
    // any authenticated role.
    let instructor_routes = Router::new()
        .route(
            "/courses/{course_id}/chapters",
            post(handlers::content::create_chapter),
        )
        .route(
            "/courses/{course_id}/chapters/order",
            put(handlers::content::reorder_chapters),
        )
        .route(
            "/chapters/{chapter_id}",
            axum::routing::patch(handlers::content::update_chapter)
                .delete(handlers::content::delete_chapter),
        )
        .route(
            "/chapters/{chapter_id}/items",
            post(handlers::content::create_content_item),
        )
        .route(
            "/chapters/{chapter_id}/items/order",
            put(handlers::content::reorder_content_items),
        )
        .route(
            "/items/{item_id}/move",
            post(handlers::content::move_content_item),
        )
        .route(
            "/items/{item_id}",
            delete(handlers::content::delete_content_item),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::instructor_guard_middleware,
        ));

    Router::new()
        .route(
            "/courses/{course_id}/content",
            get(handlers::content::get_course_content),
        )
        .merge(instructor_routes)
}

fn progress_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/courses/{course_id}/videos/{video_id}/progress",
            post(handlers::progress::record_video_progress)
                .get(handlers::progress::get_video_progress),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/documents/{document_id}/progress",
            post(handlers::progress::track_document_progress),
        )
        .route(
            "/courses/{course_id}/progress",
            get(handlers::progress::get_course_progress),
        )
}

fn assessment_routes() -> Router<std::sync::Arc<services::AppState>> {
    // GET and the mutating verbs share `/assessments/{id}` with different
    // roles, so role enforcement lives in the handlers here instead of a
    // route layer.
    Router::new()
        .route("/assessments", post(handlers::assessments::create_assessment))
        .route(
            "/assessments/{assessment_id}",
            get(handlers::assessments::get_assessment)
                .put(handlers::assessments::update_assessment)
                .patch(handlers::assessments::patch_assessment)
                .delete(handlers::assessments::delete_assessment),
        )
        .route(
            "/assessments/{assessment_id}/questions/order",
            put(handlers::assessments::reorder_questions),
        )
        .route(
            "/assessments/{assessment_id}/attempts",
            post(handlers::assessments::start_attempt)
                .get(handlers::assessments::get_user_attempts),
        )
        .route(
            "/attempts/{attempt_id}/submit",
            post(handlers::assessments::submit_attempt),
        )
}

fn engagement_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/courses/{course_id}/rating",
            post(handlers::engagement::rate_course).get(handlers::engagement::get_course_rating),
        )
        .route(
            "/courses/{course_id}/wishlist",
            post(handlers::engagement::add_to_wishlist)
                .delete(handlers::engagement::remove_from_wishlist),
        )
        .route("/wishlist", get(handlers::engagement::list_wishlist))
        .route(
            "/courses/{course_id}/comments",
            post(handlers::engagement::add_comment).get(handlers::engagement::list_comments),
        )
        .route(
            "/comments/{comment_id}",
            delete(handlers::engagement::delete_comment),
        )
}

fn stats_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/courses/{course_id}",
            get(handlers::reporting::get_course_overview),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::instructor_guard_middleware,
        ))
}
