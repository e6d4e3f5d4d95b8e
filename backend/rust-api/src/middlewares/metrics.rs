use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency for every HTTP request.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Replaces dynamic path segments (ObjectIds, numeric ids) with placeholders
/// to keep label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_object_id_like(segment) || is_numeric_id(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_object_id_like(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_object_ids() {
        assert_eq!(
            normalize_path("/api/v1/assessments/65f2ab9e4c1d2b0012345678/attempts"),
            "/api/v1/assessments/{id}/attempts"
        );
        assert_eq!(normalize_path("/api/v1/courses/42/content"), "/api/v1/courses/{id}/content");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn object_id_detection() {
        assert!(is_object_id_like("65f2ab9e4c1d2b0012345678"));
        assert!(!is_object_id_like("not-an-id"));
        assert!(!is_object_id_like("65f2ab9e"));
    }
}
