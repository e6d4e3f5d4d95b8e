mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use serial_test::serial;
use tower::ServiceExt;
use uuid::Uuid;

use lms_api::config::Config;

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", token);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_video_item(
    app: &Router,
    config: &Config,
    course_id: &str,
    length_seconds: f64,
) -> (String, String) {
    let instructor = common::bearer_token(config, "instructor-1", "instructor");

    let (status, chapter) = send(
        app,
        "POST",
        &format!("/api/v1/courses/{}/chapters", course_id),
        &instructor,
        Some(json!({ "title": "Chapter 1", "description": "Basics" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let chapter_id = chapter["id"].as_str().unwrap().to_string();

    let (status, item) = send(
        app,
        "POST",
        &format!("/api/v1/chapters/{}/items", chapter_id),
        &instructor,
        Some(json!({
            "payload": {
                "content_type": "video",
                "title": "Intro",
                "url": "videos/intro.mp4",
                "length_seconds": length_seconds
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (chapter_id, item["id"].as_str().unwrap().to_string())
}

#[tokio::test]
#[serial]
async fn video_progress_computes_percent_and_course_aggregate() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let user_id = format!("learner-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, &user_id, "learner");

    let (_, video_id) = create_video_item(&app, &config, &course_id, 120.0).await;

    let uri = format!("/api/v1/courses/{}/videos/{}/progress", course_id, video_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_time": 30 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["progress_percent"], 25.0);
    assert_eq!(body["progress"]["completed"], false);
    assert_eq!(body["course_progress"], 25);

    // Watching to the end completes the video and the single-item course.
    let (_, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_time": 120 })),
    )
    .await;
    assert_eq!(body["progress"]["progress_percent"], 100.0);
    assert_eq!(body["progress"]["completed"], true);
    assert_eq!(body["course_progress"], 100);

    // A stale, smaller position never regresses the stored percent.
    let (_, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_time": 10 })),
    )
    .await;
    assert_eq!(body["progress"]["progress_percent"], 100.0);
    assert_eq!(body["progress"]["completed"], true);
}

#[tokio::test]
#[serial]
async fn malformed_numeric_input_coerces_instead_of_failing() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let user_id = format!("learner-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, &user_id, "learner");

    let (_, video_id) = create_video_item(&app, &config, &course_id, 100.0).await;

    let uri = format!("/api/v1/courses/{}/videos/{}/progress", course_id, video_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_time": "not a number" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["current_time"], 0.0);
    assert_eq!(body["progress"]["progress_percent"], 0.0);
}

#[tokio::test]
#[serial]
async fn progress_for_another_user_is_forbidden() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, "learner-a", "learner");

    let (_, video_id) = create_video_item(&app, &config, &course_id, 100.0).await;

    let uri = format!("/api/v1/courses/{}/videos/{}/progress", course_id, video_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": "learner-b", "current_time": 10 })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
#[serial]
async fn document_progress_tracks_pages_and_accumulates_time() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let user_id = format!("learner-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, &user_id, "learner");
    let instructor = common::bearer_token(&config, "instructor-1", "instructor");

    let (_, chapter) = send(
        &app,
        "POST",
        &format!("/api/v1/courses/{}/chapters", course_id),
        &instructor,
        Some(json!({ "title": "Reading", "description": "" })),
    )
    .await;
    let chapter_id = chapter["id"].as_str().unwrap().to_string();

    let (status, item) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/{}/items", chapter_id),
        &instructor,
        Some(json!({
            "payload": {
                "content_type": "document",
                "title": "Handbook",
                "url": "docs/handbook.pdf",
                "total_pages": 10
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let document_id = item["id"].as_str().unwrap().to_string();

    let uri = format!(
        "/api/v1/courses/{}/chapters/{}/documents/{}/progress",
        course_id, chapter_id, document_id
    );

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_page": 5, "total_pages": 10, "time_spent": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["progress_percent"], 50.0);
    assert_eq!(body["progress"]["completed"], false);
    assert_eq!(body["progress"]["time_spent"], 60.0);

    let (_, body) = send(
        &app,
        "POST",
        &uri,
        &learner,
        Some(json!({ "user_id": user_id, "current_page": 10, "total_pages": 10, "time_spent": 30 })),
    )
    .await;
    assert_eq!(body["progress"]["progress_percent"], 100.0);
    assert_eq!(body["progress"]["completed"], true);
    // time accumulates across pings instead of being overwritten
    assert_eq!(body["progress"]["time_spent"], 90.0);
    assert_eq!(body["course_progress"], 100);
}

#[tokio::test]
#[serial]
async fn course_progress_is_zero_without_content() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let user_id = format!("learner-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, &user_id, "learner");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/courses/{}/progress?user_id={}", course_id, user_id),
        &learner,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["course_progress"], 0);
    assert_eq!(body["items_total"], 0);
}

#[tokio::test]
#[serial]
async fn absent_video_progress_returns_zero_default() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let user_id = format!("learner-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, &user_id, "learner");

    let (_, video_id) = create_video_item(&app, &config, &course_id, 100.0).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!(
            "/api/v1/courses/{}/videos/{}/progress?user_id={}",
            course_id, video_id, user_id
        ),
        &learner,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["current_time"], 0.0);
    assert_eq!(body["progress"]["progress_percent"], 0.0);
    assert_eq!(body["progress"]["completed"], false);
}

#[tokio::test]
#[serial]
async fn chapter_reorder_assigns_positions_from_input_order() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let instructor = common::bearer_token(&config, "instructor-1", "instructor");

    let mut ids = Vec::new();
    for title in ["A", "B", "C"] {
        let (_, chapter) = send(
            &app,
            "POST",
            &format!("/api/v1/courses/{}/chapters", course_id),
            &instructor,
            Some(json!({ "title": title, "description": "" })),
        )
        .await;
        ids.push(chapter["id"].as_str().unwrap().to_string());
    }

    let (status, chapters) = send(
        &app,
        "PUT",
        &format!("/api/v1/courses/{}/chapters/order", course_id),
        &instructor,
        Some(json!({ "ordered_ids": [ids[2], ids[0], ids[1]] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = chapters
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["C", "A", "B"]);

    // one unknown id fails the whole batch
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/courses/{}/chapters/order", course_id),
        &instructor,
        Some(json!({ "ordered_ids": [ids[0], "65f2ab9e4c1d2b0012345678"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn roster_mutations_require_instructor_role() {
    let Some((app, config)) = common::create_test_app().await else {
        return;
    };

    let course_id = format!("course-{}", Uuid::new_v4());
    let learner = common::bearer_token(&config, "learner-1", "learner");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/courses/{}/chapters", course_id),
        &learner,
        Some(json!({ "title": "Nope", "description": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
