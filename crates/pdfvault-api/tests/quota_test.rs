//! Quota endpoints and the payment collaborator's quota-increase hook.

mod helpers;

use helpers::*;
use http::StatusCode;
use uuid::Uuid;

#[tokio::test]
async fn quota_is_created_on_first_read_with_defaults() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let (name, value) = user_header(user_id);
    let response = app
        .server
        .get(&api_path("/quota"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();

    assert_eq!(body["used_storage_bytes"], 0);
    assert_eq!(
        body["max_storage_bytes"].as_i64().unwrap(),
        app.state.config.default_max_storage_bytes
    );
    assert_eq!(body["usage_percent"], 0.0);
    assert_eq!(body["is_premium"], false);
}

#[tokio::test]
async fn add_storage_raises_the_cap() {
    let Some(app) = setup_test_app_with(|config| {
        config.default_max_storage_bytes = 1_000;
    })
    .await
    else {
        return;
    };
    let user_id = Uuid::new_v4();

    // Purchase settles through the payment collaborator, which calls this hook.
    let quota = app.state.quota.add_storage(user_id, 5_000).await.unwrap();
    assert_eq!(quota.max_storage_bytes, 6_000);

    // A previously over-quota upload now fits.
    let data = pdf_payload(2_000);
    let response = post_begin(&app, user_id, "now-it-fits.pdf", &data, false).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn add_storage_rejects_non_positive_amounts() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    assert!(app.state.quota.add_storage(user_id, 0).await.is_err());
    assert!(app.state.quota.add_storage(user_id, -10).await.is_err());
}

#[tokio::test]
async fn quota_filled_between_admission_and_completion_fails_the_late_upload() {
    let Some(app) = setup_test_app_with(|config| {
        config.default_max_storage_bytes = 2_500;
    })
    .await
    else {
        return;
    };
    let user_id = Uuid::new_v4();

    // The chunked upload passes the advisory check while nothing is charged.
    let big = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let response = post_begin(&app, user_id, "big.pdf", &big, false).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let big_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    // A direct upload completes in the meantime and consumes the headroom.
    let small = pdf_payload(600);
    let response = post_begin(&app, user_id, "small.pdf", &small, true).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    let small_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    wait_for_status(&app, user_id, small_id, "completed").await;

    // Finishing the chunked upload now overshoots; the binding check at
    // completion fails it instead of letting usage exceed the cap.
    for (i, chunk) in split_chunks(&big).iter().enumerate() {
        let response = post_chunk(
            &app,
            user_id,
            big_id,
            (i + 1) as i32,
            chunk,
            &pdfvault_core::sha256_hex(chunk),
        )
        .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }
    let detail = wait_for_status(&app, user_id, big_id, "failed").await;
    let message = detail["upload"]["error_message"].as_str().unwrap();
    assert!(message.contains("quota"), "got: {message}");

    // Only the small upload was ever charged.
    assert_eq!(used_storage(&app, user_id).await, 600);
}

#[tokio::test]
async fn upload_stats_count_by_status() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    // One completed direct upload.
    let completed = pdf_payload(512);
    let response = post_begin(&app, user_id, "done.pdf", &completed, true).await;
    let body: serde_json::Value = response.json();
    let completed_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    wait_for_status(&app, user_id, completed_id, "completed").await;

    // One still-uploading chunked upload.
    let pending = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let response = post_begin(&app, user_id, "pending.pdf", &pending, false).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    // One failed direct upload: payload that is not a PDF at all.
    let mut broken = pdf_payload(512);
    broken[..4].copy_from_slice(b"NOPE");
    let response = post_begin(&app, user_id, "broken.pdf", &broken, true).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    let failed_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    wait_for_status(&app, user_id, failed_id, "failed").await;

    let (name, value) = user_header(user_id);
    let response = app
        .server
        .get(&api_path("/quota/stats"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let stats: serde_json::Value = response.json();

    assert_eq!(stats["total_uploads"], 3);
    assert_eq!(stats["completed_uploads"], 1);
    assert_eq!(stats["failed_uploads"], 1);
    assert_eq!(stats["in_progress_uploads"], 1);
    assert_eq!(stats["completed_size_bytes"].as_i64().unwrap(), 512);

    // Only the completed upload was charged.
    assert_eq!(used_storage(&app, user_id).await, 512);
}
