//! Direct (single-shot) upload tests: storage, processing, duplicate
//! detection, quota gating, and deletion semantics.

mod helpers;

use helpers::*;
use http::StatusCode;
use pdfvault_core::sha256_hex;
use pdfvault_storage::Storage;
use uuid::Uuid;

#[tokio::test]
async fn direct_upload_completes_and_charges_quota() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload(512);
    let response = post_begin(&app, user_id, "small.pdf", &data, true).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["upload"]["is_chunked"], false);
    assert_eq!(body["upload"]["total_chunks"], 1);
    assert!(body["chunk_size_bytes"].is_null());
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    let detail = wait_for_status(&app, user_id, upload_id, "completed").await;
    assert!(detail["upload"]["completed_at"].is_string());
    assert!(detail["chunks"].as_array().unwrap().is_empty());

    let key = stored_key(&app, upload_id).await;
    assert_eq!(app.state.storage.get(&key).await.unwrap(), data);
    assert_eq!(used_storage(&app, user_id).await, data.len() as i64);
}

#[tokio::test]
async fn duplicate_content_is_rejected_with_conflict() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload(512);
    let first = post_begin(&app, user_id, "original.pdf", &data, true).await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = first.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    wait_for_status(&app, user_id, upload_id, "completed").await;

    let second = post_begin(&app, user_id, "copy-of-original.pdf", &data, true).await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    let error: serde_json::Value = second.json();
    assert_eq!(error["code"], "DUPLICATE_UPLOAD");

    // A different user uploading the same content is not a duplicate.
    let other_user = Uuid::new_v4();
    let third = post_begin(&app, other_user, "original.pdf", &data, true).await;
    assert_eq!(third.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn upload_over_quota_is_rejected_before_any_state_exists() {
    let Some(app) = setup_test_app_with(|config| {
        config.default_max_storage_bytes = 400;
    })
    .await
    else {
        return;
    };
    let user_id = Uuid::new_v4();

    let data = pdf_payload(512);
    let response = post_begin(&app, user_id, "too-big-for-quota.pdf", &data, true).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let error: serde_json::Value = response.json();
    assert_eq!(error["code"], "QUOTA_EXCEEDED");

    // No upload row, no bytes, no charge.
    let (name, value) = user_header(user_id);
    let listing = app
        .server
        .get(&api_path("/uploads"))
        .add_header(name, value)
        .await;
    let listing: serde_json::Value = listing.json();
    assert_eq!(listing["total"], 0);
    assert_eq!(used_storage(&app, user_id).await, 0);
}

#[tokio::test]
async fn direct_payload_hash_mismatch_is_rejected_without_a_row() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload(512);
    let response = post_begin_declaring(
        &app,
        user_id,
        "lying.pdf",
        data.len(),
        &sha256_hex(b"different bytes"),
        Some(data),
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: serde_json::Value = response.json();
    assert_eq!(error["code"], "INTEGRITY_MISMATCH");

    let (name, value) = user_header(user_id);
    let listing = app
        .server
        .get(&api_path("/uploads"))
        .add_header(name, value)
        .await;
    let listing: serde_json::Value = listing.json();
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn deleting_a_completed_upload_releases_quota_and_artifact() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload(512);
    let response = post_begin(&app, user_id, "deleted-later.pdf", &data, true).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    wait_for_status(&app, user_id, upload_id, "completed").await;
    assert_eq!(used_storage(&app, user_id).await, data.len() as i64);
    let key = stored_key(&app, upload_id).await;

    let (name, value) = user_header(user_id);
    let response = app
        .server
        .delete(&api_path(&format!("/uploads/{upload_id}")))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    assert_eq!(used_storage(&app, user_id).await, 0);
    assert!(!app.state.storage.exists(&key).await.unwrap());

    let response = app
        .server
        .get(&api_path(&format!("/uploads/{upload_id}")))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_unfinished_upload_does_not_touch_quota() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    // Chunked upload that never finishes: still `uploading` when deleted.
    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let response = post_begin(&app, user_id, "abandoned.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    let chunks = split_chunks(&data);
    post_chunk(
        &app,
        user_id,
        upload_id,
        1,
        &chunks[0],
        &sha256_hex(&chunks[0]),
    )
    .await;

    let (name, value) = user_header(user_id);
    let response = app
        .server
        .delete(&api_path(&format!("/uploads/{upload_id}")))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    assert_eq!(used_storage(&app, user_id).await, 0);
}

#[tokio::test]
async fn listing_is_scoped_to_the_acting_user() {
    let Some(app) = setup_test_app().await else { return };
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let data = pdf_payload(512);
    post_begin(&app, alice, "alice.pdf", &data, true).await;

    let (name, value) = user_header(bob);
    let listing = app
        .server
        .get(&api_path("/uploads"))
        .add_header(name, value)
        .await;
    let listing: serde_json::Value = listing.json();
    assert_eq!(listing["total"], 0);

    let (name, value) = user_header(alice);
    let listing = app
        .server
        .get(&api_path("/uploads"))
        .add_header(name, value)
        .await;
    let listing: serde_json::Value = listing.json();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["uploads"][0]["original_filename"], "alice.pdf");
}

#[tokio::test]
async fn requests_without_a_user_context_are_unauthorized() {
    let Some(app) = setup_test_app().await else { return };

    let response = app.server.get(&api_path("/uploads")).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = app.server.get(&api_path("/quota")).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
