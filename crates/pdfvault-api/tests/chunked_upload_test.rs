//! End-to-end chunked upload pipeline tests: out-of-order arrival,
//! duplicate and corrupt chunk rejection, reassembly verification failures,
//! and single-charge accounting.

mod helpers;

use helpers::*;
use http::StatusCode;
use pdfvault_core::sha256_hex;
use pdfvault_storage::Storage;
use sqlx::Row;
use uuid::Uuid;

#[tokio::test]
async fn chunked_upload_out_of_order_completes_and_charges_once() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    // 2.5 chunks worth of data => 3 chunks, last one short.
    let data = pdf_payload((TEST_CHUNK_SIZE * 2 + TEST_CHUNK_SIZE / 2) as usize);
    let chunks = split_chunks(&data);
    assert_eq!(chunks.len(), 3);

    let response = post_begin(&app, user_id, "big-report.pdf", &data, false).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["upload"]["status"], "uploading");
    assert_eq!(body["upload"]["total_chunks"], 3);
    assert_eq!(body["chunk_size_bytes"], TEST_CHUNK_SIZE);
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    // Out-of-order arrival: 2, 1, 3.
    for chunk_number in [2, 1, 3] {
        let chunk = &chunks[chunk_number as usize - 1];
        let response = post_chunk(
            &app,
            user_id,
            upload_id,
            chunk_number,
            chunk,
            &sha256_hex(chunk),
        )
        .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let detail = wait_for_status(&app, user_id, upload_id, "completed").await;
    assert_eq!(detail["upload"]["uploaded_chunks"], 3);
    assert_eq!(detail["upload"]["progress"], 100.0);

    // The final artifact is byte-for-byte the chunk concatenation.
    let key = stored_key(&app, upload_id).await;
    let artifact = app.state.storage.get(&key).await.unwrap();
    assert_eq!(artifact, data);

    // Chunk staging is gone and every chunk row is processed.
    let rows = sqlx::query("SELECT status::text AS status, stored_key FROM upload_chunks WHERE upload_id = $1")
        .bind(upload_id)
        .fetch_all(&app.pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.get::<String, _>("status"), "processed");
        assert!(!app
            .state
            .storage
            .exists(&row.get::<String, _>("stored_key"))
            .await
            .unwrap());
    }

    // Charged exactly once, for exactly the file size.
    assert_eq!(used_storage(&app, user_id).await, data.len() as i64);
}

#[tokio::test]
async fn duplicate_chunk_is_rejected_and_only_one_row_exists() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 3) as usize);
    let chunks = split_chunks(&data);

    let response = post_begin(&app, user_id, "dup-chunk.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    let hash = sha256_hex(&chunks[0]);
    let first = post_chunk(&app, user_id, upload_id, 1, &chunks[0], &hash).await;
    assert_eq!(first.status_code(), StatusCode::CREATED);

    let second = post_chunk(&app, user_id, upload_id, 1, &chunks[0], &hash).await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    let error: serde_json::Value = second.json();
    assert_eq!(error["code"], "DUPLICATE_CHUNK");

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM upload_chunks WHERE upload_id = $1 AND chunk_number = 1",
    )
    .bind(upload_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(row.get::<i64, _>("count"), 1);

    // The duplicate did not inflate the progress counter.
    let detail = app
        .server
        .get(&api_path(&format!("/uploads/{upload_id}")))
        .add_header(user_header(user_id).0, user_header(user_id).1)
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["upload"]["uploaded_chunks"], 1);
}

#[tokio::test]
async fn corrupt_chunk_is_rejected_before_any_state_is_written() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let chunks = split_chunks(&data);

    let response = post_begin(&app, user_id, "corrupt-chunk.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    // Declared hash belongs to different bytes.
    let wrong_hash = sha256_hex(b"something else entirely");
    let response = post_chunk(&app, user_id, upload_id, 1, &chunks[0], &wrong_hash).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: serde_json::Value = response.json();
    assert_eq!(error["code"], "INTEGRITY_MISMATCH");

    let row = sqlx::query("SELECT COUNT(*) AS count FROM upload_chunks WHERE upload_id = $1")
        .bind(upload_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("count"), 0);

    let detail = app
        .server
        .get(&api_path(&format!("/uploads/{upload_id}")))
        .add_header(user_header(user_id).0, user_header(user_id).1)
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["upload"]["uploaded_chunks"], 0);
}

#[tokio::test]
async fn chunk_number_out_of_range_is_rejected() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let chunks = split_chunks(&data);

    let response = post_begin(&app, user_id, "out-of-range.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    for bad_number in [0, 5] {
        let response = post_chunk(
            &app,
            user_id,
            upload_id,
            bad_number,
            &chunks[0],
            &sha256_hex(&chunks[0]),
        )
        .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let error: serde_json::Value = response.json();
        assert_eq!(error["code"], "CHUNK_OUT_OF_RANGE");
    }
}

#[tokio::test]
async fn chunk_submission_by_non_owner_is_rejected() {
    let Some(app) = setup_test_app().await else { return };
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let chunks = split_chunks(&data);

    let response = post_begin(&app, owner, "private.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    let response = post_chunk(
        &app,
        intruder,
        upload_id,
        1,
        &chunks[0],
        &sha256_hex(&chunks[0]),
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn size_mismatch_fails_the_upload_without_an_artifact() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    // Declare more bytes than the chunks will sum to.
    let declared_size = data.len() + 100;
    let response = post_begin_declaring(
        &app,
        user_id,
        "short.pdf",
        declared_size,
        &sha256_hex(&data),
        None,
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["upload"]["total_chunks"], 3);

    let chunks = split_chunks(&data);
    // Submit only as many chunks as we have data for, padding the count by
    // resubmitting real bytes under the remaining chunk numbers.
    let filler = vec![0u8; 50];
    let all_parts: Vec<&[u8]> = vec![&chunks[0], &chunks[1], &filler];
    for (i, part) in all_parts.iter().enumerate() {
        let response = post_chunk(
            &app,
            user_id,
            upload_id,
            (i + 1) as i32,
            part,
            &sha256_hex(part),
        )
        .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let detail = wait_for_status(&app, user_id, upload_id, "failed").await;
    let message = detail["upload"]["error_message"].as_str().unwrap();
    assert!(message.contains("size mismatch"), "got: {message}");

    let key = stored_key(&app, upload_id).await;
    assert!(!app.state.storage.exists(&key).await.unwrap());
    assert_eq!(used_storage(&app, user_id).await, 0);
}

#[tokio::test]
async fn whole_file_hash_mismatch_fails_the_upload() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    // Correct size, wrong whole-file digest.
    let response = post_begin_declaring(
        &app,
        user_id,
        "tampered.pdf",
        data.len(),
        &sha256_hex(b"not the real content"),
        None,
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    for (i, chunk) in split_chunks(&data).iter().enumerate() {
        let response = post_chunk(
            &app,
            user_id,
            upload_id,
            (i + 1) as i32,
            chunk,
            &sha256_hex(chunk),
        )
        .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let detail = wait_for_status(&app, user_id, upload_id, "failed").await;
    let message = detail["upload"]["error_message"].as_str().unwrap();
    assert!(message.contains("hash mismatch"), "got: {message}");

    let key = stored_key(&app, upload_id).await;
    assert!(!app.state.storage.exists(&key).await.unwrap());
    assert_eq!(used_storage(&app, user_id).await, 0);

    // Chunk bytes stay in place for diagnosis on verification failures.
    let rows = sqlx::query("SELECT stored_key FROM upload_chunks WHERE upload_id = $1")
        .bind(upload_id)
        .fetch_all(&app.pool)
        .await
        .unwrap();
    for row in &rows {
        assert!(app
            .state
            .storage
            .exists(&row.get::<String, _>("stored_key"))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn concurrent_submissions_of_the_final_chunk_trigger_one_reassembly() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let chunks = split_chunks(&data);

    let response = post_begin(&app, user_id, "race.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    let first = post_chunk(&app, user_id, upload_id, 1, &chunks[0], &sha256_hex(&chunks[0])).await;
    assert_eq!(first.status_code(), StatusCode::CREATED);

    // Two requests race on the final missing chunk.
    let hash = sha256_hex(&chunks[1]);
    let (left, right) = futures::join!(
        post_chunk(&app, user_id, upload_id, 2, &chunks[1], &hash),
        post_chunk(&app, user_id, upload_id, 2, &chunks[1], &hash),
    );

    let statuses = [left.status_code(), right.status_code()];
    assert!(statuses.contains(&StatusCode::CREATED), "got {statuses:?}");
    assert!(statuses.contains(&StatusCode::CONFLICT), "got {statuses:?}");

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM upload_chunks WHERE upload_id = $1 AND chunk_number = 2",
    )
    .bind(upload_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(row.get::<i64, _>("count"), 1);

    // Exactly one reassembly completes and exactly one charge lands.
    let detail = wait_for_status(&app, user_id, upload_id, "completed").await;
    assert_eq!(detail["upload"]["uploaded_chunks"], 2);
    assert_eq!(used_storage(&app, user_id).await, data.len() as i64);

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM tasks WHERE task_type = 'assemble_upload'",
    )
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(row.get::<i64, _>("count"), 1);
}

#[tokio::test]
async fn reassembly_of_a_completed_upload_is_a_noop() {
    let Some(app) = setup_test_app().await else { return };
    let user_id = Uuid::new_v4();

    let data = pdf_payload((TEST_CHUNK_SIZE * 2) as usize);
    let response = post_begin(&app, user_id, "idempotent.pdf", &data, false).await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["upload"]["id"].as_str().unwrap().parse().unwrap();

    for (i, chunk) in split_chunks(&data).iter().enumerate() {
        post_chunk(
            &app,
            user_id,
            upload_id,
            (i + 1) as i32,
            chunk,
            &sha256_hex(chunk),
        )
        .await;
    }
    wait_for_status(&app, user_id, upload_id, "completed").await;

    let charged_before = used_storage(&app, user_id).await;
    let key = stored_key(&app, upload_id).await;
    let artifact_before = app.state.storage.get(&key).await.unwrap();

    // Re-running reassembly (a redelivered task) must not re-merge,
    // re-write, or re-charge.
    app.state
        .task_context
        .assembly
        .assemble(upload_id)
        .await
        .unwrap();

    assert_eq!(used_storage(&app, user_id).await, charged_before);
    assert_eq!(app.state.storage.get(&key).await.unwrap(), artifact_before);
}
