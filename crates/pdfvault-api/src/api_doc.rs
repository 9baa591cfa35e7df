//! OpenAPI document for the Pdfvault API.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pdfvault API",
        description = "Chunked PDF upload, reassembly, and storage quota service"
    ),
    paths(
        crate::handlers::uploads::begin_upload,
        crate::handlers::uploads::submit_chunk,
        crate::handlers::uploads::list_uploads,
        crate::handlers::uploads::get_upload,
        crate::handlers::uploads::delete_upload,
        crate::handlers::quota::get_quota,
        crate::handlers::quota::upload_stats,
    ),
    components(schemas(
        pdfvault_core::models::UploadStatus,
        pdfvault_core::models::ChunkStatus,
        pdfvault_core::models::UploadResponse,
        pdfvault_core::models::BeginUploadResponse,
        pdfvault_core::models::UploadListResponse,
        pdfvault_core::models::ChunkResponse,
        pdfvault_core::models::SubmitChunkResponse,
        pdfvault_core::models::QuotaResponse,
        pdfvault_core::models::UploadStats,
        crate::handlers::uploads::UploadDetailResponse,
        crate::error::ErrorResponse,
    )),
    tags(
        (name = "uploads", description = "Upload intake, chunk submission, and lifecycle"),
        (name = "quota", description = "Storage quota inspection")
    )
)]
pub struct ApiDoc;
