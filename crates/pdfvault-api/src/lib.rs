//! Pdfvault HTTP API.
//!
//! Thin axum surface over the service layer: multipart upload intake, chunk
//! submission, status/listing, deletion, and quota inspection. Authentication
//! happens upstream; see [`auth`] for the contract.

pub mod api_doc;
pub mod auth;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod task_handlers;
