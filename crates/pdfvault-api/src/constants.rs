//! API-level constants.

/// Path prefix for all versioned API routes.
pub const API_PREFIX: &str = "/api/v1";

/// Default page size for upload listings.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound for a requested page size.
pub const MAX_PAGE_SIZE: i64 = 100;
