//! Tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));

    fmt().with_env_filter(filter).init();
}
