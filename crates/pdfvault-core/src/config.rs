//! Configuration module
//!
//! Runtime configuration is read once from the environment at startup via
//! [`Config::from_env`]. Sizes are configured in MB and stored in bytes.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    BYTES_PER_MB, DEFAULT_CHUNK_SIZE_MB, DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_MAX_STORAGE_BYTES,
};
use crate::storage_types::StorageBackend;

const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IO_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_IO_RETRY_BACKOFF_MS: u64 = 250;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,

    // Database
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,

    // Upload pipeline
    pub chunk_size_bytes: u64,
    pub max_file_size_bytes: u64,
    pub default_max_storage_bytes: i64,
    pub assembly_work_dir: PathBuf,
    pub io_retry_attempts: u32,
    pub io_retry_backoff_ms: u64,

    // Task queue
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_queue_default_timeout_seconds: i32,
    pub task_queue_max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub task_queue_stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub task_queue_stale_task_grace_period_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        // Load .env if present; ignore a missing file.
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => StorageBackend::from_str(&value)?,
            Err(_) => StorageBackend::Local,
        };

        let chunk_size_bytes = env_parse("CHUNK_SIZE_MB", DEFAULT_CHUNK_SIZE_MB)? * BYTES_PER_MB;
        let max_file_size_bytes =
            env_parse("MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB)? * BYTES_PER_MB;
        if chunk_size_bytes == 0 {
            anyhow::bail!("CHUNK_SIZE_MB must be greater than 0");
        }
        if max_file_size_bytes < chunk_size_bytes {
            anyhow::bail!("MAX_FILE_SIZE_MB must be at least CHUNK_SIZE_MB");
        }

        let assembly_work_dir = env::var("ASSEMBLY_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("pdfvault-assembly"));

        Ok(Config {
            server_port: env_parse("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", DEFAULT_DB_TIMEOUT_SECS)?,
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or_else(|| env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            chunk_size_bytes,
            max_file_size_bytes,
            default_max_storage_bytes: env_parse(
                "DEFAULT_MAX_STORAGE_BYTES",
                DEFAULT_MAX_STORAGE_BYTES,
            )?,
            assembly_work_dir,
            io_retry_attempts: env_parse("IO_RETRY_ATTEMPTS", DEFAULT_IO_RETRY_ATTEMPTS)?,
            io_retry_backoff_ms: env_parse("IO_RETRY_BACKOFF_MS", DEFAULT_IO_RETRY_BACKOFF_MS)?,
            task_queue_max_workers: env_parse("TASK_QUEUE_MAX_WORKERS", 4usize)?,
            task_queue_poll_interval_ms: env_parse("TASK_QUEUE_POLL_INTERVAL_MS", 1000u64)?,
            task_queue_default_timeout_seconds: env_parse(
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                600i32,
            )?,
            task_queue_max_retries: env_parse("TASK_QUEUE_MAX_RETRIES", 3i32)?,
            task_queue_stale_task_reap_interval_secs: env_parse(
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                60u64,
            )?,
            task_queue_stale_task_grace_period_secs: env_parse(
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                300i64,
            )?,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Number of chunks a file of `size_bytes` is split into. Files at or
    /// below the chunk size are stored directly as a single chunk.
    pub fn total_chunks_for(&self, size_bytes: u64) -> i32 {
        if size_bytes <= self.chunk_size_bytes {
            1
        } else {
            size_bytes.div_ceil(self.chunk_size_bytes) as i32
        }
    }

    /// Whether a file of `size_bytes` takes the chunked path.
    pub fn is_chunked_size(&self, size_bytes: u64) -> bool {
        size_bytes > self.chunk_size_bytes
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_chunk_size(chunk_size_bytes: u64) -> Config {
        Config {
            server_port: 3000,
            environment: "test".to_string(),
            cors_origins: vec![],
            database_url: "postgresql://localhost/pdfvault".to_string(),
            db_max_connections: 5,
            db_timeout_seconds: 30,
            storage_backend: StorageBackend::Local,
            local_storage_path: None,
            local_storage_base_url: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            chunk_size_bytes,
            max_file_size_bytes: 100 * BYTES_PER_MB,
            default_max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            assembly_work_dir: std::env::temp_dir(),
            io_retry_attempts: 3,
            io_retry_backoff_ms: 1,
            task_queue_max_workers: 2,
            task_queue_poll_interval_ms: 100,
            task_queue_default_timeout_seconds: 600,
            task_queue_max_retries: 3,
            task_queue_stale_task_reap_interval_secs: 0,
            task_queue_stale_task_grace_period_secs: 300,
        }
    }

    #[test]
    fn chunk_plan_for_50mb_file_with_20mb_chunks() {
        let config = config_with_chunk_size(20 * BYTES_PER_MB);
        assert_eq!(config.total_chunks_for(50 * BYTES_PER_MB), 3);
        assert!(config.is_chunked_size(50 * BYTES_PER_MB));
    }

    #[test]
    fn small_file_is_a_single_chunk() {
        let config = config_with_chunk_size(20 * BYTES_PER_MB);
        assert_eq!(config.total_chunks_for(5 * BYTES_PER_MB), 1);
        assert!(!config.is_chunked_size(5 * BYTES_PER_MB));
        // Exactly at the threshold still goes direct.
        assert_eq!(config.total_chunks_for(20 * BYTES_PER_MB), 1);
        assert!(!config.is_chunked_size(20 * BYTES_PER_MB));
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let config = config_with_chunk_size(20 * BYTES_PER_MB);
        assert_eq!(config.total_chunks_for(40 * BYTES_PER_MB), 2);
        assert_eq!(config.total_chunks_for(40 * BYTES_PER_MB + 1), 3);
    }

    #[test]
    fn production_detection() {
        let mut config = config_with_chunk_size(BYTES_PER_MB);
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
        config.environment = "prod".to_string();
        assert!(config.is_production());
    }
}
