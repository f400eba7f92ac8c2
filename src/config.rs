//! Configuration loading and types for Dropgate.
//!
//! Configuration is read from the process environment once at startup and
//! frozen into an immutable [`Config`] that is passed by reference into the
//! store clients -- there is no ambient global state.  Cloud backends
//! require their variables to be present: loading fails fast, reporting
//! every missing variable in one error, and no partial startup occurs.
//!
//! Required for the default (cloud) backends:
//!   `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
//!   `AWS_S3_BUCKET`, `DYNAMODB_TABLE_NAME`
//!
//! Optional overrides:
//!   `DROPGATE_HOST`, `DROPGATE_PORT`, `DROPGATE_MAX_UPLOAD_SIZE`,
//!   `DROPGATE_STORAGE_BACKEND` (`s3` | `memory`),
//!   `DROPGATE_METADATA_ENGINE` (`dynamodb` | `memory`),
//!   `DROPGATE_S3_ENDPOINT_URL` (MinIO / LocalStack),
//!   `DROPGATE_PUBLIC_BASE_URL`,
//!   `DROPGATE_RETRY_ATTEMPTS`, `DROPGATE_RETRY_BASE_DELAY_MS`,
//!   `DROPGATE_PHASE_DEADLINE_MS`

use std::env;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Object storage settings.
    pub storage: StorageConfig,

    /// Metadata store settings.
    pub metadata: MetadataConfig,

    /// Pipeline retry tuning.
    pub retry: RetryConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Maximum accepted upload size in bytes (default 32 MiB).
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend type: `s3` or `memory`.
    pub backend: String,

    /// Target bucket name.
    pub bucket: String,

    /// AWS region.
    pub region: String,

    /// Explicit AWS access key (falls back to the SDK credential chain).
    pub access_key_id: Option<String>,

    /// Explicit AWS secret key (falls back to the SDK credential chain).
    pub secret_access_key: Option<String>,

    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    pub endpoint_url: Option<String>,

    /// Override for the public URL base. When unset, the S3
    /// virtual-hosted convention `https://{bucket}.s3.amazonaws.com` is used.
    pub public_base_url: Option<String>,
}

/// Metadata store configuration.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Engine type: `dynamodb` or `memory`.
    pub engine: String,

    /// DynamoDB table name.
    pub table_name: String,

    /// AWS region.
    pub region: String,

    /// Custom DynamoDB endpoint (LocalStack / dynamodb-local).
    pub endpoint_url: Option<String>,
}

/// Retry tuning for both pipeline phases.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per phase before surfacing failure.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (doubled per attempt, jittered).
    pub base_delay_ms: u64,

    /// Ceiling on total time spent in one phase, in milliseconds.
    pub phase_deadline_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            phase_deadline_ms: 5_000,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload_size() -> usize {
    33_554_432 // 32 MiB
}

// -- Loader ------------------------------------------------------------------

/// Load configuration from the process environment.
///
/// Returns a single error listing every missing required variable so an
/// operator can fix the whole deployment in one pass.
pub fn load_from_env() -> anyhow::Result<Config> {
    let storage_backend =
        env::var("DROPGATE_STORAGE_BACKEND").unwrap_or_else(|_| "s3".to_string());
    let metadata_engine =
        env::var("DROPGATE_METADATA_ENGINE").unwrap_or_else(|_| "dynamodb".to_string());

    let mut missing: Vec<&str> = Vec::new();
    let mut required = |name: &'static str| -> String {
        match env::var(name) {
            Ok(v) if !v.is_empty() => v,
            _ => {
                missing.push(name);
                String::new()
            }
        }
    };

    // Cloud backends fail fast when their variables are absent. The
    // in-memory backends (dev/test) need none of them.
    let needs_aws = storage_backend == "s3" || metadata_engine == "dynamodb";
    let (region, access_key_id, secret_access_key) = if needs_aws {
        (
            required("AWS_REGION"),
            Some(required("AWS_ACCESS_KEY_ID")),
            Some(required("AWS_SECRET_ACCESS_KEY")),
        )
    } else {
        (
            env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            None,
            None,
        )
    };

    let bucket = if storage_backend == "s3" {
        required("AWS_S3_BUCKET")
    } else {
        env::var("AWS_S3_BUCKET").unwrap_or_else(|_| "dropgate-dev".to_string())
    };

    let table_name = if metadata_engine == "dynamodb" {
        required("DYNAMODB_TABLE_NAME")
    } else {
        env::var("DYNAMODB_TABLE_NAME").unwrap_or_else(|_| "dropgate_records".to_string())
    };

    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required environment variables: {}",
            missing.join(", ")
        );
    }

    let server = ServerConfig {
        host: env::var("DROPGATE_HOST").unwrap_or_else(|_| default_host()),
        port: parse_env("DROPGATE_PORT", default_port())?,
        max_upload_size: parse_env("DROPGATE_MAX_UPLOAD_SIZE", default_max_upload_size())?,
    };

    let retry_defaults = RetryConfig::default();
    let retry = RetryConfig {
        max_attempts: parse_env("DROPGATE_RETRY_ATTEMPTS", retry_defaults.max_attempts)?,
        base_delay_ms: parse_env("DROPGATE_RETRY_BASE_DELAY_MS", retry_defaults.base_delay_ms)?,
        phase_deadline_ms: parse_env(
            "DROPGATE_PHASE_DEADLINE_MS",
            retry_defaults.phase_deadline_ms,
        )?,
    };

    Ok(Config {
        server,
        storage: StorageConfig {
            backend: storage_backend,
            bucket,
            region: region.clone(),
            access_key_id: access_key_id.filter(|v| !v.is_empty()),
            secret_access_key: secret_access_key.filter(|v| !v.is_empty()),
            endpoint_url: env::var("DROPGATE_S3_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
            public_base_url: env::var("DROPGATE_PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
        },
        metadata: MetadataConfig {
            engine: metadata_engine,
            table_name,
            region,
            endpoint_url: env::var("DROPGATE_DYNAMODB_ENDPOINT_URL")
                .ok()
                .filter(|v| !v.is_empty()),
        },
        retry,
    })
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        _ => Ok(default),
    }
}

impl Config {
    /// Configuration for tests and local development: in-memory backends,
    /// no environment required.
    pub fn for_memory_backends() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig {
                backend: "memory".to_string(),
                bucket: "dropgate-dev".to_string(),
                region: "us-east-1".to_string(),
                access_key_id: None,
                secret_access_key: None,
                endpoint_url: None,
                public_base_url: None,
            },
            metadata: MetadataConfig {
                engine: "memory".to_string(),
                table_name: "dropgate_records".to_string(),
                region: "us-east-1".to_string(),
                endpoint_url: None,
            },
            retry: RetryConfig::default(),
        }
    }
}

// -- Tests --------------------------------------------------------------------
