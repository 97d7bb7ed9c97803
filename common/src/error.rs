/// Classification used by the Download Engine's retry/metrics policy (§7).
/// Every variant of [`Error`] maps to exactly one kind via [`Error::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection reset, 5xx, partial transfer: bounded retry with constant
    /// backoff, metric tag `download_error` on exhaustion.
    Transient,
    /// 429 or a typed rate-limit response: counted as a failed attempt,
    /// metric tag `rate_limit_error`.
    RateLimited,
    /// Size or checksum mismatch: no retry, metric tag `md5_verification_error`.
    Integrity,
    /// Authentication/authorization failure: fallback auth is tried before
    /// this kind is surfaced, metric tag `download_error`.
    Auth,
    /// Malformed URI or CRD field: no retry, metric tag `target_path_error`
    /// or `invalid_hf_uri`.
    Parse,
    /// Context cancelled by a `Delete` task: no retry, no state update, no
    /// metric.
    Cancelled,
    /// Node not found during a label patch: no retry, logged and treated as
    /// success.
    ResourceGone,
    /// Optimistic-concurrency conflict on the catalog document: retried with
    /// a fresh read-modify-write.
    CatalogConflict,
    /// Another node holds the per-model lease: no retry, transition to
    /// `Waiting`.
    LeaseConflict,
    /// Unauthorized watch or other unrecoverable condition: the process
    /// aborts.
    Fatal,
}

/// Errors possible across the daemon's watch, storage, and publication
/// paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    #[error("kubernetes watch failed permanently: {0}")]
    WatchFatal(String),

    #[error("s3 service error: {source}")]
    S3Error {
        #[from]
        source: s3::error::S3Error,
    },

    #[error("s3 credentials error: {source}")]
    S3CredentialsError {
        #[from]
        source: awscreds::error::CredentialsError,
    },

    #[error("gcs error: {source}")]
    GcsError {
        #[from]
        source: google_cloud_storage::http::Error,
    },

    #[error("azure error: {source}")]
    AzureError {
        #[from]
        source: azure_core::Error,
    },

    #[error("hub error: {source}")]
    HubError {
        #[from]
        source: hf_hub::api::tokio::ApiError,
    },

    #[error("http error: {source}")]
    ReqwestError {
        #[from]
        source: reqwest::Error,
    },

    #[error("json decode error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("i/o error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("utf-8 error: {source}")]
    Utf8Error {
        #[from]
        source: std::str::Utf8Error,
    },

    #[error("http status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("integrity check failed: {0}")]
    IntegrityFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("malformed storage uri: {0}")]
    InvalidUri(#[from] mmd_types::ParseError),

    #[error("invalid hub uri: {0}")]
    InvalidHubUri(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("node not found: {0}")]
    ResourceGone(String),

    #[error("catalog update conflict")]
    CatalogConflict,

    #[error("lease held by another node: {0}")]
    LeaseConflict(String),

    #[error("invalid resource definition: {0}")]
    UserInputError(String),

    #[error("error: {0}")]
    GenericError(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KubeError { .. } | Error::ReqwestError { .. } | Error::IoError { .. } => {
                ErrorKind::Transient
            }
            Error::WatchFatal(_) => ErrorKind::Fatal,
            Error::S3Error { .. } | Error::GcsError { .. } | Error::AzureError { .. } | Error::HubError { .. } => {
                ErrorKind::Transient
            }
            Error::HttpStatus { status, .. } if *status == 429 => ErrorKind::RateLimited,
            Error::HttpStatus { status, .. } if *status >= 500 => ErrorKind::Transient,
            Error::HttpStatus { status, .. } if *status == 401 || *status == 403 => ErrorKind::Auth,
            Error::HttpStatus { .. } => ErrorKind::Transient,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::S3CredentialsError { .. } | Error::AuthFailed(_) => ErrorKind::Auth,
            Error::IntegrityFailed(_) => ErrorKind::Integrity,
            Error::JsonError { .. }
            | Error::InvalidUri(_)
            | Error::InvalidHubUri(_)
            | Error::UserInputError(_)
            | Error::Utf8Error { .. } => ErrorKind::Parse,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::ResourceGone(_) => ErrorKind::ResourceGone,
            Error::CatalogConflict => ErrorKind::CatalogConflict,
            Error::LeaseConflict(_) => ErrorKind::LeaseConflict,
            Error::GenericError(_) => ErrorKind::Transient,
        }
    }

    pub fn metric_tag(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Transient => "download_error",
            ErrorKind::RateLimited => "rate_limit_error",
            ErrorKind::Integrity => "md5_verification_error",
            ErrorKind::Auth => "download_error",
            ErrorKind::Parse => match self {
                Error::InvalidHubUri(_) => "invalid_hf_uri",
                _ => "target_path_error",
            },
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ResourceGone => "resource_gone",
            ErrorKind::CatalogConflict => "catalog_conflict",
            ErrorKind::LeaseConflict => "lease_conflict",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Whether the Download Engine's bounded retry loop (§7) should attempt
    /// this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::CatalogConflict
        )
    }
}
