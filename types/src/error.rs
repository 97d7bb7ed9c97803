use thiserror::Error;

/// Failures produced while parsing a `storageUri` (§6.1) or the shape of a
/// CRD field that this crate validates independently of serde.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized storage uri scheme: {0}")]
    UnknownScheme(String),

    #[error("malformed storage uri: {0}")]
    InvalidUri(String),
}
