use std::fmt;
use thiserror::Error;

/// Broad classes of detection service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Throttled,
    AccessDenied,
    /// The model version is not in the RUNNING state.
    ModelNotRunning,
    NotFound,
    InvalidRequest,
    Transport,
    Internal,
    Other,
}

impl ServiceErrorKind {
    /// Maps a service error code to its kind.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("ThrottlingException")
            | Some("ProvisionedThroughputExceededException")
            | Some("LimitExceededException") => Self::Throttled,
            Some("AccessDeniedException") => Self::AccessDenied,
            Some("ResourceNotReadyException") => Self::ModelNotRunning,
            Some("ResourceNotFoundException") | Some("NoSuchBucket") => Self::NotFound,
            Some("InvalidParameterException")
            | Some("InvalidImageFormatException")
            | Some("ImageTooLargeException")
            | Some("InvalidS3ObjectException")
            | Some("ResourceInUseException") => Self::InvalidRequest,
            Some("InternalServerError") => Self::Internal,
            _ => Self::Other,
        }
    }

    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Throttled | Self::Transport | Self::Internal)
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Throttled => "throttled",
            Self::AccessDenied => "access denied",
            Self::ModelNotRunning => "model not running",
            Self::NotFound => "not found",
            Self::InvalidRequest => "invalid request",
            Self::Transport => "transport",
            Self::Internal => "internal",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "bucket {bucket} is in region {bucket_region} but the session uses {session_region}"
    )]
    RegionMismatch {
        bucket: String,
        bucket_region: String,
        session_region: String,
    },

    #[error("detection service error ({kind}): {message}")]
    Service {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("label {0:?} is not in the class vocabulary")]
    UnknownLabel(String),

    #[error("invalid service response: {0}")]
    InvalidResponse(String),

    #[error("model did not reach {target} within {waited_secs}s (last status {last})")]
    WaitTimeout {
        target: String,
        last: String,
        waited_secs: u64,
    },

    #[error("model version entered a failed state: {0}")]
    ModelFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn service(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::Service {
            kind,
            message: message.into(),
        }
    }

    /// Only service errors of a transient kind are worth retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Service { kind, .. } => kind.is_retriable(),
            _ => false,
        }
    }

    /// Errors that stop a directory run even when failed images are skipped.
    pub fn is_fatal_for_run(&self) -> bool {
        !matches!(
            self,
            Self::Service { .. } | Self::Image(_) | Self::InvalidResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
