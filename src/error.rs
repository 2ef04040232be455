use thiserror::Error;

/// Represents a single validation error in the configuration.
///
/// Contains the field name that failed validation and a description of the issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for debrid-fuse.
///
/// Consolidates catalog, provider, HTTP, and kernel-facing errors so that
/// every failure has exactly one errno mapping.
#[derive(Error, Debug)]
pub enum VfsError {
    // === Not found ===
    /// Catalog row absent, or vanished mid-operation (ENOENT)
    #[error("No such entry: {0}")]
    NoSuchEntry(String),

    // === Directory shape ===
    /// opendir/readdir on a regular file (ENOTDIR)
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    // === Permission ===
    /// Open with write intent, access(W_OK) (EACCES)
    #[error("Permission denied")]
    PermissionDenied,

    /// Kernel-initiated mutation on the read-only tree (EROFS)
    #[error("Read-only filesystem")]
    ReadOnly,

    // === Handles ===
    /// Unknown file handle (EBADF)
    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    // === I/O ===
    /// Remote side unreachable after all retries, or unexpected internal failure (EIO)
    #[error("I/O error: {0}")]
    Io(String),

    /// Read exceeded its wall-clock budget
    #[error("Operation timed out")]
    Timeout,

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Remote server replied with an unexpected status
    #[error("Unexpected HTTP status {status} for range {start}-{end}")]
    UnexpectedStatus { status: u16, start: u64, end: u64 },

    /// Body length disagreed with the Content-Length header
    #[error("Content-Length mismatch: declared {declared}, received {received}")]
    WeirdServerReply { declared: u64, received: u64 },

    /// Transfer rate stayed below the configured floor for too long
    #[error("Transfer stalled below {limit} B/s for {window}s")]
    LowSpeed { limit: u64, window: u64 },

    // === Persistence ===
    /// Catalog database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // === Configuration ===
    /// Failed to read a config file
    #[error("Failed to read config file: {0}")]
    ConfigRead(String),

    /// Failed to parse a config file
    #[error("Failed to parse config file: {0}")]
    ConfigParse(String),

    /// Validation error with one or more issues
    #[error("Invalid configuration: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ConfigInvalid(Vec<ValidationIssue>),

    /// Mount lifecycle failure
    #[error("Mount error: {0}")]
    Mount(String),
}

impl VfsError {
    /// Convert the error to a libc error code suitable for FUSE replies.
    pub fn to_errno(&self) -> i32 {
        match self {
            VfsError::NoSuchEntry(_) => libc::ENOENT,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::PermissionDenied => libc::EACCES,
            VfsError::ReadOnly => libc::EROFS,
            VfsError::BadHandle(_) => libc::EBADF,
            VfsError::Timeout => libc::EIO,

            VfsError::Io(_)
            | VfsError::Http(_)
            | VfsError::UnexpectedStatus { .. }
            | VfsError::WeirdServerReply { .. }
            | VfsError::LowSpeed { .. } => libc::EIO,

            // A row that vanished mid-read surfaces as ENOENT upstream; any
            // other database failure is an I/O error to the kernel.
            VfsError::Database(sqlx::Error::RowNotFound) => libc::ENOENT,
            VfsError::Database(_) => libc::EIO,

            VfsError::ConfigRead(_)
            | VfsError::ConfigParse(_)
            | VfsError::ConfigInvalid(_)
            | VfsError::Mount(_) => libc::EIO,
        }
    }

    /// True when a URL refresh and a single retry may fix the failure.
    /// Transport-level failures qualify; a definite HTTP error status from
    /// the server does not.
    pub fn is_refreshable(&self) -> bool {
        matches!(
            self,
            VfsError::Http(_)
                | VfsError::Timeout
                | VfsError::WeirdServerReply { .. }
                | VfsError::LowSpeed { .. }
        )
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NoSuchEntry(err.to_string()),
            std::io::ErrorKind::PermissionDenied => VfsError::PermissionDenied,
            std::io::ErrorKind::TimedOut => VfsError::Timeout,
            _ => VfsError::Io(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for VfsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VfsError::Timeout
        } else {
            VfsError::Http(err.to_string())
        }
    }
}

/// Result type alias for operations that can fail with [`VfsError`].
pub type VfsResult<T> = Result<T, VfsError>;
