//! Error types for the filesystem switch.

use std::path::PathBuf;

/// Reason an address string could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseError {
    /// No `:` separating a scheme from the rest of the address.
    #[error("missing scheme")]
    MissingScheme,
    /// The address starts with `:`, leaving the scheme empty.
    #[error("empty scheme")]
    EmptyScheme,
    /// The scheme is not followed by `//`.
    #[error("missing '//' after scheme")]
    MissingSlashSlash,
    /// An authority component was started but not finished (`user@` or `host:`).
    #[error("incomplete authority")]
    Incomplete,
}

/// Filesystem error type with contextual variants.
///
/// Intermediate layers (cache, registry, mount tree) never swallow these; they are
/// returned to the immediate caller with their classification intact.
///
/// # Examples
///
/// ```rust
/// use switchfs::FsError;
/// use std::path::PathBuf;
///
/// let err = FsError::NotFound { path: PathBuf::from("/missing") };
/// assert!(err.to_string().contains("/missing"));
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Invalid handle or corrupt internal state. A caller contract violation.
    #[error("fault: {reason}")]
    Fault {
        /// What was found to be inconsistent.
        reason: String,
    },

    /// Operation is not provided by the backend and has no meaningful default.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Malformed address text.
    #[error("cannot parse address {input:?}: {kind}")]
    Parse {
        /// The address as given.
        input: String,
        /// What was wrong with it.
        kind: ParseError,
    },

    /// Path does not exist, or no mount/connection could serve it.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// The backend factory has no constructor for this scheme.
    #[error("unknown scheme: {scheme}")]
    UnknownScheme {
        /// The scheme that was requested.
        scheme: String,
    },

    /// Path already exists when it shouldn't.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The path that already exists.
        path: PathBuf,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: PathBuf,
    },

    /// Permission denied for operation.
    #[error("{operation}: permission denied: {path}")]
    PermissionDenied {
        /// The path where permission was denied.
        path: PathBuf,
        /// The operation that was denied.
        operation: &'static str,
    },

    /// Symlink target does not fit the bounded target buffer.
    #[error("symlink target too long: {len} bytes")]
    TargetTooLong {
        /// Length of the rejected target.
        len: usize,
    },

    /// File contents were not what the caller asked for (e.g. invalid UTF-8).
    #[error("invalid data in {path}: {details}")]
    InvalidData {
        /// The file that was read.
        path: PathBuf,
        /// What was wrong with it.
        details: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Opaque driver error (remote protocol failure and the like).
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error forwarded from the underlying driver.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Build a [`FsError::Fault`] and log it; faults are never silent.
    pub fn fault(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::error!(%reason, "fault");
        FsError::Fault { reason }
    }

    /// Attach an operation and path to an I/O error.
    ///
    /// Well-known error kinds are classified; everything else is forwarded verbatim.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied { path, operation },
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists { path, operation },
            _ => FsError::Io {
                operation,
                path,
                source,
            },
        }
    }

    /// Stable classification of this error, as stored in a handle's last error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            FsError::Fault { .. } => ErrorCode::Fault,
            FsError::NotSupported { .. } => ErrorCode::NotSupported,
            FsError::Parse { kind, .. } => ErrorCode::Parse(*kind),
            FsError::NotFound { .. } => ErrorCode::NotFound,
            FsError::UnknownScheme { .. } => ErrorCode::UnknownScheme,
            FsError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            FsError::NotADirectory { .. } => ErrorCode::NotADirectory,
            FsError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            FsError::TargetTooLong { .. } => ErrorCode::TargetTooLong,
            FsError::InvalidData { .. } => ErrorCode::InvalidData,
            FsError::Serialization(_) | FsError::Deserialization(_) => ErrorCode::Serialization,
            FsError::Backend(_) => ErrorCode::Backend,
            FsError::Io { source, .. } => ErrorCode::Io(source.raw_os_error()),
        }
    }
}

/// Copyable classification of an [`FsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// See [`FsError::Fault`].
    Fault,
    /// See [`FsError::NotSupported`].
    NotSupported,
    /// See [`FsError::Parse`].
    Parse(ParseError),
    /// See [`FsError::NotFound`].
    NotFound,
    /// See [`FsError::UnknownScheme`].
    UnknownScheme,
    /// See [`FsError::AlreadyExists`].
    AlreadyExists,
    /// See [`FsError::NotADirectory`].
    NotADirectory,
    /// See [`FsError::PermissionDenied`].
    PermissionDenied,
    /// See [`FsError::TargetTooLong`].
    TargetTooLong,
    /// See [`FsError::InvalidData`].
    InvalidData,
    /// Serialization or deserialization failure.
    Serialization,
    /// See [`FsError::Backend`].
    Backend,
    /// Forwarded I/O error, with the OS errno when one exists.
    Io(Option<i32>),
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        FsError::io("io", PathBuf::new(), error)
    }
}

impl From<FsError> for std::io::Error {
    fn from(error: FsError) -> Self {
        use std::io::ErrorKind;
        let kind = match error {
            FsError::Io { source, .. } => return source,
            FsError::NotFound { .. } => ErrorKind::NotFound,
            FsError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            FsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            FsError::NotSupported { .. } => ErrorKind::Unsupported,
            FsError::Parse { .. } | FsError::TargetTooLong { .. } => ErrorKind::InvalidInput,
            FsError::InvalidData { .. } => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}
