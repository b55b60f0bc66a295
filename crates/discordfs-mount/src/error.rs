//! Error types for the filesystem adapter.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type MountResult<T> = Result<T, MountError>;

/// Error variants the adapter maps to kernel status codes.
#[derive(Debug, Error)]
pub enum MountError {
    /// No file or directory at the path.
    #[error("not found")]
    NotFound,

    /// A file or directory already exists at the path.
    #[error("already exists")]
    AlreadyExists,

    /// Directory delete on a non-empty directory.
    #[error("directory not empty")]
    NotEmpty,

    /// File operation aimed at a directory.
    #[error("is a directory")]
    IsDirectory,

    /// Renaming a directory that still has children; the index does not
    /// rewrite descendant paths.
    #[error("directory rename is not supported")]
    DirectoryRenameUnsupported,

    /// Callback with no meaningful implementation.
    #[error("operation not implemented: {op}")]
    NotImplemented {
        /// The callback name.
        op: String,
    },

    /// Configuration rejected at startup.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// Metadata index failure.
    #[error(transparent)]
    Meta(#[from] discordfs_meta::MetaError),

    /// Storage engine failure (crypto, chunking, reassembly).
    #[error(transparent)]
    Storage(#[from] discordfs_storage::StorageError),

    /// Remote store failure that reached the adapter.
    #[error(transparent)]
    Remote(#[from] discordfs_remote::RemoteError),
}

impl MountError {
    /// Maps the error to the errno the kernel bridge reports.
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            MountError::NotFound => ENOENT,
            MountError::AlreadyExists => EEXIST,
            MountError::NotEmpty => ENOTEMPTY,
            MountError::IsDirectory => EISDIR,
            MountError::DirectoryRenameUnsupported => EACCES,
            MountError::NotImplemented { .. } => ENOSYS,
            MountError::Config { .. } => EINVAL,
            MountError::Meta(_) | MountError::Storage(_) | MountError::Remote(_) => EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_facing_statuses_map_to_expected_errnos() {
        assert_eq!(MountError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(MountError::AlreadyExists.to_errno(), libc::EEXIST);
        assert_eq!(MountError::NotEmpty.to_errno(), libc::ENOTEMPTY);
        assert_eq!(MountError::IsDirectory.to_errno(), libc::EISDIR);
        assert_eq!(
            MountError::DirectoryRenameUnsupported.to_errno(),
            libc::EACCES
        );
        assert_eq!(
            MountError::NotImplemented { op: "streams".into() }.to_errno(),
            libc::ENOSYS
        );
    }

    #[test]
    fn engine_failures_surface_as_io_error() {
        let err = MountError::Storage(discordfs_storage::StorageError::Fetch("gone".into()));
        assert_eq!(err.to_errno(), libc::EIO);
    }
}
