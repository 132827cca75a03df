//! Error types for clipkeep.
//!
//! Persistence and configuration failures surface to callers through
//! [`Error`]. Capture-side failures are recovered inside the monitor (see
//! [`crate::monitor::MonitorError`]) and classification never fails.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for clipkeep operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create a database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === History Errors ===
    /// No history item has the given id.
    #[error("clipboard item {id} not found")]
    ItemNotFound {
        /// The missing id.
        id: i64,
    },

    /// The pin limit has been reached.
    #[error("cannot pin more than {max} items")]
    PinLimit {
        /// The maximum number of pinned items.
        max: u32,
    },

    /// An edit would duplicate content stored under another id.
    #[error("content already stored as item {existing_id}")]
    DuplicateContent {
        /// The id that already holds this content.
        existing_id: i64,
    },

    /// An edit would leave a text item empty.
    #[error("clipboard item {id} cannot be updated to empty content")]
    EmptyContent {
        /// The item being edited.
        id: i64,
    },

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized Result type for clipkeep operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Check if this error means the requested item does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ItemNotFound { id: 42 };
        assert_eq!(err.to_string(), "clipboard item 42 not found");

        let err = Error::PinLimit { max: 10 };
        assert_eq!(err.to_string(), "cannot pin more than 10 items");
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(Error::ItemNotFound { id: 1 }.is_not_found());
        assert!(!Error::PinLimit { max: 10 }.is_not_found());
    }

    #[test]
    fn test_duplicate_content_display() {
        let err = Error::DuplicateContent { existing_id: 7 };
        assert!(err.to_string().contains('7'));

        let err = Error::EmptyContent { id: 3 };
        assert!(err.to_string().contains("empty content"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "invalid interval".to_string(),
        };
        assert!(err.to_string().contains("invalid interval"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
