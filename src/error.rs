use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing file could not be read or written
    #[error("Storage I/O failed for '{path}': {reason}")]
    Io {
        path: String,
        reason: String,
    },

    /// The persisted data could not be understood
    #[error("Storage contents are corrupt: {reason}")]
    Corrupt {
        reason: String,
    },

    /// Any other backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Create a new I/O error for the given path
    pub fn io(path: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Io {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new corrupt-contents error
    pub fn corrupt(reason: impl ToString) -> Self {
        StorageError::Corrupt {
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by the token store
///
/// Every variant carries owned strings so the settled result of the
/// initial load can be handed out to any number of callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A storage operation on a single key failed
    #[error("Storage operation on '{key}' failed: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Text read from storage could not be turned into a field value
    #[error("Failed to decode '{key}': {reason}")]
    Decode {
        key: String,
        reason: String,
    },

    /// A field value could not be turned into text for storage
    #[error("Failed to encode field '{field}': {reason}")]
    Encode {
        field: String,
        reason: String,
    },

    /// The initial load from storage did not complete
    #[error("Initial token load failed: {reason}")]
    LoadFailed {
        reason: String,
    },

    /// Configuration could not be resolved
    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
    },
}

impl AuthError {
    /// Wrap a storage error with the key it happened on
    pub fn storage(key: impl Into<String>, source: StorageError) -> Self {
        AuthError::Storage {
            key: key.into(),
            source,
        }
    }

    /// Create a new decode error
    pub fn decode(key: impl Into<String>, reason: impl ToString) -> Self {
        AuthError::Decode {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new encode error
    pub fn encode(field: impl Into<String>, reason: impl ToString) -> Self {
        AuthError::Encode {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        AuthError::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from the storage backend
    pub fn is_storage(&self) -> bool {
        matches!(self, AuthError::Storage { .. })
    }

    /// Returns true if this error is a decode failure
    pub fn is_decode(&self) -> bool {
        matches!(self, AuthError::Decode { .. })
    }
}

/// Result type for token store operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_storage_error_display() {
        let error = StorageError::io("/tmp/tokens.json", "permission denied");
        assert_eq!(
            error.to_string(),
            "Storage I/O failed for '/tmp/tokens.json': permission denied"
        );
    }

    #[test]
    fn test_auth_error_keeps_storage_source() {
        let error = AuthError::storage("$LoopBackSDK$id", StorageError::Backend("offline".into()));

        assert!(error.is_storage());
        assert!(!error.is_decode());
        assert_eq!(
            error.to_string(),
            "Storage operation on '$LoopBackSDK$id' failed: Storage backend error: offline"
        );

        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Storage backend error: offline"));
    }

    #[test]
    fn test_auth_error_is_cloneable() {
        let error = AuthError::decode("$LoopBackSDK$ttl", "invalid digit found in string");
        let copy = error.clone();
        assert_eq!(error, copy);
        assert!(copy.is_decode());
    }
}
