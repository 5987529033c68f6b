use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Namespace placed in front of every persisted key
pub const DEFAULT_KEY_PREFIX: &str = "$LoopBackSDK$";

/// File used by the file backend when no path is configured
pub const DEFAULT_STORAGE_FILE: &str = "loopback.auth.json";

pub const PREFIX_ENV: &str = "LOOPBACK_AUTH_PREFIX";
pub const LOAD_POLICY_ENV: &str = "LOOPBACK_AUTH_LOAD_POLICY";
pub const STORAGE_ENV: &str = "LOOPBACK_AUTH_STORAGE";
pub const STORAGE_PATH_ENV: &str = "LOOPBACK_AUTH_STORAGE_PATH";

/// What the initial load does when a field cannot be read or decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Log the failure and treat the field as never persisted
    #[default]
    AbsentOnFailure,
    /// Settle readiness with an error
    FailLoad,
}

impl FromStr for LoadFailurePolicy {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absent" | "absent_on_failure" => Ok(LoadFailurePolicy::AbsentOnFailure),
            "fail" | "fail_load" => Ok(LoadFailurePolicy::FailLoad),
            other => Err(AuthError::config(format!(
                "unknown load failure policy '{}', expected 'absent' or 'fail'",
                other
            ))),
        }
    }
}

/// Which storage backend holds the persisted token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local map, lost on exit
    #[default]
    Memory,
    /// Single JSON document on disk
    File { path: PathBuf },
}

/// Configuration for the token store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Prefix for every storage key
    pub prefix: String,
    /// Behaviour of the initial load on read failures
    #[serde(default)]
    pub load_failure: LoadFailurePolicy,
    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            load_failure: LoadFailurePolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_load_failure(mut self, policy: LoadFailurePolicy) -> Self {
        self.load_failure = policy;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Build the configuration from process environment variables
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(prefix) = lookup(PREFIX_ENV) {
            if prefix.is_empty() {
                return Err(AuthError::config(format!("{} must not be empty", PREFIX_ENV)));
            }
            config.prefix = prefix;
        }

        if let Some(policy) = lookup(LOAD_POLICY_ENV) {
            config.load_failure = policy.parse()?;
        }

        let path = lookup(STORAGE_PATH_ENV).map(PathBuf::from);
        config.storage = match lookup(STORAGE_ENV).as_deref().map(str::trim) {
            None | Some("memory") => StorageConfig::Memory,
            Some("file") => StorageConfig::File {
                path: path.unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_FILE)),
            },
            Some(other) => {
                return Err(AuthError::config(format!(
                    "unknown storage backend '{}', expected 'memory' or 'file'",
                    other
                )))
            }
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.prefix, "$LoopBackSDK$");
        assert_eq!(config.load_failure, LoadFailurePolicy::AbsentOnFailure);
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn test_file_storage_from_env() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            (PREFIX_ENV, "myapp$"),
            (LOAD_POLICY_ENV, "fail"),
            (STORAGE_ENV, "file"),
            (STORAGE_PATH_ENV, "/var/lib/myapp/auth.json"),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "myapp$");
        assert_eq!(config.load_failure, LoadFailurePolicy::FailLoad);
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("/var/lib/myapp/auth.json")
            }
        );
    }

    #[test]
    fn test_file_storage_default_path() {
        let config = AuthConfig::from_lookup(lookup_from(&[(STORAGE_ENV, "file")])).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from(DEFAULT_STORAGE_FILE)
            }
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AuthConfig::from_lookup(lookup_from(&[(PREFIX_ENV, "")])).is_err());
        assert!(AuthConfig::from_lookup(lookup_from(&[(LOAD_POLICY_ENV, "retry")])).is_err());
        assert!(AuthConfig::from_lookup(lookup_from(&[(STORAGE_ENV, "cookie")])).is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: AuthConfig = serde_json::from_str(r#"{"prefix":"x$"}"#).unwrap();
        assert_eq!(config.prefix, "x$");
        assert_eq!(config.storage, StorageConfig::Memory);

        let config: AuthConfig = serde_json::from_str(
            r#"{"prefix":"x$","load_failure":"fail_load","storage":{"backend":"file","path":"a.json"}}"#,
        )
        .unwrap();
        assert_eq!(config.load_failure, LoadFailurePolicy::FailLoad);
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("a.json")
            }
        );
    }
}
