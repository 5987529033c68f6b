//! Access-token store for LoopBack SDK clients.
//!
//! [`TokenStore`] keeps one [`SdkToken`] in memory and mirrors it, field by
//! field, to a [`TokenStorage`] backend whenever the user has asked to be
//! remembered. The token is loaded from storage once when the store is
//! created; [`TokenStore::ready`] resolves when that load has settled.
//!
//! ```no_run
//! use std::sync::Arc;
//! use loopback_auth::{AuthConfig, MemoryStorage, SdkToken, TokenStore};
//!
//! # async fn run() -> loopback_auth::AuthResult<()> {
//! let store = TokenStore::new(Arc::new(MemoryStorage::new()), &AuthConfig::default());
//! store.ready().await?;
//!
//! store.set_remember_me(true).await?;
//! store.set_token(SdkToken::new("access-token-id").with_user_id(1)).await?;
//!
//! let token = store.get_token().await?;
//! assert_eq!(token.id.as_deref(), Some("access-token-id"));
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;

#[cfg(test)]
mod tests;

pub use auth::{
    DynTokenStorage, FieldFailure, JsonFileStorage, MemoryStorage, PersistReport, SaveOutcome,
    SdkToken, TokenField, TokenStorage, TokenStore, UserId,
};
pub use config::{AuthConfig, LoadFailurePolicy, StorageConfig, DEFAULT_KEY_PREFIX};
pub use error::{AuthError, AuthResult, StorageError};
