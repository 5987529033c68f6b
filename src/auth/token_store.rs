use std::fmt;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::auth::storage::{open_storage, DynTokenStorage};
use crate::auth::token::{SdkToken, TokenField, UserId};
use crate::config::{AuthConfig, LoadFailurePolicy};
use crate::error::{AuthError, AuthResult, StorageError};

/// A field that could not be written to or removed from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: TokenField,
    pub reason: String,
}

/// Per-field result of a persistence operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Fields whose value was written
    pub written: Vec<TokenField>,
    /// Fields whose key was removed
    pub removed: Vec<TokenField>,
    /// Fields the backend rejected
    pub failed: Vec<FieldFailure>,
}

impl PersistReport {
    /// True when every field reached storage
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Names of the fields that failed
    pub fn failed_fields(&self) -> Vec<TokenField> {
        self.failed.iter().map(|failure| failure.field).collect()
    }

    fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (TokenField, Result<FieldWrite, StorageError>)>,
    {
        let mut report = PersistReport::default();
        for (field, result) in results {
            report.record(field, result);
        }
        report
    }

    fn record(&mut self, field: TokenField, result: Result<FieldWrite, StorageError>) {
        match result {
            Ok(FieldWrite::Written) => self.written.push(field),
            Ok(FieldWrite::Removed) => self.removed.push(field),
            Err(e) => self.failed.push(FieldFailure {
                field,
                reason: e.to_string(),
            }),
        }
    }
}

/// Result of [`TokenStore::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// rememberMe is not enabled in storage, nothing was written
    Skipped,
    /// Every field was sent to storage
    Persisted(PersistReport),
}

impl SaveOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, SaveOutcome::Persisted(_))
    }

    pub fn report(&self) -> Option<&PersistReport> {
        match self {
            SaveOutcome::Persisted(report) => Some(report),
            SaveOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldWrite {
    Written,
    Removed,
}

type LoadFuture = Shared<BoxFuture<'static, AuthResult<SdkToken>>>;

/// Holds the current access token and mirrors it to storage when the user
/// asked to be remembered.
///
/// Construction starts loading every tracked field from storage. Until that
/// load settles nothing about the token is handed out: [`ready`](Self::ready)
/// and [`get_token`](Self::get_token) wait for it, and the setters wait for it
/// before applying their change.
///
/// Clones are handles onto the same token.
#[derive(Clone)]
pub struct TokenStore {
    /// Backend the token is mirrored to
    storage: DynTokenStorage,
    /// Namespace for every key
    prefix: Arc<str>,
    /// The one in-memory token
    token: Arc<RwLock<SdkToken>>,
    /// One-shot initial load, replayed to every awaiting caller
    loaded: LoadFuture,
}

impl TokenStore {
    /// Create a store over `storage` and start the initial load.
    ///
    /// Inside a tokio runtime the load is spawned immediately; otherwise it
    /// runs the first time something waits on it.
    pub fn new(storage: DynTokenStorage, config: &AuthConfig) -> Self {
        let prefix: Arc<str> = Arc::from(config.prefix.as_str());
        let token = Arc::new(RwLock::new(SdkToken::default()));

        let loaded = load_token(
            Arc::clone(&storage),
            Arc::clone(&prefix),
            config.load_failure,
            Arc::clone(&token),
        )
        .boxed()
        .shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(loaded.clone());
        }

        Self {
            storage,
            prefix,
            token,
            loaded,
        }
    }

    /// Open the configured backend and create a store over it
    pub async fn open(config: &AuthConfig) -> AuthResult<Self> {
        let storage = open_storage(&config.storage).await?;
        Ok(Self::new(storage, config))
    }

    /// Prefix placed in front of every storage key
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key for a tracked field
    pub fn key(&self, field: TokenField) -> String {
        field.key(&self.prefix)
    }

    /// The token as it was loaded from storage.
    ///
    /// The load happens once; every call, before or after it settles, gets
    /// the same result.
    pub async fn ready(&self) -> AuthResult<SdkToken> {
        self.loaded.clone().await
    }

    /// Current in-memory token, once the initial load has settled
    pub async fn get_token(&self) -> AuthResult<SdkToken> {
        self.ready().await?;
        Ok(self.token.read().await.clone())
    }

    /// Access token id as currently held in storage
    pub async fn get_access_token_id(&self) -> AuthResult<Option<String>> {
        self.read_key(TokenField::Id).await
    }

    /// User id as currently held in storage
    pub async fn get_current_user_id(&self) -> AuthResult<Option<UserId>> {
        Ok(self
            .read_key(TokenField::UserId)
            .await?
            .map(|text| UserId::parse(&text)))
    }

    /// rememberMe flag as currently held in storage
    pub async fn get_remember_me(&self) -> AuthResult<Option<bool>> {
        let mut scratch = SdkToken::default();
        match self.read_key(TokenField::RememberMe).await? {
            Some(text) => {
                scratch.decode_field(TokenField::RememberMe, &text)?;
                Ok(scratch.remember_me)
            }
            None => Ok(None),
        }
    }

    /// User profile as currently held in storage, parsed as JSON
    pub async fn get_current_user_data(&self) -> AuthResult<Option<Value>> {
        let key = self.key(TokenField::User);
        match self.read_key(TokenField::User).await? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| AuthError::decode(key, e)),
            None => Ok(None),
        }
    }

    /// User profile from storage, deserialized into an application type
    pub async fn get_current_user_data_as<T: DeserializeOwned>(&self) -> AuthResult<Option<T>> {
        match self.get_current_user_data().await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AuthError::decode(self.key(TokenField::User), e)),
            None => Ok(None),
        }
    }

    /// Replace the user profile and save
    pub async fn set_user<U: Serialize>(&self, user: U) -> AuthResult<SaveOutcome> {
        let user = serde_json::to_value(user)
            .map_err(|e| AuthError::encode(TokenField::User.name(), e))?;

        self.settle().await;
        self.token.write().await.user = Some(user);
        self.save().await
    }

    /// Merge the present fields of `token` into the current token and save
    pub async fn set_token(&self, token: SdkToken) -> AuthResult<SaveOutcome> {
        self.settle().await;
        self.token.write().await.merge(token);
        self.save().await
    }

    /// Turn persistence on or off.
    ///
    /// The flag is written to storage whatever its value, since it is what
    /// later saves consult.
    pub async fn set_remember_me(&self, remember_me: bool) -> AuthResult<PersistReport> {
        self.settle().await;
        self.token.write().await.remember_me = Some(remember_me);

        let (field, result) = self
            .persist_field(TokenField::RememberMe, Some(remember_me.to_string()))
            .await;
        info!(remember_me, "Updated rememberMe");

        Ok(PersistReport::from_results([(field, result)]))
    }

    /// Write every tracked field to storage if rememberMe is enabled there.
    ///
    /// Absent fields have their key removed. A field the backend rejects is
    /// logged and reported in the outcome; the other fields are still written.
    pub async fn save(&self) -> AuthResult<SaveOutcome> {
        let remember_me = match self.get_remember_me().await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) if e.is_decode() => {
                warn!(error = %e, "Stored rememberMe is unreadable, not saving");
                false
            }
            Err(e) => return Err(e),
        };

        if !remember_me {
            debug!("rememberMe not enabled, token kept in memory only");
            return Ok(SaveOutcome::Skipped);
        }

        // Memory follows the stored flag that let this save through
        let snapshot = {
            let mut token = self.token.write().await;
            token.remember_me = Some(true);
            token.clone()
        };
        let encoded = TokenField::ALL
            .into_iter()
            .map(|field| snapshot.encode_field(field).map(|text| (field, text)))
            .collect::<AuthResult<Vec<_>>>()?;

        let writes = encoded
            .into_iter()
            .map(|(field, text)| self.persist_field(field, text));
        let report = PersistReport::from_results(join_all(writes).await);

        if report.is_complete() {
            info!(
                written = report.written.len(),
                removed = report.removed.len(),
                "Token saved to storage"
            );
        } else {
            warn!(failed = ?report.failed_fields(), "Token partially saved to storage");
        }

        Ok(SaveOutcome::Persisted(report))
    }

    /// Remove every tracked key from storage and empty the in-memory token
    pub async fn clear(&self) -> AuthResult<PersistReport> {
        self.settle().await;

        let removals = TokenField::ALL
            .into_iter()
            .map(|field| self.persist_field(field, None));
        let report = PersistReport::from_results(join_all(removals).await);

        *self.token.write().await = SdkToken::default();

        if report.is_complete() {
            info!("Token cleared from storage");
        } else {
            warn!(failed = ?report.failed_fields(), "Token cleared with storage failures");
        }

        Ok(report)
    }

    /// Wait for the initial load so it cannot overwrite a newer change
    async fn settle(&self) {
        if let Err(e) = self.ready().await {
            debug!(error = %e, "Initial load failed, continuing with an empty token");
        }
    }

    async fn read_key(&self, field: TokenField) -> AuthResult<Option<String>> {
        let key = self.key(field);
        let value = self
            .storage
            .get(&key)
            .await
            .map_err(|e| AuthError::storage(key.clone(), e))?;

        debug!(key = %key, found = value.is_some(), "Read token field from storage");
        Ok(value)
    }

    /// Write `value` under the field's key, or remove the key when it is `None`
    async fn persist_field(
        &self,
        field: TokenField,
        value: Option<String>,
    ) -> (TokenField, Result<FieldWrite, StorageError>) {
        let key = self.key(field);
        let result = match value {
            Some(text) => self.storage.set(&key, text).await.map(|_| FieldWrite::Written),
            None => self.storage.remove(&key).await.map(|_| FieldWrite::Removed),
        };

        match &result {
            Ok(write) => debug!(key = %key, result = ?write, "Persisted token field"),
            Err(e) => error!(key = %key, error = %e, "Cannot access token storage"),
        }

        (field, result)
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Read every tracked field concurrently and install the result as the
/// in-memory token
async fn load_token(
    storage: DynTokenStorage,
    prefix: Arc<str>,
    policy: LoadFailurePolicy,
    token: Arc<RwLock<SdkToken>>,
) -> AuthResult<SdkToken> {
    debug!(prefix = %prefix, "Loading token from storage");

    let storage = &storage;
    let reads = TokenField::ALL.into_iter().map(|field| {
        let key = field.key(&prefix);
        async move {
            let result = storage.get(&key).await;
            (field, key, result)
        }
    });

    let mut loaded = SdkToken::default();
    for (field, key, result) in join_all(reads).await {
        let decoded = match result {
            Ok(Some(text)) => loaded.decode_field(field, &text),
            Ok(None) => continue,
            Err(e) => Err(AuthError::storage(key.clone(), e)),
        };

        if let Err(e) = decoded {
            match policy {
                LoadFailurePolicy::AbsentOnFailure => {
                    warn!(key = %key, error = %e, "Could not load token field, treating it as absent");
                }
                LoadFailurePolicy::FailLoad => {
                    error!(key = %key, error = %e, "Could not load token field");
                    return Err(AuthError::LoadFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    *token.write().await = loaded.clone();

    info!(
        has_access_token = loaded.id.is_some(),
        remember_me = ?loaded.remember_me,
        "Token loaded from storage"
    );
    Ok(loaded)
}
