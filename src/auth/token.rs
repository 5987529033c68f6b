use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthError, AuthResult};

/// Identifier of the user owning a token, which LoopBack models as either a
/// number or a string depending on the datasource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    /// Parse the textual form kept in storage.
    ///
    /// Only canonical integers become numbers, so `"007"` or `"+5"` are kept
    /// as text and written back unchanged.
    pub fn parse(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(number) if number.to_string() == text => UserId::Number(number),
            _ => UserId::Text(text.to_string()),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(number) => write!(f, "{}", number),
            UserId::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId::Number(value)
    }
}

impl From<i32> for UserId {
    fn from(value: i32) -> Self {
        UserId::Number(value.into())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Text(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::Text(value)
    }
}

/// The token attributes that are loaded and persisted one key at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenField {
    Id,
    User,
    UserId,
    IssuedAt,
    Created,
    Ttl,
    RememberMe,
}

impl TokenField {
    /// Every tracked field, in load order
    pub const ALL: [TokenField; 7] = [
        TokenField::Id,
        TokenField::User,
        TokenField::UserId,
        TokenField::IssuedAt,
        TokenField::Created,
        TokenField::Ttl,
        TokenField::RememberMe,
    ];

    /// Name of the field as it appears in storage keys and JSON
    pub fn name(self) -> &'static str {
        match self {
            TokenField::Id => "id",
            TokenField::User => "user",
            TokenField::UserId => "userId",
            TokenField::IssuedAt => "issuedAt",
            TokenField::Created => "created",
            TokenField::Ttl => "ttl",
            TokenField::RememberMe => "rememberMe",
        }
    }

    /// Storage key for this field under the given prefix
    pub fn key(self, prefix: &str) -> String {
        format!("{}{}", prefix, self.name())
    }
}

impl fmt::Display for TokenField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access token record as issued by a LoopBack server.
///
/// Every field is optional: a token starts empty and is filled either from
/// storage or from a login response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkToken {
    /// The access token identifier sent with API requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Application user profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,

    /// The user owning this token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    /// When the server issued the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    /// When the token record was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Time to live in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Whether changes to this token should be written to storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
}

impl SdkToken {
    /// Create a token carrying only an access token id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = Some(remember_me);
        self
    }

    /// Check if no field has been set
    pub fn is_empty(&self) -> bool {
        TokenField::ALL.iter().all(|field| !self.has_field(*field))
    }

    /// Check if the given field holds a value
    pub fn has_field(&self, field: TokenField) -> bool {
        match field {
            TokenField::Id => self.id.is_some(),
            TokenField::User => self.user.is_some(),
            TokenField::UserId => self.user_id.is_some(),
            TokenField::IssuedAt => self.issued_at.is_some(),
            TokenField::Created => self.created.is_some(),
            TokenField::Ttl => self.ttl.is_some(),
            TokenField::RememberMe => self.remember_me.is_some(),
        }
    }

    /// Overwrite every field that is present in `other`, leaving the rest untouched
    pub fn merge(&mut self, other: SdkToken) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.user_id.is_some() {
            self.user_id = other.user_id;
        }
        if other.issued_at.is_some() {
            self.issued_at = other.issued_at;
        }
        if other.created.is_some() {
            self.created = other.created;
        }
        if other.ttl.is_some() {
            self.ttl = other.ttl;
        }
        if other.remember_me.is_some() {
            self.remember_me = other.remember_me;
        }
    }

    /// Deserialize the user profile into an application type
    pub fn user_as<T: DeserializeOwned>(&self) -> AuthResult<Option<T>> {
        match &self.user {
            Some(user) => serde_json::from_value(user.clone())
                .map(Some)
                .map_err(|e| AuthError::decode(TokenField::User.name(), e)),
            None => Ok(None),
        }
    }

    /// Text stored for a field, or `None` when the field is absent.
    ///
    /// Structured values become JSON; strings, numbers and booleans are
    /// written as their plain text.
    pub fn encode_field(&self, field: TokenField) -> AuthResult<Option<String>> {
        let text = match field {
            TokenField::Id => self.id.clone(),
            TokenField::User => match &self.user {
                Some(Value::String(text)) => Some(text.clone()),
                Some(Value::Number(number)) => Some(number.to_string()),
                Some(Value::Bool(flag)) => Some(flag.to_string()),
                Some(structured) => Some(
                    serde_json::to_string(structured)
                        .map_err(|e| AuthError::encode(field.name(), e))?,
                ),
                None => None,
            },
            TokenField::UserId => self.user_id.as_ref().map(UserId::to_string),
            TokenField::IssuedAt => self.issued_at.map(encode_timestamp),
            TokenField::Created => self.created.map(encode_timestamp),
            TokenField::Ttl => self.ttl.map(|ttl| ttl.to_string()),
            TokenField::RememberMe => self.remember_me.map(|flag| flag.to_string()),
        };
        Ok(text)
    }

    /// Set a field from the text kept in storage
    pub fn decode_field(&mut self, field: TokenField, text: &str) -> AuthResult<()> {
        match field {
            TokenField::Id => self.id = Some(text.to_string()),
            TokenField::User => {
                // Plain strings were stored unquoted, so keep them as-is when they are not JSON
                let user = serde_json::from_str(text)
                    .unwrap_or_else(|_| Value::String(text.to_string()));
                self.user = Some(user);
            }
            TokenField::UserId => self.user_id = Some(UserId::parse(text)),
            TokenField::IssuedAt => self.issued_at = Some(decode_timestamp(field, text)?),
            TokenField::Created => self.created = Some(decode_timestamp(field, text)?),
            TokenField::Ttl => {
                let ttl = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| AuthError::decode(field.name(), e))?;
                self.ttl = Some(ttl);
            }
            TokenField::RememberMe => {
                let flag = match text.trim() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(AuthError::decode(
                            field.name(),
                            format!("expected 'true' or 'false', got '{}'", other),
                        ))
                    }
                };
                self.remember_me = Some(flag);
            }
        }
        Ok(())
    }
}

fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 text (optionally JSON-quoted) or epoch milliseconds
fn decode_timestamp(field: TokenField, text: &str) -> AuthResult<DateTime<Utc>> {
    let trimmed = text.trim().trim_matches('"');

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| {
            AuthError::decode(field.name(), format!("'{}' is not a timestamp", trimmed))
        })
}
