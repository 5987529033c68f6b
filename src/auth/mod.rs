pub mod storage;
pub mod token;
pub mod token_store;

pub use storage::{DynTokenStorage, JsonFileStorage, MemoryStorage, TokenStorage};
pub use token::{SdkToken, TokenField, UserId};
pub use token_store::{FieldFailure, PersistReport, SaveOutcome, TokenStore};
