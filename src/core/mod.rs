//! Core types, identifiers, and errors.
mod error;
mod id;
mod record;
mod secure;

pub use error::{CacheError, FileStoreError, LedgerError, MaterializeError, SignerError};
pub use id::{CredentialUsage, MaterialKey, ProjectId, SessionKey, UserId};
pub use record::{PRIVATE_DIR, SessionConfig, SessionCredential, TOKEN_FILE_NAME, TokenClaims};
pub use secure::SecureString;
