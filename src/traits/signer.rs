use crate::core::{SignerError, TokenClaims};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Claim marking whether a token may be renewed by its holder.
pub const CLAIM_RENEWABLE: &str = "renewable";
/// Claim carrying the expiry leeway in seconds granted by verifiers.
pub const CLAIM_EXPIRY_LEEWAY: &str = "expLeeway";
/// Claim carrying the subject's roles.
pub const CLAIM_ROLES: &str = "roles";

/// Everything the signer needs to issue one token.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Name of the signing key to use.
    pub signing_key_name: String,
    /// Whether the holder may renew the token itself.
    pub renewable: bool,
    /// Issuer identity baked into the token.
    pub issuer: String,
    /// Audiences the token is valid for.
    pub audience: Vec<String>,
    /// Expiry of the token.
    pub expires_at: DateTime<Utc>,
    /// Issuance instant.
    pub issued_at: DateTime<Utc>,
    /// Subject identity the token asserts.
    pub subject: String,
    /// Additional claims.
    pub claims: Map<String, Value>,
    /// Signature algorithm name.
    pub algorithm: String,
}

/// The opaque token signing primitive.
///
/// This engine never inspects token internals beyond what [`verify`]
/// returns; issuing, verification, renewal, invalidation, and the signing
/// key store all live behind this seam.
///
/// [`verify`]: TokenSigner::verify
#[async_trait]
pub trait TokenSigner: Send + Sync {
    /// Issue a signed token.
    async fn issue(&self, request: &IssueRequest) -> Result<String, SignerError>;

    /// Verify signature and expiry of a token against the expected issuer
    /// and return its decoded claims.
    async fn verify(&self, token: &str, issuer: &str) -> Result<TokenClaims, SignerError>;

    /// Renew a token: same subject, new expiry.
    ///
    /// The old token is invalidated by the signer as part of renewal;
    /// callers must not use it afterwards.
    async fn renew(
        &self,
        token: &str,
        new_expires_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
        renewable: bool,
        extra_claims: Map<String, Value>,
    ) -> Result<String, SignerError>;

    /// Invalidate a token so it no longer verifies.
    async fn invalidate(&self, token: &str) -> Result<(), SignerError>;

    /// Mark currently active signing keys as superseded. Returns whether
    /// any key was newly marked. Already-marked keys stay marked until
    /// [`remove_marked_keys`](TokenSigner::remove_marked_keys) succeeds.
    async fn mark_old_signing_keys(&self) -> Result<bool, SignerError>;

    /// Purge all keys marked for deletion.
    async fn remove_marked_keys(&self) -> Result<(), SignerError>;
}
