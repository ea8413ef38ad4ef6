use crate::traits::{
    CLAIM_EXPIRY_LEEWAY, CLAIM_RENEWABLE, CLAIM_ROLES, IssueRequest, SubjectProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use std::path::PathBuf;
use std::time::Duration;

/// Fixed issuance policy for session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Name of the signing key used for issuance.
    pub signing_key_name: String,

    /// Issuer identity baked into every token.
    pub issuer: String,

    /// Audiences tokens are valid for.
    pub audience: Vec<String>,

    /// Signature algorithm name.
    pub algorithm: String,

    /// Token lifetime.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Clock-skew leeway granted by verifiers, carried as a claim.
    #[serde(with = "humantime_serde")]
    pub expiry_leeway: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            signing_key_name: "session-signing-key".to_string(),
            issuer: "sandbox".to_string(),
            audience: vec!["api".to_string()],
            algorithm: "HS512".to_string(),
            lifetime: Duration::from_secs(3600),
            expiry_leeway: Duration::from_secs(60),
        }
    }
}

impl TokenPolicy {
    /// Token lifetime as a chrono duration.
    pub fn lifetime_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lifetime).unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Delay between marking signing keys superseded and purging them:
    /// `2 * (lifetime + expiry leeway)`, so every token signed with a
    /// marked key has expired (plus skew) before the key disappears.
    pub fn purge_safety_window(&self) -> Duration {
        (self.lifetime + self.expiry_leeway) * 2
    }

    /// Build the issuance request for a subject. Session tokens are never
    /// holder-renewable; only the renewal sweep extends them.
    pub fn issue_request(
        &self,
        profile: &SubjectProfile,
        expires_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> IssueRequest {
        let mut claims = Map::new();
        claims.insert(CLAIM_RENEWABLE.to_string(), json!(false));
        claims.insert(
            CLAIM_EXPIRY_LEEWAY.to_string(),
            json!(self.expiry_leeway.as_secs()),
        );
        claims.insert(CLAIM_ROLES.to_string(), json!(profile.roles));

        IssueRequest {
            signing_key_name: self.signing_key_name.clone(),
            renewable: false,
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            expires_at,
            issued_at,
            subject: profile.username.clone(),
            claims,
            algorithm: self.algorithm.clone(),
        }
    }
}

/// Timing and filesystem configuration of the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Staging directory token paths derive from.
    pub staging_dir: PathBuf,

    /// Records within this lead time of expiry are renewed by the sweep.
    #[serde(with = "humantime_serde")]
    pub renew_lead_time: Duration,

    /// Delay before the first renewal sweep after startup.
    #[serde(with = "humantime_serde")]
    pub renewal_initial_delay: Duration,

    /// Interval between renewal sweeps.
    #[serde(with = "humantime_serde")]
    pub renewal_interval: Duration,

    /// Interval between signing-key rotation cycles.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,

    /// Bound on writer-lock and service-gate acquisition; operations fail
    /// rather than block past it.
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/srv/sandbox/staging"),
            renew_lead_time: Duration::from_secs(60),
            renewal_initial_delay: Duration::from_secs(1),
            renewal_interval: Duration::from_secs(5),
            rotation_interval: Duration::from_secs(24 * 3600),
            lock_timeout: Duration::from_secs(2),
        }
    }
}

impl LifecycleConfig {
    /// Renewal lead time as a chrono duration.
    pub fn renew_lead_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.renew_lead_time)
            .unwrap_or_else(|_| chrono::Duration::zero())
    }
}
