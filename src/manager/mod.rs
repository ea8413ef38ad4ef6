//! Materialization, recovery, and renewal of session credentials.
mod materializer;
mod policy;
mod recovery;
mod renewal;

pub use materializer::CredentialMaterializer;
pub use policy::{LifecycleConfig, TokenPolicy};
pub use recovery::{RecoveryProcess, RecoveryReport};
pub use renewal::RenewalScheduler;
