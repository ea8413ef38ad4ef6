//! Seams to the external collaborators of the lifecycle engine.
mod cluster;
mod directory;
mod file_store;
mod ledger;
mod signer;

pub use cluster::ClusterState;
pub use directory::{SessionDirectory, SubjectProfile};
pub use file_store::TokenFileStore;
pub use ledger::MaterialLedger;
pub use signer::{
    CLAIM_EXPIRY_LEEWAY, CLAIM_RENEWABLE, CLAIM_ROLES, IssueRequest, TokenSigner,
};
