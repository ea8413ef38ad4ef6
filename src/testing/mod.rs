//! Test doubles for the trait seams.
//!
//! These mocks live in the library so integration tests and downstream
//! crates can exercise the lifecycle without a real signer, directory,
//! or cluster behind them.

mod mocks;

pub use mocks::{MockSigner, MockTokenFiles, StaticCluster, StaticDirectory};
