//! Concrete ledger and token file store backends.
mod fs;
mod memory;

pub use fs::FsTokenFileStore;
pub use memory::MemoryLedger;
