//! Expiry-ordered credential cache.
mod expiry;

pub use expiry::ExpiryCache;
