//! Domain types derived from catalog rows.

pub mod signature;

pub use signature::FilterSignature;
