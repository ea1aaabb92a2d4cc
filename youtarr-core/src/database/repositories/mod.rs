//! Repository layer for catalog access.
//!
//! The reconciliation and grouping code depend only on these traits; the
//! sqlx implementations are the default catalog store.

pub mod channel;
pub mod video;

pub use channel::*;
pub use video::*;
