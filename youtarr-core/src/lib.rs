//! youtarr-core library crate.
//!
//! Keeps a video catalog in line with the files on disk and groups tracked
//! channels into download batches.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod existence;
pub mod file_check;
pub mod grouping;
pub mod logging;
pub mod reconcile;
pub mod scanner;
pub mod scheduler;
pub mod utils;

pub use error::{Error, Result};
