//! # migshift-engine
//!
//! Inspect and rewrite the applied/pending state of a timestamped migration
//! history. The central operation is "bring to top": give one migration a
//! version above every other, rename its script and move its ledger entry
//! so that its applied state survives the move.

pub mod error;
pub mod migrations;

pub use error::*;
pub use migrations::*;
