//! Migration ledger.
//!
//! SQLite record of per-asset migration progress. It lets a later run:
//! - skip assets that were fully migrated before
//! - report failed, partial and interrupted assets (`status --failed`)
//! - refuse to start while another migration holds the same ledger

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteStateDb, StateDb};
pub use error::StateError;
pub use types::{AssetRecord, AssetStatus, LocationStatus, RunStats, StateSummary};
