//! Database access for evreg-ri
//!
//! Query functions over the shared schema created by
//! `evreg_common::db::init_database`, plus the SQLite implementations of
//! the ingestion storage traits.

pub mod ingest_store;
pub mod referrals;
pub mod uploads;
pub mod users;
pub mod watermarks;

pub use ingest_store::{SqliteReferralStore, SqliteUserDirectory};

/// Rows per multi-row statement; keeps bind counts under SQLite's variable limit
pub(crate) const BATCH_SIZE: usize = 100;
