//! Referral CSV ingestion
//!
//! Sources (CSV files or uploaded buffers) are parsed into header-keyed
//! records, filtered by a per-source watermark, validated against the user
//! directory and committed to the referral store together with the advanced
//! watermark.

pub mod error;
pub mod fields;
pub mod locks;
pub mod reconciler;
pub mod records;
pub mod sources;
pub mod store;
pub mod summary;

pub use error::IngestError;
pub use locks::{SourceGuard, SourceLocks};
pub use reconciler::ReferralReconciler;
pub use records::{parse_records, CsvRecord, ParseError};
pub use sources::{enumerate_directory, Source, CSV_EXTENSION};
pub use store::{CommitOutcome, ReferralStore, SourceCommit, UserDirectory};
pub use summary::{IngestionSummary, SourceFailure, SourceReport};
