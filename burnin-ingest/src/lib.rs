//! burnin-ingest library
//!
//! Moves station output into the intake directories and loads it into the
//! database. Exposed as a library for the binary and integration tests.

pub mod copier;
pub mod csv_files;
pub mod ingest;
pub mod intake;
pub mod matcher;
pub mod watchdog;

pub use copier::{CopyReport, FilteredCopier};
pub use ingest::{IngestReport, Ingester, MAX_BATCH_SIZE};
pub use watchdog::{CycleSummary, Watchdog};
