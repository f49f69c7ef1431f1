//! Tablewright Common Library
//!
//! Pure building blocks shared by the driver and the CLI: table schemas,
//! convention-based address resolution, the calculation oracle, harness
//! configuration and the error taxonomy. Nothing in this crate touches a page.

pub mod address;
pub mod catalog;
pub mod config;
pub mod error;
pub mod oracle;
pub mod schema;

// Re-export commonly used types
pub use address::{normalize_name, Address, AddressResolver, NamingConvention};
pub use catalog::SchemaCatalog;
pub use config::{HarnessConfig, PacingProfile, Timeouts};
pub use error::{Error, Locus, Result, WaitState};
pub use oracle::{CalculationMismatch, CalculationOracle, CheckKind, NumberFormat, Verdict};
pub use schema::{AddRowControl, ColumnDef, ColumnKind, CommitTrigger, TableSchema, TriggerPolicy};

/// Tablewright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
