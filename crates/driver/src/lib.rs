//! Tablewright Driver
//!
//! Everything that touches a page under test:
//! - [`Page`]: the document handle, implemented by the Playwright bridge and
//!   by an in-memory recording page for tests
//! - [`HumanizedInputChannel`]: paced, event-accurate value entry
//! - [`RowLifecycle`] and [`TableAccessor`]: schema-driven table access
//! - [`Session`]: one page, one resolver, one oracle, one page-object cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Session                                                     │
//! │    ├── PageObjectCache (kind -> instance, reset by group)    │
//! │    │     ├── TableAccessor (one per table)                   │
//! │    │     │     ├── AddressResolver  (pure addressing)        │
//! │    │     │     ├── HumanizedInputChannel (writes, reads)     │
//! │    │     │     └── RowLifecycle (add / remove / count)       │
//! │    │     └── named wrappers (StationaryCombustion, ...)      │
//! │    └── CalculationOracle (findings)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page: PlaywrightPage (node bridge) | MockPage (`mock`)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod fixtures;
pub mod input;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod page;
pub mod playwright;
pub mod report;
pub mod rows;
pub mod session;
pub mod table;
pub mod tables;

pub use cache::{CacheGroup, PageObjectCache};
pub use fixtures::TableFixture;
pub use input::{FieldTarget, HumanizedInputChannel};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPage, MockTable, PageEvent};
pub use page::Page;
pub use playwright::PlaywrightPage;
pub use report::FindingsReport;
pub use rows::RowLifecycle;
pub use session::{PageObject, Session};
pub use table::{EvidenceReceipt, RowSnapshot, TableAccessor};
pub use tablewright_common::{Error, Result};
