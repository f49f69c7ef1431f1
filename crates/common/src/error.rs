//! Error types for Tablewright

use std::fmt;

use thiserror::Error;

/// Result type alias using the Tablewright error
pub type Result<T> = std::result::Result<T, Error>;

/// Element state a page wait can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    #[default]
    Attached,
    Visible,
    Hidden,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Attached => "attached",
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Detached => "detached",
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failing operation was pointed: table, column, row and the last address tried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locus {
    pub table_id: String,
    pub column: Option<String>,
    pub row: Option<usize>,
    pub address: Option<String>,
}

impl Locus {
    pub fn table(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_row(mut self, row: Option<usize>) -> Self {
        self.row = row;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table={}", self.table_id)?;
        if let Some(column) = &self.column {
            write!(f, " column={}", column)?;
        }
        if let Some(row) = self.row {
            write!(f, " row={}", row)?;
        }
        if let Some(address) = &self.address {
            write!(f, " address={}", address)?;
        }
        Ok(())
    }
}

/// Tablewright error types
#[derive(Error, Debug)]
pub enum Error {
    /// The addressed element did not attach within the bounded wait
    #[error("Element not ready after {waited_ms} ms: {locus}")]
    ElementNotReady { locus: Locus, waited_ms: u64 },

    /// The table's row count did not change as expected within the timeout
    #[error("Row mutation timed out after {timeout_ms} ms ({locus}): {before} row(s) before, {observed} observed")]
    RowMutationTimeout {
        locus: Locus,
        before: usize,
        observed: usize,
        timeout_ms: u64,
    },

    /// Programming error in the calling scenario or schema usage
    #[error("Invalid operation ({locus}): {reason}")]
    InvalidOperation { locus: Locus, reason: String },

    /// Two registered schemas (or two columns of one) would produce colliding addresses
    #[error("Ambiguous address for table {table_id}: {reason}")]
    AmbiguousAddress { table_id: String, reason: String },

    /// Raw page-level wait expiry, before the caller attaches table context
    #[error("Timed out after {timeout_ms} ms waiting for {address} to be {state}")]
    WaitTimeout {
        address: String,
        state: WaitState,
        timeout_ms: u64,
    },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn invalid(locus: Locus, reason: impl Into<String>) -> Self {
        Error::InvalidOperation {
            locus,
            reason: reason.into(),
        }
    }

    pub fn ambiguous(table_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::AmbiguousAddress {
            table_id: table_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the current scenario step
    pub fn is_step_fatal(&self) -> bool {
        matches!(
            self,
            Error::ElementNotReady { .. }
                | Error::RowMutationTimeout { .. }
                | Error::InvalidOperation { .. }
                | Error::WaitTimeout { .. }
                | Error::Driver(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locus_display_includes_all_parts() {
        let locus = Locus::table("stationary_combustion")
            .with_column("fuel")
            .with_row(Some(2))
            .with_address(r#"[id="stacom_fuel_2"]"#);
        assert_eq!(
            locus.to_string(),
            r#"table=stationary_combustion column=fuel row=2 address=[id="stacom_fuel_2"]"#
        );
    }

    #[test]
    fn element_not_ready_message_names_table_and_row() {
        let err = Error::ElementNotReady {
            locus: Locus::table("waste").with_column("mass").with_row(Some(0)),
            waited_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("waste"));
        assert!(msg.contains("row=0"));
        assert!(err.is_step_fatal());
    }
}
