//! Scenario fixtures
//!
//! A fixture is a table id plus plain key-value rows, loaded from YAML or
//! JSON. Values may be written as strings or bare scalars; they are entered as
//! their string form.
//!
//! ```yaml
//! table_id: stationary_combustion
//! rows:
//!   - { fuel: Diesel, emission_factor: 2.68, consumption: 100 }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tablewright_common::{Error, Result};
use tracing::{debug, info};

use crate::table::{RowSnapshot, TableAccessor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Flag(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    table_id: String,
    #[serde(default)]
    rows: Vec<BTreeMap<String, Scalar>>,
}

/// Rows to enter into one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFixture {
    pub table_id: String,
    pub rows: Vec<RowSnapshot>,
}

impl From<RawFixture> for TableFixture {
    fn from(raw: RawFixture) -> Self {
        Self {
            table_id: raw.table_id,
            rows: raw
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(|(k, v)| (k, v.to_string())).collect())
                .collect(),
        }
    }
}

impl TableFixture {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawFixture = serde_yaml::from_str(content)?;
        Ok(raw.into())
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawFixture = serde_json::from_str(content)?;
        Ok(raw.into())
    }

    /// Load a fixture, choosing the parser by file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "fixture {} is neither YAML nor JSON",
                    path.display()
                )))
            }
        };
        debug!(table = %fixture.table_id, rows = fixture.rows.len(), "Loaded fixture {}", path.display());
        Ok(fixture)
    }

    /// Enter every row, adding rows below the last one as needed.
    ///
    /// Returns the row index each fixture row was entered into. A table with
    /// per-row add controls needs at least one rendered row to grow from.
    pub async fn populate(&self, table: &TableAccessor) -> Result<Vec<usize>> {
        if table.table_id() != self.table_id {
            return Err(Error::InvalidConfig(format!(
                "fixture for {} applied to table {}",
                self.table_id,
                table.table_id()
            )));
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for (i, values) in self.rows.iter().enumerate() {
            let row = if i < table.row_count().await? {
                i
            } else {
                table.add_row(i.saturating_sub(1)).await?
            };
            table.fill_row(row, values).await?;
            rows.push(row);
        }

        info!(table = %self.table_id, rows = rows.len(), "Fixture entered");
        Ok(rows)
    }
}
