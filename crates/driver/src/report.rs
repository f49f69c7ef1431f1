//! Findings report
//!
//! Calculation mismatches never fail a step; they are collected by the oracle
//! and written out at the end of a session as pretty-printed JSON.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tablewright_common::{CalculationMismatch, CalculationOracle, Result};
use tracing::info;
use uuid::Uuid;

/// Checks run and mismatches found during one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingsReport {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub checks: usize,
    pub findings: Vec<CalculationMismatch>,
}

impl FindingsReport {
    pub fn from_oracle(session_id: Uuid, oracle: &CalculationOracle) -> Self {
        Self {
            session_id,
            generated_at: Utc::now(),
            checks: oracle.checks(),
            findings: oracle.findings().to_vec(),
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    /// Findings whose observed total was empty or zero
    pub fn partial_input_count(&self) -> usize {
        self.findings.iter().filter(|f| f.partial_input).count()
    }

    /// Findings recorded against one table
    pub fn for_table<'a>(&'a self, table_id: &'a str) -> impl Iterator<Item = &'a CalculationMismatch> {
        self.findings.iter().filter(move |f| f.table_id == table_id)
    }

    /// Write the report into `dir` as `findings-<session>.json`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("findings-{}.json", self.session_id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Findings written to: {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
