//! Catalog Check Command

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tablewright_common::{AddRowControl, HarnessConfig, TableSchema};

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

/// One registered table as shown by `check`
#[derive(Serialize)]
pub struct TableSummary {
    pub table_id: String,
    pub prefix: String,
    pub columns: usize,
    pub writable: usize,
    pub add_row: String,
    pub row_total: Option<String>,
    pub table_total: Option<String>,
}

impl TableSummary {
    fn new(schema: &TableSchema, prefix: &str) -> Self {
        Self {
            table_id: schema.table_id.clone(),
            prefix: prefix.to_string(),
            columns: schema.columns.len(),
            writable: schema.input_columns().count(),
            add_row: match schema.add_row {
                AddRowControl::PerRow => "per-row".to_string(),
                AddRowControl::Table => "table".to_string(),
            },
            row_total: schema.row_total.clone(),
            table_total: schema.table_total.clone(),
        }
    }
}

impl TableDisplay for TableSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Table", "Prefix", "Columns", "Writable", "Add Row", "Row Total", "Table Total"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.table_id.clone(),
            self.prefix.clone(),
            self.columns.to_string(),
            self.writable.to_string(),
            self.add_row.clone(),
            self.row_total.clone().unwrap_or_else(|| "-".to_string()),
            self.table_total.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

/// Load every schema and register it with a resolver; any collision fails the check
pub fn execute(config: &HarnessConfig, schemas: Option<&Path>, format: OutputFormat) -> Result<()> {
    let catalog = crate::load_catalog(config, schemas)?;
    let resolver = catalog
        .resolver(config.naming.clone())
        .context("schema catalog has ambiguous addresses")?;

    let mut summaries = Vec::new();
    for schema in catalog.iter() {
        let prefix = resolver.prefix(&schema.table_id)?;
        summaries.push(TableSummary::new(schema, prefix));
    }

    print_list(&summaries, format);
    if matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        print_success(&format!("{} tables registered without collisions", summaries.len()));
    }
    Ok(())
}
