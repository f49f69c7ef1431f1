//! Findings Report Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tablewright_common::{CalculationMismatch, CheckKind};
use tablewright_driver::FindingsReport;

use crate::output::{
    print_error, print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay,
};

#[derive(Args)]
pub struct FindingsArgs {
    /// Path to a findings-<session>.json report
    pub report: PathBuf,

    /// Only show findings for this table
    #[arg(short, long)]
    pub table: Option<String>,

    /// Exit with status 1 when any finding is present
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize)]
pub struct FindingDisplay {
    pub table_id: String,
    pub row: Option<usize>,
    pub check: CheckKind,
    pub expected: f64,
    pub observed: String,
    pub partial_input: bool,
}

impl From<&CalculationMismatch> for FindingDisplay {
    fn from(m: &CalculationMismatch) -> Self {
        Self {
            table_id: m.table_id.clone(),
            row: m.row,
            check: m.check,
            expected: m.expected,
            observed: m.observed_raw.clone(),
            partial_input: m.partial_input,
        }
    }
}

impl TableDisplay for FindingDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Table", "Row", "Check", "Expected", "Observed", "Partial Input"]
    }

    fn row(&self) -> Vec<String> {
        let check = match self.check {
            CheckKind::RowTotal => "row total",
            CheckKind::SingleRowTableTotal => "single-row table total",
            CheckKind::TableSum => "table sum",
        };
        vec![
            self.table_id.clone(),
            self.row.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            check.to_string(),
            format!("{:.2}", self.expected),
            if self.observed.is_empty() { "(empty)".to_string() } else { self.observed.clone() },
            if self.partial_input { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub fn execute(args: FindingsArgs, format: OutputFormat) -> Result<()> {
    let report = FindingsReport::load(&args.report)
        .with_context(|| format!("reading {}", args.report.display()))?;

    let items: Vec<FindingDisplay> = match &args.table {
        Some(table) => report.for_table(table).map(FindingDisplay::from).collect(),
        None => report.findings.iter().map(FindingDisplay::from).collect(),
    };

    if !matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        print_list(&items, format);
        return finish(&items, args.strict);
    }

    print_info(&format!(
        "session {} ({} checks, generated {})",
        report.session_id,
        report.checks,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if items.is_empty() {
        print_success("no calculation findings");
        return Ok(());
    }

    print_list(&items, format);
    let partial = items.iter().filter(|f| f.partial_input).count();
    print_warning(&format!(
        "{} finding(s), {} likely from partially landed input",
        items.len(),
        partial
    ));
    finish(&items, args.strict)
}

fn finish(items: &[FindingDisplay], strict: bool) -> Result<()> {
    if strict && !items.is_empty() {
        print_error(&format!("{} calculation finding(s)", items.len()));
        std::process::exit(1);
    }
    Ok(())
}
