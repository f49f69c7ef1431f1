//! Live Page Probe Command

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use tablewright_common::{HarnessConfig, SchemaCatalog};
use tablewright_driver::{Page, PlaywrightPage, Session};
use tracing::{info, warn};

use crate::output::{print_info, print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ProbeArgs {
    /// Table id
    pub table: String,

    /// Page to open (relative to `browser.base_url` or absolute)
    #[arg(long)]
    pub url: Option<String>,

    /// Read at most this many rows
    #[arg(long, default_value_t = 20)]
    pub max_rows: usize,
}

#[derive(Serialize)]
pub struct ProbedRow {
    pub row: usize,
    pub values: Vec<(String, String)>,
}

impl TableDisplay for ProbedRow {
    fn headers() -> Vec<&'static str> {
        vec!["Row", "Values"]
    }

    fn row(&self) -> Vec<String> {
        let values = self
            .values
            .iter()
            .map(|(column, value)| format!("{column}={value}"))
            .collect::<Vec<_>>()
            .join("  ");
        vec![self.row.to_string(), values]
    }
}

pub async fn execute(
    args: ProbeArgs,
    config: &HarnessConfig,
    schemas: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let catalog = crate::load_catalog(config, schemas)?;
    if catalog.get(&args.table).is_none() {
        bail!("unknown table '{}'", args.table);
    }

    let page = Arc::new(
        PlaywrightPage::launch(&config.browser)
            .await
            .context("launching browser")?,
    );
    let result = probe(&page, &args, &catalog, config).await;
    if let Err(e) = page.close().await {
        warn!("browser did not close cleanly: {}", e);
    }
    let (rows, total) = result?;

    print_list(&rows, format);
    if let Some(total) = total {
        print_info(&format!("table total: {}", total));
    }
    Ok(())
}

async fn probe(
    page: &Arc<PlaywrightPage>,
    args: &ProbeArgs,
    catalog: &SchemaCatalog,
    config: &HarnessConfig,
) -> Result<(Vec<ProbedRow>, Option<String>)> {
    if let Some(url) = &args.url {
        page.navigate(url).await?;
    }

    let dyn_page: Arc<dyn Page> = page.clone();
    let mut session = Session::new(dyn_page, catalog, config.clone())?;
    let table = session.table(&args.table)?;

    let count = table.row_count().await?;
    info!("{} has {} row(s)", args.table, count);

    let columns: Vec<String> = table.schema().columns.iter().map(|c| c.name.clone()).collect();
    let mut rows = Vec::new();
    for row in 0..count.min(args.max_rows) {
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            values.push((column.clone(), table.get_field(column, row).await?));
        }
        rows.push(ProbedRow { row, values });
    }

    let total = if table.schema().table_total.is_some() {
        Some(table.table_total().await?)
    } else {
        None
    };
    Ok((rows, total))
}
