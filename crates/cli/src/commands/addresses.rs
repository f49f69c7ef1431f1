//! Address Listing Command

use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tablewright_common::HarnessConfig;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct AddressesArgs {
    /// Table id
    pub table: String,

    /// Row index used for row-scoped columns
    #[arg(short, long, default_value_t = 0)]
    pub row: usize,
}

#[derive(Serialize)]
pub struct AddressDisplay {
    pub name: String,
    pub kind: String,
    pub scope: String,
    pub address: String,
}

impl TableDisplay for AddressDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Kind", "Scope", "Address"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.kind.clone(),
            self.scope.clone(),
            self.address.clone(),
        ]
    }
}

pub fn execute(
    args: AddressesArgs,
    config: &HarnessConfig,
    schemas: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let catalog = crate::load_catalog(config, schemas)?;
    let resolver = catalog.resolver(config.naming.clone())?;
    let Some(schema) = catalog.get(&args.table) else {
        bail!("unknown table '{}'", args.table);
    };

    let row_scope = format!("row {}", args.row);
    let mut items = Vec::new();
    for column in &schema.columns {
        items.push(AddressDisplay {
            name: column.name.clone(),
            kind: format!("{:?}", column.kind),
            scope: row_scope.clone(),
            address: resolver.cell(&schema.table_id, &column.name, args.row)?.into_string(),
        });
    }
    if let Some(evidence) = &schema.evidence {
        items.push(AddressDisplay {
            name: evidence.clone(),
            kind: "Evidence".to_string(),
            scope: row_scope.clone(),
            address: resolver.cell(&schema.table_id, evidence, args.row)?.into_string(),
        });
    }
    if let Some(total) = &schema.table_total {
        items.push(AddressDisplay {
            name: total.clone(),
            kind: "TableTotal".to_string(),
            scope: "table".to_string(),
            address: resolver.table_total(&schema.table_id)?.into_string(),
        });
    }
    items.push(AddressDisplay {
        name: "add row".to_string(),
        kind: "Control".to_string(),
        scope: row_scope.clone(),
        address: resolver.add_row_control(&schema.table_id, args.row)?.into_string(),
    });
    items.push(AddressDisplay {
        name: "remove row".to_string(),
        kind: "Control".to_string(),
        scope: row_scope,
        address: resolver.remove_row_control(&schema.table_id, args.row)?.into_string(),
    });
    items.push(AddressDisplay {
        name: "rows".to_string(),
        kind: "Marker".to_string(),
        scope: "table".to_string(),
        address: resolver.row_markers(&schema.table_id)?.into_string(),
    });

    print_list(&items, format);
    Ok(())
}
