//! Table schema catalog
//!
//! Holds the built-in schemas for the reporting application's data-entry
//! tables plus any schemas loaded from a directory of YAML files.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::address::{AddressResolver, NamingConvention};
use crate::error::{Error, Result};
use crate::schema::{AddRowControl, ColumnDef, CommitTrigger, TableSchema, TriggerPolicy};

pub const STATIONARY_COMBUSTION: &str = "stationary_combustion";
pub const MOBILE_COMBUSTION: &str = "mobile_combustion";
pub const REFRIGERANTS: &str = "refrigerants";
pub const PURCHASED_ELECTRICITY: &str = "purchased_electricity";
pub const WASTE: &str = "waste";
pub const BUSINESS_TRAVEL: &str = "business_travel";

/// Ordered collection of table schemas keyed by table id
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, TableSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the application's built-in tables
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for schema in builtin_schemas() {
            catalog.schemas.insert(schema.table_id.clone(), schema);
        }
        catalog
    }

    /// Add a schema; a second schema with the same id is ambiguous
    pub fn insert(&mut self, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        if self.schemas.contains_key(&schema.table_id) {
            return Err(Error::ambiguous(
                &schema.table_id,
                "table id declared more than once in the catalog",
            ));
        }
        self.schemas.insert(schema.table_id.clone(), schema);
        Ok(())
    }

    /// Load every `.yaml`/`.yml` schema below a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading table schema {}", entry.path().display());
            let schema = TableSchema::from_file(entry.path())?;
            self.insert(schema)?;
            loaded += 1;
        }

        info!("Loaded {} table schema(s) from {}", loaded, dir.display());
        Ok(loaded)
    }

    pub fn get(&self, table_id: &str) -> Option<&TableSchema> {
        self.schemas.get(table_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Register every schema with a fresh resolver; fails on the first ambiguity
    pub fn resolver(&self, convention: NamingConvention) -> Result<AddressResolver> {
        let mut resolver = AddressResolver::new(convention);
        resolver.register_all(self.iter())?;
        Ok(resolver)
    }
}

fn emission_columns(activity: ColumnDef) -> Vec<ColumnDef> {
    vec![
        activity,
        ColumnDef::numeric("emission_factor"),
        ColumnDef::numeric("consumption"),
        ColumnDef::select("units"),
        ColumnDef::computed("emissions"),
    ]
}

fn emission_table(table_id: &str, title: &str, prefix: &str, activity: ColumnDef) -> TableSchema {
    let mut schema = TableSchema::new(table_id)
        .titled(title)
        .with_prefix(prefix)
        .with_row_total("emissions")
        .with_table_total("total_emissions")
        .with_evidence("evidence");
    schema.columns = emission_columns(activity);
    schema
}

/// Schemas of the reporting application's emission tables
pub fn builtin_schemas() -> Vec<TableSchema> {
    vec![
        emission_table(
            STATIONARY_COMBUSTION,
            "Stationary combustion",
            "stacom",
            ColumnDef::autocomplete("fuel"),
        ),
        emission_table(
            MOBILE_COMBUSTION,
            "Mobile combustion",
            "mobcom",
            ColumnDef::select("fuel"),
        )
        .column_inserted(0, ColumnDef::text("vehicle")),
        emission_table(
            REFRIGERANTS,
            "Refrigerants and fugitive gases",
            "refrig",
            ColumnDef::autocomplete("gas"),
        )
        .with_add_row(AddRowControl::Table),
        emission_table(
            PURCHASED_ELECTRICITY,
            "Purchased electricity",
            "elec",
            ColumnDef::text("site"),
        ),
        emission_table(WASTE, "Waste", "waste", ColumnDef::select("treatment")),
        emission_table(
            BUSINESS_TRAVEL,
            "Business travel",
            "travel",
            ColumnDef::autocomplete("route").with_trigger(TriggerPolicy::PacedWithAutocomplete {
                commit: CommitTrigger::Enter,
            }),
        ),
    ]
}

impl TableSchema {
    fn column_inserted(mut self, index: usize, column: ColumnDef) -> Self {
        self.columns.insert(index, column);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_registers_cleanly() {
        let catalog = SchemaCatalog::builtin();
        assert_eq!(catalog.len(), 6);
        let resolver = catalog.resolver(NamingConvention::default()).unwrap();
        assert_eq!(resolver.prefix(STATIONARY_COMBUSTION).unwrap(), "stacom");
        assert_eq!(resolver.prefix(PURCHASED_ELECTRICITY).unwrap(), "elec");
    }

    #[test]
    fn test_builtin_columns_in_entry_order() {
        let catalog = SchemaCatalog::builtin();
        let mobile = catalog.get(MOBILE_COMBUSTION).unwrap();
        let names: Vec<&str> = mobile.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            ["vehicle", "fuel", "emission_factor", "consumption", "units", "emissions"]
        );
    }

    #[test]
    fn test_load_dir_adds_yaml_schemas() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("water.yaml"),
            r#"
table_id: water
field_prefix: water
row_total: emissions
columns:
  - name: source
    kind: text
  - name: emission_factor
    kind: numeric
  - name: consumption
    kind: numeric
  - name: emissions
    kind: computed_readonly
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = SchemaCatalog::builtin();
        assert_eq!(catalog.load_dir(dir.path()).unwrap(), 1);
        assert!(catalog.get("water").is_some());
        catalog.resolver(NamingConvention::default()).unwrap();
    }

    #[test]
    fn test_duplicate_table_id_rejected() {
        let mut catalog = SchemaCatalog::builtin();
        let duplicate = catalog.get(WASTE).unwrap().clone();
        assert!(matches!(
            catalog.insert(duplicate),
            Err(Error::AmbiguousAddress { .. })
        ));
    }

    #[test]
    fn test_colliding_yaml_prefix_fails_before_any_test_runs() {
        let mut catalog = SchemaCatalog::new();
        catalog
            .insert(
                TableSchema::new("stationary_combustion")
                    .column(ColumnDef::numeric("consumption")),
            )
            .unwrap();
        catalog
            .insert(TableSchema::new("stationary_backup").column(ColumnDef::numeric("consumption")))
            .unwrap();
        assert!(matches!(
            catalog.resolver(NamingConvention::default()),
            Err(Error::AmbiguousAddress { .. })
        ));
    }
}
