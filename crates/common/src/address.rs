//! Convention-based element addressing
//!
//! Every field the harness touches is located by a pure function of
//! `(table id, column, row)` and the [`NamingConvention`]. Addresses are
//! never stored: callers resolve again after any row mutation, because row
//! indices shift when rows are removed.
//!
//! ```text
//! cell            [id="{prefix}_{field}_{row}"]
//! table element   [id="{prefix}_{name}"]
//! row markers     [data-row-of="{prefix}"]
//! add control     [id="{prefix}_add_row_{after}"]  or  [id="{prefix}_add_row"]
//! remove control  [id="{prefix}_remove_row_{row}"]
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Locus, Result};
use crate::schema::{AddRowControl, TableSchema};

const ADD_ROW: &str = "add_row";
const REMOVE_ROW: &str = "remove_row";

/// Opaque locator identifying one element in the target document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a column or element name.
///
/// Lower-cases, turns whitespace runs into a single underscore and keeps
/// parenthetical units verbatim: `"Consumption (kWh)"` becomes
/// `"consumption_(kWh)"`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    let mut pending_space = false;

    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push('_');
            pending_space = false;
        }
        match ch {
            '(' => {
                depth += 1;
                out.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(ch);
            }
            _ if depth > 0 => out.push(ch),
            _ => out.extend(ch.to_lowercase()),
        }
    }

    out
}

/// Naming convention shared by every table of the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConvention {
    /// Characters of the normalized table id used when a schema has no explicit prefix
    pub prefix_len: usize,

    /// Separator between prefix, field name and row index
    pub separator: String,

    /// Attribute carrying element ids
    pub id_attribute: String,

    /// Attribute marking row containers with their table prefix
    pub row_marker_attribute: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            prefix_len: 6,
            separator: "_".to_string(),
            id_attribute: "id".to_string(),
            row_marker_attribute: "data-row-of".to_string(),
        }
    }
}

impl NamingConvention {
    /// Prefix for a schema: its explicit prefix or the truncated table id
    pub fn prefix_for(&self, schema: &TableSchema) -> String {
        match &schema.field_prefix {
            Some(prefix) => prefix.clone(),
            None => normalize_name(&schema.table_id)
                .chars()
                .take(self.prefix_len)
                .collect(),
        }
    }

    pub fn cell_id(&self, prefix: &str, field: &str, row: usize) -> String {
        format!("{prefix}{sep}{field}{sep}{row}", sep = self.separator)
    }

    pub fn element_id(&self, prefix: &str, name: &str) -> String {
        format!("{prefix}{}{name}", self.separator)
    }

    /// Attribute selector for an element id
    pub fn by_id(&self, id: &str) -> Address {
        Address::new(format!(
            r#"[{}="{}"]"#,
            self.id_attribute,
            id.replace('"', "\\\"")
        ))
    }

    pub fn row_markers(&self, prefix: &str) -> Address {
        Address::new(format!(r#"[{}="{}"]"#, self.row_marker_attribute, prefix))
    }

    fn ends_with_row_suffix(&self, name: &str) -> bool {
        match name.rsplit_once(self.separator.as_str()) {
            Some((head, tail)) => {
                !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredTable {
    schema: TableSchema,
    prefix: String,
    /// normalized column name -> DOM field name
    fields: BTreeMap<String, String>,
}

/// Resolves element addresses for registered table schemas
#[derive(Debug, Clone, Default)]
pub struct AddressResolver {
    convention: NamingConvention,
    tables: BTreeMap<String, RegisteredTable>,
}

impl AddressResolver {
    pub fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            tables: BTreeMap::new(),
        }
    }

    pub fn convention(&self) -> &NamingConvention {
        &self.convention
    }

    /// Register a schema, rejecting any configuration whose addresses could collide
    pub fn register(&mut self, schema: &TableSchema) -> Result<()> {
        schema.validate()?;

        let table_id = schema.table_id.as_str();
        if self.tables.contains_key(table_id) {
            return Err(Error::ambiguous(table_id, "table id registered twice"));
        }

        let prefix = self.convention.prefix_for(schema);
        self.check_prefix(table_id, &prefix)?;

        let mut fields = BTreeMap::new();
        let mut seen_fields = BTreeMap::new();
        for column in &schema.columns {
            let field = column.field_name();
            self.check_name(table_id, &field)?;
            if let Some(other) = seen_fields.insert(field.clone(), column.name.clone()) {
                return Err(Error::ambiguous(
                    table_id,
                    format!(
                        "columns '{}' and '{}' both address field '{}'",
                        other, column.name, field
                    ),
                ));
            }
            fields.insert(normalize_name(&column.name), field);
        }

        for name in schema.table_total.iter().chain(schema.evidence.iter()) {
            let field = normalize_name(name);
            self.check_name(table_id, &field)?;
            if seen_fields.contains_key(&field) && schema.evidence.as_deref() != Some(name) {
                return Err(Error::ambiguous(
                    table_id,
                    format!("aggregate '{}' shadows a column field", name),
                ));
            }
        }

        debug!(table = table_id, prefix = %prefix, "Registered table schema");
        self.tables.insert(
            table_id.to_string(),
            RegisteredTable {
                schema: schema.clone(),
                prefix,
                fields,
            },
        );
        Ok(())
    }

    /// Register several schemas, stopping at the first conflict
    pub fn register_all<'a>(&mut self, schemas: impl IntoIterator<Item = &'a TableSchema>) -> Result<()> {
        for schema in schemas {
            self.register(schema)?;
        }
        Ok(())
    }

    fn check_prefix(&self, table_id: &str, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::ambiguous(table_id, "address prefix is empty"));
        }
        if prefix.chars().any(|c| c.is_whitespace() || c == '"') {
            return Err(Error::ambiguous(
                table_id,
                format!("address prefix '{}' contains whitespace or quotes", prefix),
            ));
        }

        let sep = &self.convention.separator;
        for (other_id, other) in &self.tables {
            let nested = other.prefix.starts_with(&format!("{prefix}{sep}"))
                || prefix.starts_with(&format!("{}{sep}", other.prefix));
            if other.prefix == prefix || nested {
                return Err(Error::ambiguous(
                    table_id,
                    format!(
                        "address prefix '{}' collides with prefix '{}' of table {}",
                        prefix, other.prefix, other_id
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_name(&self, table_id: &str, field: &str) -> Result<()> {
        if field == ADD_ROW || field == REMOVE_ROW {
            return Err(Error::ambiguous(
                table_id,
                format!("field '{}' is reserved for row controls", field),
            ));
        }
        if self.convention.ends_with_row_suffix(field) {
            return Err(Error::ambiguous(
                table_id,
                format!("field '{}' ends with a row-index suffix", field),
            ));
        }
        Ok(())
    }

    fn table(&self, table_id: &str) -> Result<&RegisteredTable> {
        self.tables.get(table_id).ok_or_else(|| {
            Error::invalid(Locus::table(table_id), "table is not registered")
        })
    }

    pub fn is_registered(&self, table_id: &str) -> bool {
        self.tables.contains_key(table_id)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn schema(&self, table_id: &str) -> Option<&TableSchema> {
        self.tables.get(table_id).map(|t| &t.schema)
    }

    pub fn prefix(&self, table_id: &str) -> Result<&str> {
        Ok(self.table(table_id)?.prefix.as_str())
    }

    /// Resolve a row-scoped field (`row = Some`) or a table-level element (`row = None`)
    pub fn resolve(&self, table_id: &str, column: &str, row: Option<usize>) -> Result<Address> {
        let table = self.table(table_id)?;
        let normalized = normalize_name(column);
        let locus = || Locus::table(table_id).with_column(column).with_row(row);

        let is_evidence = table
            .schema
            .evidence
            .as_deref()
            .map(|e| normalize_name(e) == normalized)
            .unwrap_or(false);

        match (table.fields.get(&normalized), row) {
            (Some(field), Some(row)) => Ok(self
                .convention
                .by_id(&self.convention.cell_id(&table.prefix, field, row))),
            (None, Some(row)) if is_evidence => Ok(self
                .convention
                .by_id(&self.convention.cell_id(&table.prefix, &normalized, row))),
            (Some(_), None) => Err(Error::invalid(
                locus(),
                "column is row-scoped; a row index is required",
            )),
            (None, Some(_)) => Err(Error::invalid(
                locus(),
                "column is not declared in the table schema",
            )),
            (None, None) => {
                if self.convention.ends_with_row_suffix(&normalized) {
                    return Err(Error::invalid(
                        locus(),
                        "table-level names cannot end with a row index",
                    ));
                }
                Ok(self
                    .convention
                    .by_id(&self.convention.element_id(&table.prefix, &normalized)))
            }
        }
    }

    pub fn cell(&self, table_id: &str, column: &str, row: usize) -> Result<Address> {
        self.resolve(table_id, column, Some(row))
    }

    pub fn table_element(&self, table_id: &str, name: &str) -> Result<Address> {
        self.resolve(table_id, name, None)
    }

    /// Address of the table-total aggregate
    pub fn table_total(&self, table_id: &str) -> Result<Address> {
        let table = self.table(table_id)?;
        let name = table.schema.table_total.as_deref().ok_or_else(|| {
            Error::invalid(Locus::table(table_id), "table declares no table total")
        })?;
        self.table_element(table_id, name)
    }

    /// Selector matching every row container of the table
    pub fn row_markers(&self, table_id: &str) -> Result<Address> {
        let table = self.table(table_id)?;
        Ok(self.convention.row_markers(&table.prefix))
    }

    /// Add-row control; `after` is ignored for tables with a single append button
    pub fn add_row_control(&self, table_id: &str, after: usize) -> Result<Address> {
        let table = self.table(table_id)?;
        let id = match table.schema.add_row {
            AddRowControl::PerRow => self.convention.cell_id(&table.prefix, ADD_ROW, after),
            AddRowControl::Table => self.convention.element_id(&table.prefix, ADD_ROW),
        };
        Ok(self.convention.by_id(&id))
    }

    pub fn remove_row_control(&self, table_id: &str, row: usize) -> Result<Address> {
        let table = self.table(table_id)?;
        Ok(self
            .convention
            .by_id(&self.convention.cell_id(&table.prefix, REMOVE_ROW, row)))
    }
}
