//! Declarative table schemas
//!
//! A [`TableSchema`] describes one physical data-entry table: its columns in
//! entry order, how each column commits a written value, and which computed
//! column and aggregate hold the totals. Schemas are built once per table type
//! and never mutated afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::normalize_name;
use crate::config::check_settle;
use crate::error::{Error, Locus, Result};

/// What kind of input a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Numeric,
    EnumSelect,
    Autocomplete,
    ComputedReadonly,
}

impl ColumnKind {
    /// Trigger policy used when the column declares none
    pub fn default_trigger(&self) -> TriggerPolicy {
        match self {
            ColumnKind::Text | ColumnKind::EnumSelect | ColumnKind::ComputedReadonly => {
                TriggerPolicy::Direct
            }
            ColumnKind::Numeric => TriggerPolicy::Paced {
                commit: CommitTrigger::Blur,
            },
            ColumnKind::Autocomplete => TriggerPolicy::PacedWithAutocomplete {
                commit: CommitTrigger::Blur,
            },
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, ColumnKind::ComputedReadonly)
    }
}

/// How a paced entry is committed once all characters are typed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitTrigger {
    #[default]
    Blur,
    Enter,
}

/// Column-level rule for how a written value is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Atomic value set, for fields nothing recalculates from
    Direct,
    /// Focus, type character by character, commit, then settle
    Paced {
        #[serde(default)]
        commit: CommitTrigger,
    },
    /// Paced entry followed by accepting the first autocomplete suggestion
    PacedWithAutocomplete {
        #[serde(default)]
        commit: CommitTrigger,
    },
}

impl TriggerPolicy {
    pub fn is_paced(&self) -> bool {
        !matches!(self, TriggerPolicy::Direct)
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Logical column name used by scenarios
    pub name: String,

    pub kind: ColumnKind,

    /// Commit rule; defaults by kind when omitted
    #[serde(default)]
    pub trigger: Option<TriggerPolicy>,

    /// Settle delay override for this column, in milliseconds
    #[serde(default)]
    pub settle_ms: Option<u64>,

    /// Raw DOM field name when the page does not follow the normalized column name
    #[serde(default)]
    pub field: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            trigger: None,
            settle_ms: None,
            field: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Numeric)
    }

    pub fn select(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::EnumSelect)
    }

    pub fn autocomplete(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Autocomplete)
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::ComputedReadonly)
    }

    pub fn with_trigger(mut self, trigger: TriggerPolicy) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_settle_ms(mut self, settle_ms: u64) -> Self {
        self.settle_ms = Some(settle_ms);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Effective trigger policy
    pub fn trigger_policy(&self) -> TriggerPolicy {
        self.trigger.unwrap_or_else(|| self.kind.default_trigger())
    }

    /// Normalized DOM field name this column addresses
    pub fn field_name(&self) -> String {
        normalize_name(self.field.as_deref().unwrap_or(&self.name))
    }
}

/// How new rows are requested on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddRowControl {
    /// Every row carries an "add row below" button
    #[default]
    PerRow,
    /// A single table-level button appends at the end
    Table,
}

/// Declarative description of one physical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Unique table identifier within a session
    pub table_id: String,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Explicit address prefix; derived from the table id when absent
    #[serde(default)]
    pub field_prefix: Option<String>,

    /// Columns in entry order
    pub columns: Vec<ColumnDef>,

    /// Computed column holding each row's total
    #[serde(default)]
    pub row_total: Option<String>,

    /// Table-level aggregate element holding the table total
    #[serde(default)]
    pub table_total: Option<String>,

    #[serde(default)]
    pub add_row: AddRowControl,

    /// Row-scoped file-upload field for evidence documents
    #[serde(default)]
    pub evidence: Option<String>,
}

impl TableSchema {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            title: String::new(),
            field_prefix: None,
            columns: Vec::new(),
            row_total: None,
            table_total: None,
            add_row: AddRowControl::default(),
            evidence: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.field_prefix = Some(prefix.into());
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_row_total(mut self, column: impl Into<String>) -> Self {
        self.row_total = Some(column.into());
        self
    }

    pub fn with_table_total(mut self, aggregate: impl Into<String>) -> Self {
        self.table_total = Some(aggregate.into());
        self
    }

    pub fn with_add_row(mut self, control: AddRowControl) -> Self {
        self.add_row = control;
        self
    }

    pub fn with_evidence(mut self, field: impl Into<String>) -> Self {
        self.evidence = Some(field.into());
        self
    }

    /// Parse a schema from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let schema: Self = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a schema from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look up a column by logical name (exact or normalized match)
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name).or_else(|| {
            let wanted = normalize_name(name);
            self.columns
                .iter()
                .find(|c| normalize_name(&c.name) == wanted)
        })
    }

    /// Look up a column, failing with `InvalidOperation` when it is not declared
    pub fn column_def(&self, name: &str) -> Result<&ColumnDef> {
        self.find_column(name).ok_or_else(|| {
            Error::invalid(
                Locus::table(&self.table_id).with_column(name),
                "column is not declared in the table schema",
            )
        })
    }

    /// Position of a column in entry order
    pub fn position(&self, name: &str) -> Option<usize> {
        let column = self.find_column(name)?;
        self.columns.iter().position(|c| c.name == column.name)
    }

    pub fn row_total_column(&self) -> Option<&ColumnDef> {
        self.row_total.as_deref().and_then(|name| self.find_column(name))
    }

    /// Writable columns in declaration order
    pub fn input_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.kind.is_writable())
    }

    /// Check the schema's internal consistency
    pub fn validate(&self) -> Result<()> {
        let locus = || Locus::table(&self.table_id);

        if self.table_id.trim().is_empty() {
            return Err(Error::invalid(locus(), "table id must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(Error::invalid(locus(), "schema declares no columns"));
        }

        let mut names = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(Error::invalid(locus(), "column name must not be empty"));
            }
            if !names.insert(normalize_name(&column.name)) {
                return Err(Error::invalid(
                    locus().with_column(&column.name),
                    "duplicate column name",
                ));
            }
            if let Some(settle_ms) = column.settle_ms {
                check_settle(&format!("settle_ms of column '{}'", column.name), settle_ms)?;
            }
            if !column.kind.is_writable() && column.trigger_policy().is_paced() {
                return Err(Error::invalid(
                    locus().with_column(&column.name),
                    "computed columns cannot declare a paced trigger",
                ));
            }
        }

        if let Some(total) = &self.row_total {
            match self.find_column(total) {
                Some(column) if column.kind == ColumnKind::ComputedReadonly => {}
                Some(_) => {
                    return Err(Error::invalid(
                        locus().with_column(total),
                        "row total must be a computed_readonly column",
                    ))
                }
                None => {
                    return Err(Error::invalid(
                        locus().with_column(total),
                        "row total refers to an undeclared column",
                    ))
                }
            }
        }

        Ok(())
    }
}
