//! Generic table accessor
//!
//! One [`TableAccessor`] drives any table described by a [`TableSchema`]:
//! writes dispatch on the column's trigger policy, reads are direct, and row
//! mutations go through [`RowLifecycle`]. Addresses are resolved on every call.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tablewright_common::{
    normalize_name, Address, AddressResolver, CalculationOracle, ColumnKind, Error, HarnessConfig,
    Locus, Result, TableSchema, Verdict,
};
use tracing::{debug, info};

use crate::input::{FieldTarget, HumanizedInputChannel};
use crate::page::Page;
use crate::rows::RowLifecycle;

/// Values keyed by column name, as entered by a scenario
pub type RowSnapshot = BTreeMap<String, String>;

/// Record of an uploaded evidence document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReceipt {
    pub table_id: String,
    pub row: usize,
    pub file: PathBuf,
    /// Hex SHA-256 of the uploaded bytes
    pub sha256: String,
}

/// Schema-driven accessor for one table of one session
pub struct TableAccessor {
    schema: TableSchema,
    resolver: Arc<AddressResolver>,
    input: HumanizedInputChannel,
    rows: RowLifecycle,
    default_evidence: Option<PathBuf>,
}

impl TableAccessor {
    /// Build an accessor for a registered table
    pub fn new(
        table_id: &str,
        resolver: Arc<AddressResolver>,
        page: Arc<dyn Page>,
        config: &HarnessConfig,
    ) -> Result<Self> {
        let schema = resolver
            .schema(table_id)
            .cloned()
            .ok_or_else(|| Error::invalid(Locus::table(table_id), "table is not registered"))?;

        let input = HumanizedInputChannel::new(page.clone(), config.pacing.clone(), config.timeouts.attach());
        let rows = RowLifecycle::new(
            table_id,
            resolver.clone(),
            page,
            input.clone(),
            config.timeouts.clone(),
        );

        Ok(Self {
            schema,
            resolver,
            input,
            rows,
            default_evidence: config.evidence.default_file.clone(),
        })
    }

    pub fn table_id(&self) -> &str {
        &self.schema.table_id
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Address of a row-scoped column
    pub fn address(&self, column: &str, row: usize) -> Result<Address> {
        self.resolver.cell(self.table_id(), column, row)
    }

    fn target(&self, column: &str, row: usize) -> Result<FieldTarget> {
        let address = self.address(column, row)?;
        Ok(FieldTarget::new(
            address,
            Locus::table(self.table_id()).with_column(column).with_row(Some(row)),
        ))
    }

    /// Write one field, committing it the way its column requires
    pub async fn set_field(&self, column: &str, row: usize, value: &str) -> Result<()> {
        let def = self.schema.column_def(column)?;
        if !def.kind.is_writable() {
            return Err(Error::invalid(
                Locus::table(self.table_id()).with_column(column).with_row(Some(row)),
                "column is computed and read-only",
            ));
        }

        let target = self.target(column, row)?;
        let settle = def.settle_ms.map(Duration::from_millis);
        let policy = def.trigger_policy();
        debug!(table = %self.table_id(), column, row, ?policy, "Setting field");

        if def.kind == ColumnKind::EnumSelect && !policy.is_paced() {
            self.input.choose(&target, value, settle).await
        } else {
            self.input.enter(&target, value, policy, settle).await
        }
    }

    /// Read one field's current value
    pub async fn get_field(&self, column: &str, row: usize) -> Result<String> {
        let target = self.target(column, row)?;
        self.input.read(&target).await
    }

    /// Enter several columns of one row in schema declaration order.
    ///
    /// Every key is checked before anything is typed.
    pub async fn fill_row(&self, row: usize, values: &RowSnapshot) -> Result<()> {
        let mut wanted: BTreeMap<String, &str> = BTreeMap::new();
        for (key, value) in values {
            let locus = || Locus::table(self.table_id()).with_column(key).with_row(Some(row));
            let def = self
                .schema
                .find_column(key)
                .ok_or_else(|| Error::invalid(locus(), "column is not declared in the table schema"))?;
            if !def.kind.is_writable() {
                return Err(Error::invalid(locus(), "column is computed and read-only"));
            }
            if wanted.insert(def.name.clone(), value.as_str()).is_some() {
                return Err(Error::invalid(locus(), "column given more than once"));
            }
        }

        debug!(table = %self.table_id(), row, columns = wanted.len(), "Filling row");
        for column in &self.schema.columns {
            if let Some(value) = wanted.get(&column.name) {
                self.set_field(&column.name, row, value).await?;
            }
        }
        Ok(())
    }

    /// Displayed total of one row
    pub async fn row_total(&self, row: usize) -> Result<String> {
        let column = self.schema.row_total_column().ok_or_else(|| {
            Error::invalid(Locus::table(self.table_id()), "table declares no row total")
        })?;
        self.get_field(&column.name, row).await
    }

    /// Displayed table total
    pub async fn table_total(&self) -> Result<String> {
        let address = self.resolver.table_total(self.table_id())?;
        let name = self.schema.table_total.clone().unwrap_or_default();
        let target = FieldTarget::new(address, Locus::table(self.table_id()).with_column(name));
        self.input.read(&target).await
    }

    pub async fn row_count(&self) -> Result<usize> {
        self.rows.row_count().await
    }

    /// Add a row below `after` (or append) and return its index
    pub async fn add_row(&self, after: usize) -> Result<usize> {
        self.rows.add_row(after).await
    }

    pub async fn remove_row(&self, row: usize) -> Result<()> {
        self.rows.remove_row(row).await
    }

    pub fn rows(&self) -> &RowLifecycle {
        &self.rows
    }

    /// Upload the configured default evidence document into a row
    pub async fn attach_evidence(&self, row: usize) -> Result<EvidenceReceipt> {
        let file = self.default_evidence.clone().ok_or_else(|| {
            Error::invalid(
                Locus::table(self.table_id()).with_row(Some(row)),
                "no default evidence file configured",
            )
        })?;
        self.attach_evidence_file(row, &file).await
    }

    /// Upload a document into a row's evidence field
    pub async fn attach_evidence_file(&self, row: usize, file: &Path) -> Result<EvidenceReceipt> {
        let field = self.schema.evidence.clone().ok_or_else(|| {
            Error::invalid(
                Locus::table(self.table_id()).with_row(Some(row)),
                "table declares no evidence field",
            )
        })?;

        let bytes = tokio::fs::read(file).await?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let target = self.target(&field, row)?;
        self.input.upload(&target, &[file.to_path_buf()]).await?;

        info!(
            table = %self.table_id(),
            row,
            file = %file.display(),
            sha256 = %sha256,
            "Evidence attached"
        );
        Ok(EvidenceReceipt {
            table_id: self.table_id().to_string(),
            row,
            file: file.to_path_buf(),
            sha256,
        })
    }

    /// Read a row's total and check it against factor × consumption
    pub async fn verify_row(
        &self,
        oracle: &mut CalculationOracle,
        row: usize,
        factor: &str,
        consumption: &str,
    ) -> Result<Verdict> {
        let observed = self.row_total(row).await?;
        oracle.scoped(self.table_id()).verify_row(row, factor, consumption, &observed)
    }

    /// Check the table total against the displayed row totals.
    ///
    /// A single-row table must show that row's total; otherwise the total is
    /// compared with the sum of every row total.
    pub async fn verify_table_total(&self, oracle: &mut CalculationOracle) -> Result<Verdict> {
        let count = self.row_count().await?;
        let mut row_totals = Vec::with_capacity(count);
        for row in 0..count {
            row_totals.push(self.row_total(row).await?);
        }
        let table_total = self.table_total().await?;

        let mut scoped = oracle.scoped(self.table_id());
        Ok(match row_totals.as_slice() {
            [only] => scoped.verify_table_matches_single_row(only, &table_total),
            totals => scoped.verify_table_sum(totals, &table_total),
        })
    }

    /// Normalized names of the columns a scenario may write
    pub fn writable_columns(&self) -> BTreeSet<String> {
        self.schema
            .input_columns()
            .map(|c| normalize_name(&c.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPage, MockTable};
    use tablewright_common::{ColumnDef, NamingConvention};

    fn setup(page: &Arc<MockPage>) -> TableAccessor {
        let schema = TableSchema::new("electricity")
            .with_prefix("elec")
            .column(ColumnDef::text("site"))
            .column(ColumnDef::numeric("emission_factor"))
            .column(ColumnDef::numeric("Consumption (kWh)").with_field("consumption"))
            .column(ColumnDef::computed("emissions"))
            .with_row_total("emissions")
            .with_table_total("total_emissions")
            .with_evidence("evidence");
        let convention = NamingConvention::default();
        page.add_table(MockTable::for_schema(&schema, &convention));

        let mut resolver = AddressResolver::new(convention);
        resolver.register(&schema).unwrap();
        TableAccessor::new("electricity", Arc::new(resolver), page.clone(), &HarnessConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_row_rejects_unknown_key_before_typing() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);

        let values = RowSnapshot::from([
            ("site".to_string(), "Leeds".to_string()),
            ("colour".to_string(), "blue".to_string()),
        ]);
        assert!(matches!(
            table.fill_row(0, &values).await,
            Err(Error::InvalidOperation { .. })
        ));
        assert!(page.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_row_rejects_computed_key() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);

        let values = RowSnapshot::from([("emissions".to_string(), "12".to_string())]);
        assert!(table.fill_row(0, &values).await.is_err());
        assert!(page.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_irregular_field_name() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);

        assert_eq!(
            table.address("Consumption (kWh)", 0).unwrap().as_str(),
            r#"[id="elec_consumption_0"]"#
        );
        table.set_field("Consumption (kWh)", 0, "1200").await.unwrap();
        assert_eq!(page.cell("elec", "consumption", 0).as_deref(), Some("1200"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evidence_receipt_carries_digest() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("invoice.pdf");
        std::fs::write(&file, b"abc").unwrap();

        let receipt = table.attach_evidence_file(0, &file).await.unwrap();
        assert_eq!(
            receipt.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(page.cell("elec", "evidence", 0).as_deref(), Some("invoice.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_evidence_without_default_file() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);
        assert!(matches!(
            table.attach_evidence(0).await,
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_table_total_single_row() {
        let page = Arc::new(MockPage::new());
        let table = setup(&page);
        let mut oracle = CalculationOracle::default();

        table.set_field("emission_factor", 0, "0.2").await.unwrap();
        table.set_field("Consumption (kWh)", 0, "1,500").await.unwrap();

        assert!(table.verify_row(&mut oracle, 0, "0.2", "1,500").await.unwrap().is_pass());
        assert!(table.verify_table_total(&mut oracle).await.unwrap().is_pass());
        assert!(!oracle.has_findings());
    }
}
