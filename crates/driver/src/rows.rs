//! Row lifecycle
//!
//! Adding or removing a row is asynchronous on the page: the control is
//! clicked, then the row count is polled until it changes. Row indices are
//! dense and shift on removal, so nothing here keeps an address past the call
//! that resolved it.

use std::sync::Arc;
use std::time::Duration;

use tablewright_common::{AddRowControl, AddressResolver, Error, Locus, Result, Timeouts};
use tracing::{debug, info};

use crate::input::{FieldTarget, HumanizedInputChannel};
use crate::page::{poll_until, Page};

/// Adds, removes and counts the rows of one table
#[derive(Clone)]
pub struct RowLifecycle {
    table_id: String,
    resolver: Arc<AddressResolver>,
    page: Arc<dyn Page>,
    input: HumanizedInputChannel,
    timeouts: Timeouts,
}

impl RowLifecycle {
    pub fn new(
        table_id: impl Into<String>,
        resolver: Arc<AddressResolver>,
        page: Arc<dyn Page>,
        input: HumanizedInputChannel,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            resolver,
            page,
            input,
            timeouts,
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Number of rows currently rendered
    pub async fn row_count(&self) -> Result<usize> {
        let markers = self.resolver.row_markers(&self.table_id)?;
        self.page.count(&markers).await
    }

    /// Request a new row and wait until it is rendered.
    ///
    /// Per-row controls insert below `after`; a table-level control appends.
    /// Returns the index of the new row.
    pub async fn add_row(&self, after: usize) -> Result<usize> {
        let before = self.row_count().await?;
        let schema = self
            .resolver
            .schema(&self.table_id)
            .ok_or_else(|| Error::invalid(Locus::table(&self.table_id), "table is not registered"))?;
        let new_index = match schema.add_row {
            AddRowControl::PerRow if before == 0 => {
                return Err(Error::invalid(
                    Locus::table(&self.table_id).with_row(Some(after)),
                    "table has no rows and adds rows only below an existing one",
                ));
            }
            AddRowControl::PerRow => after + 1,
            AddRowControl::Table => before,
        };

        let control = self.resolver.add_row_control(&self.table_id, after)?;
        let target = FieldTarget::new(
            control,
            Locus::table(&self.table_id).with_column("add_row").with_row(Some(after)),
        );

        debug!(table = %self.table_id, after, before, "Requesting new row");
        self.input.click(&target).await?;

        let observed = self
            .await_count(&target.locus, before, |n| n > before, self.timeouts.row_mutation())
            .await?;
        info!(table = %self.table_id, row = new_index, rows = observed, "Row added");
        Ok(new_index)
    }

    /// Remove a row and wait until the count drops.
    ///
    /// Every address at or after `row` refers to a different row afterwards.
    pub async fn remove_row(&self, row: usize) -> Result<()> {
        let before = self.row_count().await?;
        if row >= before {
            return Err(Error::invalid(
                Locus::table(&self.table_id).with_row(Some(row)),
                format!("cannot remove row {} of a table with {} row(s)", row, before),
            ));
        }

        let control = self.resolver.remove_row_control(&self.table_id, row)?;
        let target = FieldTarget::new(
            control,
            Locus::table(&self.table_id).with_column("remove_row").with_row(Some(row)),
        );

        debug!(table = %self.table_id, row, before, "Removing row");
        self.input.click(&target).await?;

        let observed = self
            .await_count(&target.locus, before, |n| n < before, self.timeouts.row_mutation())
            .await?;
        info!(table = %self.table_id, row, rows = observed, "Row removed");
        Ok(())
    }

    /// Wait until the row count satisfies `predicate`, returning the count
    pub async fn wait_for_row_count<F>(&self, predicate: F, timeout: Duration) -> Result<usize>
    where
        F: Fn(usize) -> bool + Send + Sync,
    {
        let before = self.row_count().await?;
        self.await_count(&Locus::table(&self.table_id), before, predicate, timeout)
            .await
    }

    async fn await_count<F>(&self, locus: &Locus, before: usize, predicate: F, timeout: Duration) -> Result<usize>
    where
        F: Fn(usize) -> bool + Send + Sync,
    {
        let markers = self.resolver.row_markers(&self.table_id)?;
        let page = &self.page;
        let markers_ref = &markers;
        let predicate = &predicate;

        let reached = poll_until(timeout, self.timeouts.row_poll(), || async move {
            let count = page.count(markers_ref).await?;
            Ok(predicate(count).then_some(count))
        })
        .await?;

        match reached {
            Some(count) => Ok(count),
            None => {
                let observed = self.page.count(&markers).await?;
                Err(Error::RowMutationTimeout {
                    locus: locus.clone(),
                    before,
                    observed,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPage, MockTable};
    use tablewright_common::{ColumnDef, NamingConvention, PacingProfile, TableSchema};

    fn lifecycle(page: Arc<MockPage>, control: AddRowControl) -> RowLifecycle {
        let schema = TableSchema::new("fleet")
            .with_prefix("fleet")
            .column(ColumnDef::text("vehicle"))
            .with_add_row(control);
        let mut resolver = AddressResolver::new(NamingConvention::default());
        resolver.register(&schema).unwrap();

        let input = HumanizedInputChannel::new(page.clone(), PacingProfile::default(), Duration::from_millis(500));
        RowLifecycle::new("fleet", Arc::new(resolver), page, input, Timeouts::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_row_returns_index_below_anchor() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).rows(3));
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        assert_eq!(rows.add_row(0).await.unwrap(), 1);
        assert_eq!(rows.row_count().await.unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_level_add_appends() {
        let page = Arc::new(MockPage::new());
        page.add_table(
            MockTable::new("fleet", &["vehicle"])
                .rows(2)
                .add_control(AddRowControl::Table),
        );
        let rows = lifecycle(page.clone(), AddRowControl::Table);

        assert_eq!(rows.add_row(0).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_add_times_out() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).stalled());
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        let started = tokio::time::Instant::now();
        let err = rows.add_row(0).await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            Error::RowMutationTimeout {
                before,
                observed,
                timeout_ms,
                ..
            } => {
                assert_eq!((before, observed), (1, 1));
                assert_eq!(timeout_ms, Timeouts::default().row_mutation_ms);
            }
            other => panic!("expected RowMutationTimeout, got {other:?}"),
        }
        assert!(elapsed <= Timeouts::default().row_mutation() + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_out_of_range_is_invalid() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).rows(2));
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        assert!(matches!(
            rows.remove_row(2).await,
            Err(Error::InvalidOperation { .. })
        ));
        assert!(page.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_add_control_is_not_ready() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).rows(1));
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        assert!(matches!(
            rows.add_row(5).await,
            Err(Error::ElementNotReady { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_row_add_on_empty_table_fails_fast() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).rows(0));
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        let started = tokio::time::Instant::now();
        let err = rows.add_row(0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(page.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_level_add_on_empty_table() {
        let page = Arc::new(MockPage::new());
        page.add_table(
            MockTable::new("fleet", &["vehicle"])
                .rows(0)
                .add_control(AddRowControl::Table),
        );
        let rows = lifecycle(page.clone(), AddRowControl::Table);

        assert_eq!(rows.add_row(0).await.unwrap(), 0);
        assert_eq!(rows.row_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_row_count() {
        let page = Arc::new(MockPage::new());
        page.add_table(MockTable::new("fleet", &["vehicle"]).rows(2));
        let rows = lifecycle(page.clone(), AddRowControl::PerRow);

        let count = rows
            .wait_for_row_count(|n| n == 2, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(count, 2);

        assert!(matches!(
            rows.wait_for_row_count(|n| n > 5, Duration::from_millis(100)).await,
            Err(Error::RowMutationTimeout { .. })
        ));
    }
}
