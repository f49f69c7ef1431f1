//! Calculation findings and fixtures end to end

use std::sync::Arc;

use tablewright_common::catalog::{PURCHASED_ELECTRICITY, STATIONARY_COMBUSTION};
use tablewright_common::{CheckKind, Error, HarnessConfig, Locus, NamingConvention, SchemaCatalog, TriggerPolicy};
use tablewright_driver::{FieldTarget, FindingsReport, MockPage, MockTable, Session, TableFixture};

fn session(adjust: impl Fn(&str, MockTable) -> MockTable) -> (Arc<MockPage>, Session) {
    let catalog = SchemaCatalog::builtin();
    let convention = NamingConvention::default();
    let page = Arc::new(MockPage::new());
    for schema in catalog.iter() {
        let prefix = convention.prefix_for(schema);
        page.add_table(adjust(&prefix, MockTable::for_schema(schema, &convention)));
    }
    let session = Session::new(page.clone(), &catalog, HarnessConfig::default()).unwrap();
    (page, session)
}

#[tokio::test(start_paused = true)]
async fn auto_filled_factor_is_recorded_not_thrown() {
    // the page overwrites the factor when a fuel is chosen
    let (_page, mut session) = session(|prefix, table| match prefix {
        "stacom" => table
            .suggestions("fuel", &["Diesel"])
            .auto_fill("fuel", "Diesel", "emission_factor", "2.5"),
        _ => table,
    });
    let table = session.table(STATIONARY_COMBUSTION).unwrap();

    table.set_field("consumption", 0, "100").await.unwrap();
    table.set_field("fuel", 0, "Diesel").await.unwrap();
    assert_eq!(table.get_field("emission_factor", 0).await.unwrap(), "2.5");

    let verdict = table
        .verify_row(session.oracle_mut(), 0, "2.68", "100")
        .await
        .unwrap();
    let mismatch = verdict.mismatch().unwrap();
    assert_eq!(mismatch.check, CheckKind::RowTotal);
    assert_eq!(mismatch.observed, Some(250.0));
    assert!(!mismatch.partial_input);

    // the scenario carries on after the finding
    table.set_field("emission_factor", 0, "2.68").await.unwrap();
    assert!(table
        .verify_row(session.oracle_mut(), 0, "2.68", "100")
        .await
        .unwrap()
        .is_pass());

    let report = session.report();
    assert_eq!(report.checks, 2);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.session_id, session.id());
}

#[tokio::test(start_paused = true)]
async fn direct_entry_leaves_total_stale() {
    // Writing numeric fields without a commit does not wake the debounced handlers
    let (page, mut session) = session(|_, table| table);
    let table = session.table(PURCHASED_ELECTRICITY).unwrap();
    let address = |column: &str| table.address(column, 0).unwrap();

    let input = session.input();
    for (column, value) in [("emission_factor", "0.2"), ("consumption", "1000")] {
        let target = FieldTarget::new(
            address(column),
            Locus::table(PURCHASED_ELECTRICITY).with_column(column),
        );
        input.enter(&target, value, TriggerPolicy::Direct, None).await.unwrap();
    }
    assert_eq!(page.cell("elec", "consumption", 0).as_deref(), Some("1000"));

    let verdict = table
        .verify_row(session.oracle_mut(), 0, "0.2", "1000")
        .await
        .unwrap();
    assert!(verdict.mismatch().unwrap().partial_input);
    assert_eq!(session.report().partial_input_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn fixture_rows_are_entered_and_summed() {
    let (_page, mut session) = session(|_, table| table);
    let table = session.table(PURCHASED_ELECTRICITY).unwrap();

    let fixture = TableFixture::from_yaml(
        r#"
table_id: purchased_electricity
rows:
  - { site: Leeds, emission_factor: 0.2, consumption: "1,000" }
  - { site: York, emission_factor: 0.2, consumption: 500 }
  - { site: Hull, emission_factor: 0.25, consumption: 400 }
"#,
    )
    .unwrap();

    let rows = fixture.populate(&table).await.unwrap();
    assert_eq!(rows, [0, 1, 2]);
    assert_eq!(table.row_count().await.unwrap(), 3);
    assert_eq!(table.table_total().await.unwrap(), "400.00");
    assert!(table.verify_table_total(session.oracle_mut()).await.unwrap().is_pass());

    let dir = tempfile::tempdir().unwrap();
    let path = session.report().write(dir.path()).unwrap();
    let loaded = FindingsReport::load(&path).unwrap();
    assert_eq!(loaded.checks, 1);
    assert!(!loaded.has_findings());
}

#[tokio::test(start_paused = true)]
async fn fixture_on_empty_per_row_table_fails_fast() {
    let (page, mut session) = session(|prefix, table| match prefix {
        "elec" => table.rows(0),
        _ => table,
    });
    let table = session.table(PURCHASED_ELECTRICITY).unwrap();
    let fixture = TableFixture::from_yaml(
        "table_id: purchased_electricity\nrows:\n  - { site: Leeds, consumption: 10 }\n",
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let err = fixture.populate(&table).await.unwrap_err();
    assert!(matches!(err, Error::InvalidOperation { .. }), "{err:?}");
    assert!(started.elapsed() < std::time::Duration::from_millis(100));
    assert!(page.events().is_empty());
}
