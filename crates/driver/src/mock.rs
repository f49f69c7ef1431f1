//! In-memory page for tests
//!
//! [`MockPage`] imitates the parts of the reporting application the harness
//! depends on: rows that appear only after a delay, totals that recompute only
//! when an entry is committed (blur, Enter or select), auto-filled fields,
//! autocomplete suggestions, and a log of every interaction so tests can check
//! what was sent and in which order.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tablewright_common::{
    AddRowControl, Address, Error, NamingConvention, NumberFormat, Result, TableSchema, WaitState,
};
use tokio::time::Instant;

use crate::page::Page;

const POLL: Duration = Duration::from_millis(10);

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Fill { id: String, value: String },
    TypeChar { id: String, ch: char },
    Select { id: String, value: String },
    Focus { id: String },
    Blur { id: String },
    Press { id: String, key: String },
    Click { id: String },
    Files { id: String, files: Vec<PathBuf> },
}

impl PageEvent {
    pub fn id(&self) -> &str {
        match self {
            PageEvent::Fill { id, .. }
            | PageEvent::TypeChar { id, .. }
            | PageEvent::Select { id, .. }
            | PageEvent::Focus { id }
            | PageEvent::Blur { id }
            | PageEvent::Press { id, .. }
            | PageEvent::Click { id }
            | PageEvent::Files { id, .. } => id,
        }
    }

    /// Whether the event changes an element's value
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            PageEvent::Fill { .. }
                | PageEvent::TypeChar { .. }
                | PageEvent::Select { .. }
                | PageEvent::Files { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct RowTotalRule {
    total: String,
    factor: String,
    consumption: String,
}

#[derive(Debug, Clone)]
struct AutoFill {
    when_field: String,
    equals: String,
    set_field: String,
    to: String,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Insert { at: usize },
    Remove { row: usize },
}

/// A simulated data-entry table
#[derive(Debug, Clone)]
pub struct MockTable {
    prefix: String,
    fields: Vec<String>,
    row_total: Option<RowTotalRule>,
    table_total: Option<String>,
    table_total_value: String,
    add_control: AddRowControl,
    latency: Duration,
    stalled: bool,
    eager: bool,
    auto_fill: Vec<AutoFill>,
    suggestions: HashMap<String, Vec<String>>,
    rows: Vec<BTreeMap<String, String>>,
    pending: Vec<(Instant, Mutation)>,
}

impl MockTable {
    pub fn new(prefix: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            row_total: None,
            table_total: None,
            table_total_value: String::new(),
            add_control: AddRowControl::PerRow,
            latency: Duration::from_millis(200),
            stalled: false,
            eager: false,
            auto_fill: Vec::new(),
            suggestions: HashMap::new(),
            rows: vec![BTreeMap::new()],
            pending: Vec::new(),
        }
    }

    /// Mirror a schema: same prefix, fields, totals and add control.
    ///
    /// When the schema has a row total and `emission_factor`/`consumption`
    /// fields (optionally with a unit suffix), the row total is their product.
    pub fn for_schema(schema: &TableSchema, convention: &NamingConvention) -> Self {
        let fields: Vec<String> = schema
            .columns
            .iter()
            .map(|c| c.field_name())
            .chain(schema.evidence.iter().map(|e| tablewright_common::normalize_name(e)))
            .collect();
        let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();

        let mut table = Self::new(convention.prefix_for(schema), &field_refs).add_control(schema.add_row);
        if let Some(total) = schema.row_total_column() {
            let field_like = |wanted: &str| {
                schema
                    .columns
                    .iter()
                    .map(|c| c.field_name())
                    .find(|f| f == wanted || f.starts_with(&format!("{wanted}_(")))
            };
            let factor = field_like("emission_factor");
            let consumption = field_like("consumption");
            if let (Some(factor), Some(consumption)) = (factor, consumption) {
                table = table.row_total(&total.field_name(), &factor, &consumption);
            }
        }
        if let Some(aggregate) = &schema.table_total {
            table = table.table_total(&tablewright_common::normalize_name(aggregate));
        }
        table
    }

    /// Number of rows present at start
    pub fn rows(mut self, count: usize) -> Self {
        self.rows = vec![BTreeMap::new(); count];
        self
    }

    pub fn row_total(mut self, total: &str, factor: &str, consumption: &str) -> Self {
        if !self.fields.iter().any(|f| f == total) {
            self.fields.push(total.to_string());
        }
        self.row_total = Some(RowTotalRule {
            total: total.to_string(),
            factor: factor.to_string(),
            consumption: consumption.to_string(),
        });
        self
    }

    pub fn table_total(mut self, name: &str) -> Self {
        self.table_total = Some(name.to_string());
        self
    }

    pub fn add_control(mut self, control: AddRowControl) -> Self {
        self.add_control = control;
        self
    }

    /// Delay between clicking an add/remove control and the row count changing
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add/remove controls accept clicks but rows never change
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Recompute on every write, not only on commit
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// When `when_field` is committed with `equals`, overwrite `set_field` with `to`
    pub fn auto_fill(mut self, when_field: &str, equals: &str, set_field: &str, to: &str) -> Self {
        self.auto_fill.push(AutoFill {
            when_field: when_field.to_string(),
            equals: equals.to_string(),
            set_field: set_field.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn suggestions(mut self, field: &str, options: &[&str]) -> Self {
        self.suggestions.insert(
            field.to_string(),
            options.iter().map(|o| o.to_string()).collect(),
        );
        self
    }

    fn materialize(&mut self, now: Instant) {
        let mut changed = false;
        while let Some(pos) = self.pending.iter().position(|(at, _)| *at <= now) {
            let (_, mutation) = self.pending.remove(pos);
            match mutation {
                Mutation::Insert { at } => {
                    let at = at.min(self.rows.len());
                    self.rows.insert(at, BTreeMap::new());
                }
                Mutation::Remove { row } => {
                    if row < self.rows.len() {
                        self.rows.remove(row);
                    }
                }
            }
            changed = true;
        }
        if changed {
            self.recalculate();
        }
    }

    fn schedule(&mut self, mutation: Mutation) {
        if !self.stalled {
            self.pending.push((Instant::now() + self.latency, mutation));
        }
    }

    fn commit(&mut self, row: usize, field: &str) {
        let Some(value) = self.rows.get(row).and_then(|r| r.get(field)).cloned() else {
            self.recalculate();
            return;
        };
        let fills: Vec<(String, String)> = self
            .auto_fill
            .iter()
            .filter(|rule| rule.when_field == field && rule.equals.eq_ignore_ascii_case(&value))
            .map(|rule| (rule.set_field.clone(), rule.to.clone()))
            .collect();
        if let Some(cells) = self.rows.get_mut(row) {
            for (target, to) in fills {
                cells.insert(target, to);
            }
        }
        self.recalculate();
    }

    fn recalculate(&mut self) {
        let format = NumberFormat::default();
        let mut sum = 0.0;

        if let Some(rule) = &self.row_total {
            for cells in &mut self.rows {
                let factor = cells.get(&rule.factor).and_then(|v| format.parse(v));
                let consumption = cells.get(&rule.consumption).and_then(|v| format.parse(v));
                let total = match (factor, consumption) {
                    (Some(f), Some(c)) => {
                        sum += f * c;
                        format_grouped(f * c)
                    }
                    _ => String::new(),
                };
                cells.insert(rule.total.clone(), total);
            }
        }

        self.table_total_value = format_grouped(sum);
    }

    fn is_computed(&self, field: &str) -> bool {
        self.row_total
            .as_ref()
            .map(|rule| rule.total == field)
            .unwrap_or(false)
    }
}

/// Render a number the way the application displays totals: `1,234.50`
pub fn format_grouped(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Id(String),
    RowMarker(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Element(String),
    Cell { table: usize, field: String, row: usize },
    TableTotal { table: usize },
    AddRow { table: usize, after: Option<usize> },
    RemoveRow { table: usize, row: usize },
}

#[derive(Debug, Default)]
struct MockDocument {
    tables: Vec<MockTable>,
    elements: BTreeMap<String, String>,
    focused: Option<String>,
    typed: HashMap<String, String>,
    events: Vec<PageEvent>,
}

/// In-memory [`Page`] with a recording event log
pub struct MockPage {
    convention: NamingConvention,
    doc: Mutex<MockDocument>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

fn selector_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\[([A-Za-z0-9_-]+)="((?:[^"\\]|\\.)*)"\]$"#).expect("valid selector regex")
    })
}

impl MockPage {
    pub fn new() -> Self {
        Self::with_convention(NamingConvention::default())
    }

    pub fn with_convention(convention: NamingConvention) -> Self {
        Self {
            convention,
            doc: Mutex::new(MockDocument::default()),
        }
    }

    pub fn add_table(&self, mut table: MockTable) {
        table.recalculate();
        self.doc.lock().tables.push(table);
    }

    /// Add a standalone element outside any table
    pub fn insert_element(&self, id: &str, value: &str) {
        self.doc.lock().elements.insert(id.to_string(), value.to_string());
    }

    pub fn remove_element(&self, id: &str) {
        self.doc.lock().elements.remove(id);
    }

    /// Address of an element id under this page's naming convention
    pub fn address_of(&self, id: &str) -> Address {
        self.convention.by_id(id)
    }

    /// Current value of an element id, if it exists now
    pub fn value_of(&self, id: &str) -> Option<String> {
        let mut doc = self.doc.lock();
        materialize_all(&mut doc);
        let node = locate(&doc, &self.convention, id)?;
        Some(read_node(&doc, &node))
    }

    pub fn cell(&self, prefix: &str, field: &str, row: usize) -> Option<String> {
        self.value_of(&self.convention.cell_id(prefix, field, row))
    }

    /// Seed a cell value without recording an event
    pub fn seed_cell(&self, prefix: &str, field: &str, row: usize, value: &str) {
        let mut doc = self.doc.lock();
        if let Some(table) = doc.tables.iter_mut().find(|t| t.prefix == prefix) {
            if let Some(cells) = table.rows.get_mut(row) {
                cells.insert(field.to_string(), value.to_string());
            }
            table.recalculate();
        }
    }

    pub fn row_count(&self, prefix: &str) -> usize {
        let mut doc = self.doc.lock();
        materialize_all(&mut doc);
        doc.tables
            .iter()
            .find(|t| t.prefix == prefix)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.doc.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.doc.lock().events.clear();
    }

    fn parse(&self, address: &Address) -> Result<Selector> {
        let caps = selector_pattern()
            .captures(address.as_str())
            .ok_or_else(|| Error::Driver(format!("unsupported selector {}", address)))?;
        let attr = &caps[1];
        let value = caps[2].replace("\\\"", "\"");
        if attr == self.convention.id_attribute {
            Ok(Selector::Id(value))
        } else if attr == self.convention.row_marker_attribute {
            Ok(Selector::RowMarker(value))
        } else {
            Err(Error::Driver(format!("unsupported attribute in {}", address)))
        }
    }

    fn exists(&self, selector: &Selector) -> bool {
        let mut doc = self.doc.lock();
        materialize_all(&mut doc);
        match selector {
            Selector::Id(id) => locate(&doc, &self.convention, id).is_some(),
            Selector::RowMarker(prefix) => doc
                .tables
                .iter()
                .any(|t| &t.prefix == prefix && !t.rows.is_empty()),
        }
    }

    /// Locate an element that must exist now and apply `f` to the document
    fn with_node<T>(
        &self,
        address: &Address,
        f: impl FnOnce(&mut MockDocument, Node, String) -> Result<T>,
    ) -> Result<T> {
        let Selector::Id(id) = self.parse(address)? else {
            return Err(Error::Driver(format!("{} matches rows, not one element", address)));
        };
        let mut doc = self.doc.lock();
        materialize_all(&mut doc);
        let node = locate(&doc, &self.convention, &id)
            .ok_or_else(|| Error::Driver(format!("no element matches {}", address)))?;
        f(&mut doc, node, id)
    }
}

fn materialize_all(doc: &mut MockDocument) {
    let now = Instant::now();
    for table in &mut doc.tables {
        table.materialize(now);
    }
}

fn locate(doc: &MockDocument, convention: &NamingConvention, id: &str) -> Option<Node> {
    if doc.elements.contains_key(id) {
        return Some(Node::Element(id.to_string()));
    }

    let sep = convention.separator.as_str();
    for (index, table) in doc.tables.iter().enumerate() {
        let Some(rest) = id.strip_prefix(&format!("{}{}", table.prefix, sep)) else {
            continue;
        };
        if table.table_total.as_deref() == Some(rest) {
            return Some(Node::TableTotal { table: index });
        }
        if rest == "add_row" && table.add_control == AddRowControl::Table {
            return Some(Node::AddRow { table: index, after: None });
        }
        let Some((name, row)) = rest.rsplit_once(sep) else {
            continue;
        };
        let Ok(row) = row.parse::<usize>() else {
            continue;
        };
        if row >= table.rows.len() {
            continue;
        }
        match name {
            "add_row" if table.add_control == AddRowControl::PerRow => {
                return Some(Node::AddRow {
                    table: index,
                    after: Some(row),
                })
            }
            "remove_row" => return Some(Node::RemoveRow { table: index, row }),
            field if table.fields.iter().any(|f| f == field) => {
                return Some(Node::Cell {
                    table: index,
                    field: field.to_string(),
                    row,
                })
            }
            _ => {}
        }
    }
    None
}

fn read_node(doc: &MockDocument, node: &Node) -> String {
    match node {
        Node::Element(id) => doc.elements.get(id).cloned().unwrap_or_default(),
        Node::Cell { table, field, row } => doc.tables[*table].rows[*row]
            .get(field)
            .cloned()
            .unwrap_or_default(),
        Node::TableTotal { table } => doc.tables[*table].table_total_value.clone(),
        Node::AddRow { .. } => "+".to_string(),
        Node::RemoveRow { .. } => "-".to_string(),
    }
}

fn write_node(doc: &mut MockDocument, node: &Node, value: String) -> Result<()> {
    match node {
        Node::Element(id) => {
            doc.elements.insert(id.clone(), value);
            Ok(())
        }
        Node::Cell { table, field, row } => {
            let table = &mut doc.tables[*table];
            if table.is_computed(field) {
                return Err(Error::Driver(format!("{} is read-only", field)));
            }
            table.rows[*row].insert(field.clone(), value);
            if table.eager {
                table.commit(*row, field);
            }
            Ok(())
        }
        _ => Err(Error::Driver("element is not editable".to_string())),
    }
}

fn commit_node(doc: &mut MockDocument, node: &Node) {
    if let Node::Cell { table, field, row } = node {
        doc.tables[*table].commit(*row, field);
    }
}

#[async_trait]
impl Page for MockPage {
    async fn wait_for(&self, address: &Address, state: WaitState, timeout: Duration) -> Result<()> {
        let selector = self.parse(address)?;
        let deadline = Instant::now() + timeout;
        loop {
            let present = self.exists(&selector);
            let reached = match state {
                WaitState::Attached | WaitState::Visible => present,
                WaitState::Hidden | WaitState::Detached => !present,
            };
            if reached {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::WaitTimeout {
                    address: address.to_string(),
                    state,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn count(&self, address: &Address) -> Result<usize> {
        let selector = self.parse(address)?;
        let mut doc = self.doc.lock();
        materialize_all(&mut doc);
        Ok(match selector {
            Selector::RowMarker(prefix) => doc
                .tables
                .iter()
                .find(|t| t.prefix == prefix)
                .map(|t| t.rows.len())
                .unwrap_or(0),
            Selector::Id(id) => usize::from(locate(&doc, &self.convention, &id).is_some()),
        })
    }

    async fn read_value(&self, address: &Address) -> Result<String> {
        self.with_node(address, |doc, node, _| Ok(read_node(doc, &node)))
    }

    async fn set_value(&self, address: &Address, value: &str) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            write_node(doc, &node, value.to_string())?;
            doc.typed.remove(&id);
            doc.events.push(PageEvent::Fill {
                id,
                value: value.to_string(),
            });
            Ok(())
        })
    }

    async fn select_option(&self, address: &Address, value: &str) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            write_node(doc, &node, value.to_string())?;
            commit_node(doc, &node);
            doc.events.push(PageEvent::Select {
                id,
                value: value.to_string(),
            });
            Ok(())
        })
    }

    async fn click(&self, address: &Address) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            match node {
                Node::AddRow { table, after } => {
                    let t = &mut doc.tables[table];
                    let at = after.map(|a| a + 1).unwrap_or(t.rows.len());
                    t.schedule(Mutation::Insert { at });
                }
                Node::RemoveRow { table, row } => {
                    doc.tables[table].schedule(Mutation::Remove { row });
                }
                _ => {}
            }
            doc.events.push(PageEvent::Click { id });
            Ok(())
        })
    }

    async fn focus(&self, address: &Address) -> Result<()> {
        self.with_node(address, |doc, _, id| {
            doc.focused = Some(id.clone());
            doc.typed.insert(id.clone(), String::new());
            doc.events.push(PageEvent::Focus { id });
            Ok(())
        })
    }

    async fn blur(&self, address: &Address) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            if doc.focused.as_deref() == Some(id.as_str()) {
                doc.focused = None;
            }
            commit_node(doc, &node);
            doc.events.push(PageEvent::Blur { id });
            Ok(())
        })
    }

    async fn type_char(&self, address: &Address, ch: char) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            let mut value = read_node(doc, &node);
            value.push(ch);
            write_node(doc, &node, value)?;
            doc.typed.entry(id.clone()).or_default().push(ch);
            doc.events.push(PageEvent::TypeChar { id, ch });
            Ok(())
        })
    }

    async fn press(&self, address: &Address, key: &str) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            if key == "Enter" {
                if let Node::Cell { table, field, row } = &node {
                    let typed = doc.typed.get(&id).cloned().unwrap_or_default().to_lowercase();
                    let suggestion = doc.tables[*table]
                        .suggestions
                        .get(field)
                        .and_then(|options| {
                            options
                                .iter()
                                .find(|o| !typed.is_empty() && o.to_lowercase().contains(&typed))
                        })
                        .cloned();
                    if let Some(suggestion) = suggestion {
                        doc.tables[*table].rows[*row].insert(field.clone(), suggestion);
                    }
                }
                commit_node(doc, &node);
            }
            doc.events.push(PageEvent::Press {
                id,
                key: key.to_string(),
            });
            Ok(())
        })
    }

    async fn set_input_files(&self, address: &Address, files: &[PathBuf]) -> Result<()> {
        self.with_node(address, |doc, node, id| {
            let names: Vec<String> = files
                .iter()
                .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            write_node(doc, &node, names.join(", "))?;
            doc.events.push(PageEvent::Files {
                id,
                files: files.to_vec(),
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(268.0), "268.00");
        assert_eq!(format_grouped(2469.0), "2,469.00");
        assert_eq!(format_grouped(1234567.891), "1,234,567.89");
        assert_eq!(format_grouped(-1500.5), "-1,500.50");
        assert_eq!(format_grouped(0.0), "0.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_appear_after_latency() {
        let page = MockPage::new();
        page.add_table(MockTable::new("t", &["a"]).latency(Duration::from_millis(300)));

        page.click(&page.address_of("t_add_row_0")).await.unwrap();
        assert_eq!(page.row_count("t"), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(page.row_count("t"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_totals_recompute_only_on_commit() {
        let page = MockPage::new();
        page.add_table(
            MockTable::new("t", &["factor", "qty"])
                .row_total("total", "factor", "qty")
                .table_total("sum"),
        );

        page.set_value(&page.address_of("t_factor_0"), "2").await.unwrap();
        page.set_value(&page.address_of("t_qty_0"), "1,000").await.unwrap();
        assert_eq!(page.cell("t", "total", 0).as_deref(), Some(""));

        page.blur(&page.address_of("t_qty_0")).await.unwrap();
        assert_eq!(page.cell("t", "total", 0).as_deref(), Some("2,000.00"));
        assert_eq!(page.value_of("t_sum").as_deref(), Some("2,000.00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_on_missing_row() {
        let page = MockPage::new();
        page.add_table(MockTable::new("t", &["a"]));

        let err = page
            .wait_for(&page.address_of("t_a_4"), WaitState::Attached, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { timeout_ms: 50, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_computed_cells_reject_writes() {
        let page = MockPage::new();
        page.add_table(MockTable::new("t", &["factor", "qty"]).row_total("total", "factor", "qty"));
        assert!(page.set_value(&page.address_of("t_total_0"), "1").await.is_err());
    }
}
