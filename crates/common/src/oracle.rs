//! Calculation oracle
//!
//! Recomputes expected totals from the values a scenario entered and compares
//! them with the totals the page displays. Displayed totals are rounded and
//! formatted with thousands separators (sometimes with trailing units), so
//! comparison parses leniently and uses a relative tolerance.
//!
//! Mismatches are findings, not errors: the page's auto-population is known
//! to be occasionally unreliable, so every mismatch is recorded and the
//! scenario carries on.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{Error, Locus, Result};

/// Locale rules for displayed numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    pub thousands: char,
    pub decimal: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            thousands: ',',
            decimal: '.',
        }
    }
}

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number regex")
    })
}

impl NumberFormat {
    /// Parse a displayed number, ignoring separators, spaces and trailing units
    pub fn parse(&self, raw: &str) -> Option<f64> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != self.thousands)
            .map(|c| if c == self.decimal { '.' } else { c })
            .collect();

        let number = leading_number().find(&cleaned)?;
        number.as_str().parse().ok()
    }
}

/// Which comparison produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    RowTotal,
    SingleRowTableTotal,
    TableSum,
}

/// Structured record of an observed total that disagrees with the expected arithmetic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationMismatch {
    pub table_id: String,
    pub row: Option<usize>,
    pub check: CheckKind,
    pub expected: f64,
    /// Parsed observed value, `None` when the page showed nothing numeric
    pub observed: Option<f64>,
    pub observed_raw: String,
    pub tolerance: f64,
    /// Observed total is empty or zero while inputs imply a value: likely a
    /// partially landed entry rather than wrong arithmetic
    pub partial_input: bool,
}

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass { expected: f64, observed: f64 },
    Mismatch(CalculationMismatch),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn mismatch(&self) -> Option<&CalculationMismatch> {
        match self {
            Verdict::Mismatch(m) => Some(m),
            Verdict::Pass { .. } => None,
        }
    }
}

/// Whether `observed` lies within a relative `tolerance` of `expected`
pub fn within_tolerance(expected: f64, observed: f64, tolerance: f64) -> bool {
    if expected == 0.0 {
        return observed.abs() <= tolerance;
    }
    ((observed - expected) / expected).abs() <= tolerance
}

/// Recomputes expected totals and collects mismatches for a session
#[derive(Debug, Clone)]
pub struct CalculationOracle {
    tolerance: f64,
    format: NumberFormat,
    checks: usize,
    findings: Vec<CalculationMismatch>,
}

impl Default for CalculationOracle {
    fn default() -> Self {
        Self::new(&OracleConfig::default())
    }
}

impl CalculationOracle {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            format: config.number_format,
            checks: 0,
            findings: Vec::new(),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn number_format(&self) -> NumberFormat {
        self.format
    }

    /// Parse a scenario-supplied operand; unparsable operands are caller errors
    pub fn parse_operand(&self, what: &str, raw: &str) -> Result<f64> {
        self.format.parse(raw).ok_or_else(|| {
            Error::invalid(
                Locus::default(),
                format!("{} '{}' is not a number", what, raw),
            )
        })
    }

    /// Expected total for one row: factor × consumption
    pub fn expected_total(&self, factor: &str, consumption: &str) -> Result<f64> {
        let factor = self.parse_operand("emission factor", factor)?;
        let consumption = self.parse_operand("consumption", consumption)?;
        Ok(factor * consumption)
    }

    /// Verification bound to one table, so findings carry its id
    pub fn scoped(&mut self, table_id: impl Into<String>) -> TableOracle<'_> {
        TableOracle {
            oracle: self,
            table_id: table_id.into(),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks
    }

    pub fn findings(&self) -> &[CalculationMismatch] {
        &self.findings
    }

    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    /// Drain recorded findings
    pub fn take_findings(&mut self) -> Vec<CalculationMismatch> {
        std::mem::take(&mut self.findings)
    }

    /// A row total feeding a table check shows nothing numeric: the row never
    /// recalculated, so the check cannot pass
    fn unparsed_row_total(
        &mut self,
        table_id: &str,
        row: Option<usize>,
        check: CheckKind,
        row_total_raw: &str,
        observed_table_total: &str,
    ) -> Verdict {
        self.checks += 1;
        let mismatch = CalculationMismatch {
            table_id: table_id.to_string(),
            row,
            check,
            expected: self.format.parse(observed_table_total).unwrap_or(0.0),
            observed: None,
            observed_raw: row_total_raw.to_string(),
            tolerance: self.tolerance,
            partial_input: true,
        };

        warn!(
            table = table_id,
            ?row,
            ?check,
            row_total = %row_total_raw,
            table_total = %observed_table_total,
            "Row total missing from table check"
        );
        self.findings.push(mismatch.clone());
        Verdict::Mismatch(mismatch)
    }

    fn compare(
        &mut self,
        table_id: &str,
        row: Option<usize>,
        check: CheckKind,
        expected: f64,
        observed_raw: &str,
    ) -> Verdict {
        self.checks += 1;
        let observed = self.format.parse(observed_raw);

        if let Some(value) = observed {
            if within_tolerance(expected, value, self.tolerance) {
                debug!(table = table_id, ?row, ?check, expected, observed = value, "Calculation check passed");
                return Verdict::Pass {
                    expected,
                    observed: value,
                };
            }
        }

        let partial_input = expected != 0.0 && observed.map(|v| v == 0.0).unwrap_or(true);
        let mismatch = CalculationMismatch {
            table_id: table_id.to_string(),
            row,
            check,
            expected,
            observed,
            observed_raw: observed_raw.to_string(),
            tolerance: self.tolerance,
            partial_input,
        };

        warn!(
            table = table_id,
            ?row,
            ?check,
            expected,
            observed = %observed_raw,
            partial_input,
            "Calculation mismatch recorded"
        );
        self.findings.push(mismatch.clone());
        Verdict::Mismatch(mismatch)
    }
}

/// Oracle view scoped to a single table
pub struct TableOracle<'a> {
    oracle: &'a mut CalculationOracle,
    table_id: String,
}

impl TableOracle<'_> {
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Compare a row's displayed total against factor × consumption
    pub fn verify_row(
        &mut self,
        row: usize,
        factor: &str,
        consumption: &str,
        observed_row_total: &str,
    ) -> Result<Verdict> {
        let expected = self.oracle.expected_total(factor, consumption).map_err(|e| match e {
            Error::InvalidOperation { reason, .. } => {
                Error::invalid(Locus::table(&self.table_id).with_row(Some(row)), reason)
            }
            other => other,
        })?;
        Ok(self.oracle.compare(
            &self.table_id,
            Some(row),
            CheckKind::RowTotal,
            expected,
            observed_row_total,
        ))
    }

    /// For a table with exactly one row, the table total must equal that row's total
    pub fn verify_table_matches_single_row(
        &mut self,
        observed_row_total: &str,
        observed_table_total: &str,
    ) -> Verdict {
        let Some(expected) = self.oracle.format.parse(observed_row_total) else {
            return self.oracle.unparsed_row_total(
                &self.table_id,
                None,
                CheckKind::SingleRowTableTotal,
                observed_row_total,
                observed_table_total,
            );
        };
        self.oracle.compare(
            &self.table_id,
            None,
            CheckKind::SingleRowTableTotal,
            expected,
            observed_table_total,
        )
    }

    /// The table total must equal the sum of the displayed row totals
    pub fn verify_table_sum<I, S>(&mut self, observed_row_totals: I, observed_table_total: &str) -> Verdict
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let format = self.oracle.format;
        let mut expected = 0.0;
        for (row, raw) in observed_row_totals.into_iter().enumerate() {
            match format.parse(raw.as_ref()) {
                Some(value) => expected += value,
                None => {
                    return self.oracle.unparsed_row_total(
                        &self.table_id,
                        Some(row),
                        CheckKind::TableSum,
                        raw.as_ref(),
                        observed_table_total,
                    )
                }
            }
        }
        self.oracle.compare(
            &self.table_id,
            None,
            CheckKind::TableSum,
            expected,
            observed_table_total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1,234.5", Some(1234.5) ; "thousands separator")]
    #[test_case("268.00 kgCO2e", Some(268.0) ; "trailing units")]
    #[test_case(" 2,469.00 ", Some(2469.0) ; "padded")]
    #[test_case("1\u{a0}234.5", Some(1234.5) ; "non breaking space")]
    #[test_case("-12.5", Some(-12.5) ; "negative")]
    #[test_case("", None ; "empty")]
    #[test_case("n/a", None ; "text")]
    fn test_parse_default_format(raw: &str, expected: Option<f64>) {
        assert_eq!(NumberFormat::default().parse(raw), expected);
    }

    #[test]
    fn test_parse_european_format() {
        let format = NumberFormat {
            thousands: '.',
            decimal: ',',
        };
        assert_eq!(format.parse("1.234,5"), Some(1234.5));
    }

    #[test]
    fn test_expected_total_strips_separators() {
        let oracle = CalculationOracle::default();
        assert_eq!(oracle.expected_total("1,234.5", "2").unwrap(), 2469.0);
    }

    #[test]
    fn test_expected_total_rejects_garbage() {
        let oracle = CalculationOracle::default();
        assert!(matches!(
            oracle.expected_total("diesel", "2"),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test_case("268.0", true ; "exact")]
    #[test_case("268.2", true ; "within tolerance")]
    #[test_case("268.3", false ; "just outside tolerance")]
    #[test_case("300", false ; "far off")]
    fn test_verify_row_tolerance(observed: &str, passes: bool) {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("stationary_combustion")
            .verify_row(0, "2.68", "100", observed)
            .unwrap();
        assert_eq!(verdict.is_pass(), passes);
        assert_eq!(oracle.findings().len(), usize::from(!passes));
        assert_eq!(oracle.checks(), 1);
    }

    #[test]
    fn test_mismatch_record_is_structured() {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("mobile_combustion")
            .verify_row(3, "2.5", "10", "30.00")
            .unwrap();
        let mismatch = verdict.mismatch().unwrap();
        assert_eq!(mismatch.table_id, "mobile_combustion");
        assert_eq!(mismatch.row, Some(3));
        assert_eq!(mismatch.expected, 25.0);
        assert_eq!(mismatch.observed, Some(30.0));
        assert_eq!(mismatch.tolerance, 1e-3);
        assert!(!mismatch.partial_input);
    }

    #[test]
    fn test_empty_total_flags_partial_input() {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("waste")
            .verify_row(0, "0.5", "40", "")
            .unwrap();
        assert!(verdict.mismatch().unwrap().partial_input);
    }

    #[test]
    fn test_single_row_table_total() {
        let mut oracle = CalculationOracle::default();
        let mut table = oracle.scoped("refrigerants");
        assert!(table.verify_table_matches_single_row("1,430.00", "1,430.00").is_pass());
        assert!(!table.verify_table_matches_single_row("1,430.00", "1,000.00").is_pass());
        assert_eq!(oracle.take_findings().len(), 1);
        assert!(!oracle.has_findings());
    }

    #[test]
    fn test_table_sum() {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("purchased_electricity")
            .verify_table_sum(["1,000.00", "234.50"], "1,234.50");
        assert!(verdict.is_pass());
    }

    #[test]
    fn test_empty_single_row_total_is_not_a_pass() {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("refrigerants")
            .verify_table_matches_single_row("", "0.00");
        let mismatch = verdict.mismatch().unwrap();
        assert_eq!(mismatch.check, CheckKind::SingleRowTableTotal);
        assert_eq!(mismatch.observed, None);
        assert_eq!(mismatch.observed_raw, "");
        assert!(mismatch.partial_input);
        assert_eq!(oracle.checks(), 1);
        assert_eq!(oracle.findings().len(), 1);
    }

    #[test]
    fn test_table_sum_with_empty_row_total_is_not_a_pass() {
        let mut oracle = CalculationOracle::default();
        let verdict = oracle
            .scoped("purchased_electricity")
            .verify_table_sum(["1,000.00", ""], "1,000.00");
        let mismatch = verdict.mismatch().unwrap();
        assert_eq!(mismatch.check, CheckKind::TableSum);
        assert_eq!(mismatch.row, Some(1));
        assert_eq!(mismatch.expected, 1000.0);
        assert_eq!(mismatch.observed_raw, "");
        assert!(mismatch.partial_input);
        assert_eq!(oracle.findings().len(), 1);
    }

    #[test]
    fn test_zero_expected_uses_absolute_tolerance() {
        assert!(within_tolerance(0.0, 0.0005, 1e-3));
        assert!(!within_tolerance(0.0, 0.01, 1e-3));
    }
}
