//! Harness configuration
//!
//! Timing lives here rather than in scenario code: the pacing profile decides
//! how keystrokes are spaced and how long dependent fields get to recompute,
//! and per-column overrides come from the table schemas.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::NamingConvention;
use crate::error::{Error, Result};
use crate::oracle::NumberFormat;
use crate::schema::CommitTrigger;

/// Bounds accepted for settle delays, in milliseconds
pub const SETTLE_RANGE_MS: (u64, u64) = (150, 1500);

/// Top-level harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory of additional YAML table schemas
    pub schemas_dir: Option<PathBuf>,

    pub pacing: PacingProfile,
    pub timeouts: Timeouts,
    pub oracle: OracleConfig,
    pub naming: NamingConvention,
    pub browser: BrowserConfig,
    pub evidence: EvidenceConfig,
}

/// How human-paced input is emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingProfile {
    /// Lower bound of the delay between typed characters
    pub keystroke_min_ms: u64,

    /// Upper bound of the delay between typed characters
    pub keystroke_max_ms: u64,

    /// Wait after the commit trigger so debounced handlers can recompute
    pub settle_ms: u64,

    /// Wait for the suggestion list before accepting the first suggestion
    pub autocomplete_settle_ms: u64,

    /// Keys pressed to accept the first suggestion
    pub accept_keys: Vec<String>,

    /// Settle after selecting an option of an enum-select column
    pub select_settle_ms: u64,
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self {
            keystroke_min_ms: 100,
            keystroke_max_ms: 150,
            settle_ms: 500,
            autocomplete_settle_ms: 800,
            accept_keys: vec!["ArrowDown".to_string(), "Enter".to_string()],
            select_settle_ms: 150,
        }
    }
}

impl PacingProfile {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn autocomplete_settle(&self) -> Duration {
        Duration::from_millis(self.autocomplete_settle_ms)
    }

    pub fn select_settle(&self) -> Duration {
        Duration::from_millis(self.select_settle_ms)
    }

    /// Key that commits a paced entry
    pub fn commit_key(trigger: CommitTrigger) -> Option<&'static str> {
        match trigger {
            CommitTrigger::Blur => None,
            CommitTrigger::Enter => Some("Enter"),
        }
    }
}

/// Bounded waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// How long an addressed element may take to attach
    pub attach_ms: u64,

    /// How long a row addition or removal may take to show up in the row count
    pub row_mutation_ms: u64,

    /// Row-count polling interval
    pub row_poll_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            attach_ms: 5000,
            row_mutation_ms: 10_000,
            row_poll_ms: 50,
        }
    }
}

impl Timeouts {
    pub fn attach(&self) -> Duration {
        Duration::from_millis(self.attach_ms)
    }

    pub fn row_mutation(&self) -> Duration {
        Duration::from_millis(self.row_mutation_ms)
    }

    pub fn row_poll(&self) -> Duration {
        Duration::from_millis(self.row_poll_ms)
    }
}

/// Calculation oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Relative tolerance for total comparisons
    pub tolerance: f64,

    pub number_format: NumberFormat,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            number_format: NumberFormat::default(),
        }
    }
}

/// Browser kind driven by the Playwright bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

/// Playwright bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Base URL of the application under test
    pub base_url: String,

    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable
    pub node_binary: PathBuf,

    /// `NODE_PATH` for resolving the playwright package
    pub node_path: Option<PathBuf>,

    /// How long the bridge may take to launch the browser
    pub launch_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_path: None,
            launch_timeout_ms: 30_000,
        }
    }
}

/// Evidence upload settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// File uploaded by `attach_evidence` when no explicit file is given
    pub default_file: Option<PathBuf>,
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Environment overrides for values that differ between CI and local runs
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TABLEWRIGHT_BASE_URL") {
            self.browser.base_url = url;
        }
        if let Ok(headless) = std::env::var("TABLEWRIGHT_HEADLESS") {
            self.browser.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
    }

    /// Range checks across all sections
    pub fn validate(&self) -> Result<()> {
        let pacing = &self.pacing;
        if pacing.keystroke_min_ms > pacing.keystroke_max_ms {
            return Err(Error::InvalidConfig(format!(
                "pacing.keystroke_min_ms ({}) exceeds keystroke_max_ms ({})",
                pacing.keystroke_min_ms, pacing.keystroke_max_ms
            )));
        }
        check_settle("pacing.settle_ms", pacing.settle_ms)?;
        check_settle("pacing.autocomplete_settle_ms", pacing.autocomplete_settle_ms)?;
        check_settle("pacing.select_settle_ms", pacing.select_settle_ms)?;
        if pacing.accept_keys.is_empty() {
            return Err(Error::InvalidConfig(
                "pacing.accept_keys must name at least one key".to_string(),
            ));
        }

        let timeouts = &self.timeouts;
        if timeouts.attach_ms == 0 || timeouts.row_mutation_ms == 0 || timeouts.row_poll_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be non-zero".to_string()));
        }
        if timeouts.row_poll_ms > timeouts.row_mutation_ms {
            return Err(Error::InvalidConfig(
                "timeouts.row_poll_ms exceeds row_mutation_ms".to_string(),
            ));
        }

        let tolerance = self.oracle.tolerance;
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "oracle.tolerance must be in (0, 1), got {}",
                tolerance
            )));
        }
        let format = self.oracle.number_format;
        if format.thousands == format.decimal {
            return Err(Error::InvalidConfig(
                "number format uses the same character for thousands and decimals".to_string(),
            ));
        }

        if self.naming.separator.is_empty() || self.naming.prefix_len == 0 {
            return Err(Error::InvalidConfig(
                "naming.separator and naming.prefix_len must be non-empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate a settle delay against the accepted range
pub fn check_settle(what: &str, settle_ms: u64) -> Result<()> {
    let (min, max) = SETTLE_RANGE_MS;
    if settle_ms < min || settle_ms > max {
        return Err(Error::InvalidConfig(format!(
            "{} must be within {}..={} ms, got {}",
            what, min, max, settle_ms
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pacing.keystroke_min_ms, 100);
        assert_eq!(config.pacing.keystroke_max_ms, 150);
        assert_eq!(config.oracle.tolerance, 1e-3);
        assert_eq!(config.naming.prefix_len, 6);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[pacing]
settle_ms = 900

[timeouts]
attach_ms = 2000

[oracle.number_format]
thousands = "."
decimal = ","
"#,
        )
        .unwrap();
        assert_eq!(config.pacing.settle_ms, 900);
        assert_eq!(config.pacing.keystroke_max_ms, 150);
        assert_eq!(config.timeouts.attach_ms, 2000);
        assert_eq!(config.timeouts.row_mutation_ms, 10_000);
        assert_eq!(config.oracle.number_format.decimal, ',');
    }

    #[test_case("settle_ms = 5000" ; "settle")]
    #[test_case("autocomplete_settle_ms = 20" ; "autocomplete settle")]
    #[test_case("select_settle_ms = 0" ; "select settle below range")]
    #[test_case("select_settle_ms = 2000" ; "select settle above range")]
    fn test_settle_out_of_range_rejected(line: &str) {
        let err = HarnessConfig::from_toml(&format!("[pacing]\n{line}\n")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_inverted_keystroke_range_rejected() {
        let err = HarnessConfig::from_toml(
            "[pacing]\nkeystroke_min_ms = 200\nkeystroke_max_ms = 100\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/tablewright.toml");

        let mut config = HarnessConfig::default();
        config.browser.browser = BrowserKind::Firefox;
        config.evidence.default_file = Some(PathBuf::from("fixtures/invoice.pdf"));
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.browser.browser, BrowserKind::Firefox);
        assert_eq!(
            loaded.evidence.default_file,
            Some(PathBuf::from("fixtures/invoice.pdf"))
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pacing, PacingProfile::default());
    }
}
