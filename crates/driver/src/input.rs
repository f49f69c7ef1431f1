//! Humanized input
//!
//! The application wires its derived values to debounced input handlers, so
//! an atomic value assignment often lands without recomputing anything. Paced
//! entry behaves like a person: focus, type one character at a time, commit
//! with blur or Enter, then give the handlers time to settle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tablewright_common::{
    Address, CommitTrigger, Error, Locus, PacingProfile, Result, TriggerPolicy, WaitState,
};
use tracing::debug;

use crate::page::{map_wait_timeout, Page};

/// An address together with the table context used in diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget {
    pub address: Address,
    pub locus: Locus,
}

impl FieldTarget {
    pub fn new(address: Address, locus: Locus) -> Self {
        let locus = locus.with_address(address.as_str());
        Self { address, locus }
    }
}

/// Drives value entry against one session's page
#[derive(Clone)]
pub struct HumanizedInputChannel {
    page: Arc<dyn Page>,
    pacing: PacingProfile,
    attach_timeout: Duration,
}

impl HumanizedInputChannel {
    pub fn new(page: Arc<dyn Page>, pacing: PacingProfile, attach_timeout: Duration) -> Self {
        Self {
            page,
            pacing,
            attach_timeout,
        }
    }

    pub fn pacing(&self) -> &PacingProfile {
        &self.pacing
    }

    /// Enter `value` according to `policy`; `settle` overrides the profile's settle delay
    pub async fn enter(
        &self,
        target: &FieldTarget,
        value: &str,
        policy: TriggerPolicy,
        settle: Option<Duration>,
    ) -> Result<()> {
        self.ensure_attached(target).await?;
        let settle = settle.unwrap_or_else(|| self.pacing.settle());

        match policy {
            TriggerPolicy::Direct => {
                debug!(target = %target.locus, "Direct entry");
                self.page.set_value(&target.address, value).await?;
            }
            TriggerPolicy::Paced { commit } => {
                debug!(target = %target.locus, chars = value.chars().count(), ?commit, "Paced entry");
                self.type_paced(target, value).await?;
                self.commit(target, commit).await?;
                tokio::time::sleep(settle).await;
            }
            TriggerPolicy::PacedWithAutocomplete { commit } => {
                debug!(target = %target.locus, chars = value.chars().count(), "Paced entry with autocomplete");
                self.type_paced(target, value).await?;
                tokio::time::sleep(self.pacing.autocomplete_settle()).await;
                for key in &self.pacing.accept_keys {
                    self.page.press(&target.address, key).await?;
                }
                let accepted_with_enter = self
                    .pacing
                    .accept_keys
                    .last()
                    .map(|k| k == "Enter")
                    .unwrap_or(false);
                if !(commit == CommitTrigger::Enter && accepted_with_enter) {
                    self.commit(target, commit).await?;
                }
                tokio::time::sleep(settle).await;
            }
        }

        Ok(())
    }

    /// Select an option of an enum-select element, then settle
    pub async fn choose(&self, target: &FieldTarget, value: &str, settle: Option<Duration>) -> Result<()> {
        self.ensure_attached(target).await?;
        debug!(target = %target.locus, value, "Selecting option");
        self.page.select_option(&target.address, value).await?;
        tokio::time::sleep(settle.unwrap_or_else(|| self.pacing.select_settle())).await;
        Ok(())
    }

    /// Direct, unpaced read
    pub async fn read(&self, target: &FieldTarget) -> Result<String> {
        self.ensure_attached(target).await?;
        self.page.read_value(&target.address).await
    }

    /// Click a control once it is attached
    pub async fn click(&self, target: &FieldTarget) -> Result<()> {
        self.ensure_attached(target).await?;
        self.page.click(&target.address).await
    }

    pub async fn upload(&self, target: &FieldTarget, files: &[PathBuf]) -> Result<()> {
        self.ensure_attached(target).await?;
        self.page.set_input_files(&target.address, files).await
    }

    async fn ensure_attached(&self, target: &FieldTarget) -> Result<()> {
        self.page
            .wait_for(&target.address, WaitState::Attached, self.attach_timeout)
            .await
            .map_err(|e| {
                map_wait_timeout(e, |waited_ms| Error::ElementNotReady {
                    locus: target.locus.clone(),
                    waited_ms,
                })
            })
    }

    async fn type_paced(&self, target: &FieldTarget, value: &str) -> Result<()> {
        self.page.focus(&target.address).await?;
        self.page.set_value(&target.address, "").await?;

        for (i, ch) in value.chars().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.keystroke_delay()).await;
            }
            self.page.type_char(&target.address, ch).await?;
        }
        Ok(())
    }

    async fn commit(&self, target: &FieldTarget, commit: CommitTrigger) -> Result<()> {
        match PacingProfile::commit_key(commit) {
            Some(key) => self.page.press(&target.address, key).await,
            None => self.page.blur(&target.address).await,
        }
    }

    fn keystroke_delay(&self) -> Duration {
        let min = self.pacing.keystroke_min_ms;
        let max = self.pacing.keystroke_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
