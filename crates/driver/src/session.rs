//! Harness session
//!
//! A [`Session`] binds one page to a registered schema catalog, the harness
//! configuration, a calculation oracle and its own page-object cache.
//! Sessions share no mutable state with each other.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tablewright_common::{AddressResolver, CalculationOracle, HarnessConfig, Result, SchemaCatalog};
use tracing::info;
use uuid::Uuid;

use crate::cache::{CacheGroup, PageObjectCache};
use crate::input::HumanizedInputChannel;
use crate::page::Page;
use crate::report::FindingsReport;
use crate::table::TableAccessor;

/// A page object the session can build and memoize
pub trait PageObject: Any + Send + Sync + Sized {
    /// Cache key
    const KIND: &'static str;
    const GROUP: CacheGroup;

    fn build(session: &mut Session) -> Result<Self>;
}

/// One harness session against one page
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    page: Arc<dyn Page>,
    resolver: Arc<AddressResolver>,
    config: Arc<HarnessConfig>,
    oracle: CalculationOracle,
    cache: PageObjectCache,
}

impl Session {
    /// Validate the configuration and register every schema of the catalog
    pub fn new(page: Arc<dyn Page>, catalog: &SchemaCatalog, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let resolver = catalog.resolver(config.naming.clone())?;
        let oracle = CalculationOracle::new(&config.oracle);

        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            page,
            resolver: Arc::new(resolver),
            config: Arc::new(config),
            oracle,
            cache: PageObjectCache::new(),
        };
        info!(session = %session.id, tables = catalog.len(), "Session started");
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn page(&self) -> Arc<dyn Page> {
        self.page.clone()
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn oracle(&self) -> &CalculationOracle {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut CalculationOracle {
        &mut self.oracle
    }

    pub fn cache(&self) -> &PageObjectCache {
        &self.cache
    }

    /// Input channel bound to this session's page and pacing
    pub fn input(&self) -> HumanizedInputChannel {
        HumanizedInputChannel::new(
            self.page.clone(),
            self.config.pacing.clone(),
            self.config.timeouts.attach(),
        )
    }

    /// The session's accessor for a registered table
    pub fn table(&mut self, table_id: &str) -> Result<Arc<TableAccessor>> {
        let kind = format!("table:{}", table_id);
        let resolver = self.resolver.clone();
        let page = self.page.clone();
        let config = self.config.clone();
        self.cache
            .get_or_try_insert_with(&kind, CacheGroup::TableAccessors, || {
                TableAccessor::new(table_id, resolver, page, &config)
            })
    }

    /// The session's instance of a page object, built on first use
    pub fn page_object<T: PageObject>(&mut self) -> Result<Arc<T>> {
        if let Some(cached) = self.cache.get::<T>(T::KIND) {
            return Ok(cached);
        }
        let built = T::build(self)?;
        self.cache
            .get_or_try_insert_with(T::KIND, T::GROUP, move || Ok(built))
    }

    pub fn reset_cache(&mut self) -> usize {
        self.cache.reset()
    }

    pub fn reset_group(&mut self, group: CacheGroup) -> usize {
        self.cache.reset_group(group)
    }

    /// Snapshot of the oracle's checks and findings
    pub fn report(&self) -> FindingsReport {
        FindingsReport::from_oracle(self.id, &self.oracle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPage;
    use tablewright_common::catalog::{REFRIGERANTS, WASTE};

    struct Dashboard {
        greeting: String,
    }

    impl PageObject for Dashboard {
        const KIND: &'static str = "dashboard";
        const GROUP: CacheGroup = CacheGroup::Dashboard;

        fn build(session: &mut Session) -> Result<Self> {
            Ok(Self {
                greeting: format!("session {}", session.id()),
            })
        }
    }

    fn session() -> Session {
        Session::new(Arc::new(MockPage::new()), &SchemaCatalog::builtin(), HarnessConfig::default()).unwrap()
    }

    #[test]
    fn test_one_accessor_per_table() {
        let mut session = session();
        let a = session.table(WASTE).unwrap();
        let b = session.table(WASTE).unwrap();
        let c = session.table(REFRIGERANTS).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_reset_group_rebuilds_accessors() {
        let mut session = session();
        let before = session.table(WASTE).unwrap();
        let dashboard = session.page_object::<Dashboard>().unwrap();
        assert!(dashboard.greeting.starts_with("session "));

        assert_eq!(session.reset_group(CacheGroup::TableAccessors), 1);
        let after = session.table(WASTE).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));

        let again = session.page_object::<Dashboard>().unwrap();
        assert!(Arc::ptr_eq(&dashboard, &again));
    }

    #[test]
    fn test_unknown_table_is_invalid() {
        let mut session = session();
        assert!(session.table("water").is_err());
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut first = session();
        let mut second = session();
        assert_ne!(first.id(), second.id());
        let a = first.table(WASTE).unwrap();
        let b = second.table(WASTE).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
