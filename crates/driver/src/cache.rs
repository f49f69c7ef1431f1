//! Per-session page-object cache
//!
//! Page objects are memoized by kind so a session never holds two live
//! accessors for the same table. Each entry carries a group tag; resetting a
//! group drops every entry with that tag, and the next lookup builds a fresh
//! instance.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tablewright_common::{Error, Locus, Result};
use tracing::debug;

/// Reset tag of a cached page object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheGroup {
    Authentication,
    Dashboard,
    TableAccessors,
    Common,
}

impl CacheGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheGroup::Authentication => "authentication",
            CacheGroup::Dashboard => "dashboard",
            CacheGroup::TableAccessors => "table-accessors",
            CacheGroup::Common => "common",
        }
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authentication" => Ok(CacheGroup::Authentication),
            "dashboard" => Ok(CacheGroup::Dashboard),
            "table-accessors" => Ok(CacheGroup::TableAccessors),
            "common" => Ok(CacheGroup::Common),
            other => Err(Error::invalid(
                Locus::default(),
                format!("unknown cache group '{}'", other),
            )),
        }
    }
}

struct CacheEntry {
    group: CacheGroup,
    instance: Arc<dyn Any + Send + Sync>,
}

/// Keyed store of page objects for one session
#[derive(Default)]
pub struct PageObjectCache {
    entries: HashMap<String, CacheEntry>,
}

impl PageObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached instance of `kind`, if present and of type `T`
    pub fn get<T: Any + Send + Sync>(&self, kind: &str) -> Option<Arc<T>> {
        self.entries
            .get(kind)
            .and_then(|entry| entry.instance.clone().downcast::<T>().ok())
    }

    /// Cached instance of `kind`, building and storing it on first use
    pub fn get_or_try_insert_with<T, F>(&mut self, kind: &str, group: CacheGroup, build: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T>,
    {
        if let Some(entry) = self.entries.get(kind) {
            return entry.instance.clone().downcast::<T>().map_err(|_| {
                Error::invalid(
                    Locus::default(),
                    format!("page object '{}' is cached with a different type", kind),
                )
            });
        }

        let instance = Arc::new(build()?);
        debug!(kind, group = %group, "Cached page object");
        self.insert(kind, group, instance.clone());
        Ok(instance)
    }

    /// Store an instance under `kind`, replacing any previous entry
    pub fn insert<T: Any + Send + Sync>(&mut self, kind: &str, group: CacheGroup, instance: Arc<T>) {
        self.entries.insert(
            kind.to_string(),
            CacheEntry {
                group,
                instance,
            },
        );
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; returns how many were dropped
    pub fn reset(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "Page-object cache reset");
        dropped
    }

    /// Drop the entries tagged `group`; returns how many were dropped
    pub fn reset_group(&mut self, group: CacheGroup) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.group != group);
        let dropped = before - self.entries.len();
        debug!(group = %group, dropped, "Page-object cache group reset");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    struct LoginPage;
    struct Banner(&'static str);

    #[test]
    fn test_memoized_per_kind() {
        let mut cache = PageObjectCache::new();
        let a = cache
            .get_or_try_insert_with("banner", CacheGroup::Common, || Ok(Banner("hello")))
            .unwrap();
        let b = cache
            .get_or_try_insert_with("banner", CacheGroup::Common, || Ok(Banner("other")))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.0, "hello");
    }

    #[test]
    fn test_reset_group_only_drops_tagged_entries() {
        let mut cache = PageObjectCache::new();
        cache.insert("login", CacheGroup::Authentication, Arc::new(LoginPage));
        cache.insert("banner", CacheGroup::Common, Arc::new(Banner("hi")));

        assert_eq!(cache.reset_group(CacheGroup::Authentication), 1);
        assert!(!cache.contains("login"));
        assert!(cache.get::<Banner>("banner").is_some());

        assert_eq!(cache.reset(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_type_confusion_is_invalid() {
        let mut cache = PageObjectCache::new();
        cache.insert("login", CacheGroup::Authentication, Arc::new(LoginPage));
        assert!(cache.get::<Banner>("login").is_none());
        assert!(cache
            .get_or_try_insert_with("login", CacheGroup::Authentication, || Ok(Banner("x")))
            .is_err());
    }

    #[test]
    fn test_failed_build_caches_nothing() {
        let mut cache = PageObjectCache::new();
        let result = cache.get_or_try_insert_with::<Banner, _>("banner", CacheGroup::Common, || {
            Err(Error::Driver("page closed".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test_case("authentication", CacheGroup::Authentication)]
    #[test_case("dashboard", CacheGroup::Dashboard)]
    #[test_case("table-accessors", CacheGroup::TableAccessors)]
    #[test_case("common", CacheGroup::Common)]
    fn test_group_names_round_trip(name: &str, group: CacheGroup) {
        assert_eq!(name.parse::<CacheGroup>().unwrap(), group);
        assert_eq!(group.to_string(), name);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        assert!("tables".parse::<CacheGroup>().is_err());
    }
}
