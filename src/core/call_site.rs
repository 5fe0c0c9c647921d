//! Call-site registry
//!
//! Every distinct log statement is registered once per logger and gets a
//! stable [`CallSiteId`]: an index into an append-only arena. The
//! descriptor holds the location strings shown in headers, the compiled
//! template and the rate-limit policy together with its state. Records in
//! the queues carry only the id.

use super::log_level::LogLevel;
use super::rate_limit::{RateLimit, RateLimitState};
use super::template::Template;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable index of a registered call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteId(u32);

impl CallSiteId {
    #[inline]
    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Everything known about a log statement before it is registered
#[derive(Debug, Clone)]
pub struct CallSiteMeta {
    pub source_file: Cow<'static, str>,
    pub source_line: u32,
    pub source_column: u32,
    /// Replaces `file:line` in headers and callbacks when set
    pub location_override: Option<Cow<'static, str>>,
    pub level: LogLevel,
    pub template: Cow<'static, str>,
    pub rate_limit: RateLimit,
    /// Address of the [`CallSiteCache`] of the statement, or 0 for a
    /// registration made by hand
    ///
    /// Statements expanded from one user macro share a span, so the
    /// location alone cannot tell them apart.
    pub origin: usize,
}

impl CallSiteMeta {
    pub fn new(
        source_file: impl Into<Cow<'static, str>>,
        source_line: u32,
        level: LogLevel,
        template: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            source_line,
            source_column: 0,
            location_override: None,
            level,
            template: template.into(),
            rate_limit: RateLimit::None,
            origin: 0,
        }
    }

    #[must_use]
    pub fn column(mut self, column: u32) -> Self {
        self.source_column = column;
        self
    }

    #[must_use]
    pub fn location(mut self, location: impl Into<Cow<'static, str>>) -> Self {
        self.location_override = Some(location.into());
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// A registered call site
#[derive(Debug)]
pub struct CallSite {
    id: CallSiteId,
    level: LogLevel,
    /// `basename:line`, or the override
    short_location: String,
    /// `path:line`, or the override
    full_location: String,
    template: Template,
    rate_limit: RateLimit,
    rate_state: RateLimitState,
}

impl CallSite {
    fn from_meta(id: CallSiteId, meta: CallSiteMeta) -> Self {
        let (short_location, full_location) = match &meta.location_override {
            Some(location) => (location.to_string(), location.to_string()),
            None => {
                let file = meta.source_file.as_ref();
                let base = file.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file);
                (
                    format!("{}:{}", base, meta.source_line),
                    format!("{}:{}", file, meta.source_line),
                )
            }
        };
        Self {
            id,
            level: meta.level,
            short_location,
            full_location,
            template: Template::compile(meta.template),
            rate_limit: meta.rate_limit,
            rate_state: RateLimitState::new(),
        }
    }

    pub fn id(&self) -> CallSiteId {
        self.id
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn short_location(&self) -> &str {
        &self.short_location
    }

    pub fn full_location(&self) -> &str {
        &self.full_location
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }

    #[inline]
    pub fn may_pass(&self, timestamp_ns: u64) -> bool {
        self.rate_state.may_pass(self.rate_limit, timestamp_ns)
    }

    pub fn admit(&self, timestamp_ns: u64) -> bool {
        self.rate_state.admit(self.rate_limit, timestamp_ns)
    }
}

type SiteKey = (Cow<'static, str>, u32, u32, usize);

#[derive(Default)]
struct RegistryInner {
    sites: Vec<Arc<CallSite>>,
    by_key: HashMap<SiteKey, CallSiteId>,
}

/// Append-only table of call sites owned by one logger
pub struct CallSiteRegistry {
    instance: u32,
    inner: RwLock<RegistryInner>,
}

impl CallSiteRegistry {
    /// `instance` tags ids handed to [`CallSiteCache`]; it must be non-zero
    /// and unique per live registry
    pub fn new(instance: u32) -> Self {
        Self {
            instance,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Register a call site, or return the id it already has
    ///
    /// Keyed by `(file, line, column, origin)`. A repeated registration
    /// keeps the first descriptor and its rate-limit state.
    pub fn register(&self, meta: CallSiteMeta) -> CallSiteId {
        let key: SiteKey = (
            meta.source_file.clone(),
            meta.source_line,
            meta.source_column,
            meta.origin,
        );
        if let Some(id) = self.inner.read().by_key.get(&key) {
            return *id;
        }

        let mut inner = self.inner.write();
        if let Some(id) = inner.by_key.get(&key) {
            return *id;
        }
        let id = CallSiteId(inner.sites.len() as u32);
        let site = CallSite::from_meta(id, meta);
        if let Err(e) = site.template().check() {
            eprintln!(
                "[LOGGER WARNING] {} at {}; it will render as a diagnostic",
                e,
                site.full_location()
            );
        }
        inner.sites.push(Arc::new(site));
        inner.by_key.insert(key, id);
        id
    }

    pub fn get(&self, id: CallSiteId) -> Option<Arc<CallSite>> {
        self.inner.read().sites.get(id.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the sites `cache` does not hold yet
    pub(crate) fn extend_cache(&self, cache: &mut Vec<Arc<CallSite>>) {
        let inner = self.inner.read();
        let known = cache.len();
        if known < inner.sites.len() {
            cache.extend(inner.sites[known..].iter().cloned());
        }
    }
}

impl std::fmt::Debug for CallSiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSiteRegistry")
            .field("instance", &self.instance)
            .field("sites", &self.len())
            .finish()
    }
}

/// Per-statement memo of the registered id, meant to live in a `static`
///
/// The slot packs `instance << 32 | id`; a statement used with a different
/// logger simply re-registers and overwrites the slot.
pub struct CallSiteCache {
    slot: AtomicU64,
}

impl CallSiteCache {
    pub const fn new() -> Self {
        Self {
            slot: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn get_or_register(
        &self,
        registry: &CallSiteRegistry,
        meta: impl FnOnce() -> CallSiteMeta,
    ) -> CallSiteId {
        let packed = self.slot.load(Ordering::Relaxed);
        if (packed >> 32) as u32 == registry.instance() {
            return CallSiteId(packed as u32);
        }
        let mut meta = meta();
        meta.origin = self as *const Self as usize;
        let id = registry.register(meta);
        self.slot
            .store(((registry.instance() as u64) << 32) | id.0 as u64, Ordering::Relaxed);
        id
    }
}

impl Default for CallSiteCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn meta(line: u32) -> CallSiteMeta {
        CallSiteMeta::new("src/net/session.rs", line, LogLevel::Info, "value {}")
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = CallSiteRegistry::new(1);
        let a = registry.register(meta(10));
        let b = registry.register(meta(20));
        let again = registry.register(meta(10).rate_limit(RateLimit::Once));

        assert_ne!(a, b);
        assert_eq!(a, again);
        assert_eq!(registry.len(), 2);
        // first descriptor wins
        assert_eq!(registry.get(a).unwrap().rate_limit(), RateLimit::None);
    }

    #[test]
    fn test_column_distinguishes_sites_on_one_line() {
        let registry = CallSiteRegistry::new(1);
        let a = registry.register(meta(5).column(1));
        let b = registry.register(meta(5).column(30));
        assert_ne!(a, b);
    }

    #[test]
    fn test_reregistration_keeps_rate_state() {
        let registry = CallSiteRegistry::new(1);
        let id = registry.register(meta(1).rate_limit(RateLimit::Once));
        assert!(registry.get(id).unwrap().admit(0));

        let again = registry.register(meta(1).rate_limit(RateLimit::Once));
        assert!(!registry.get(again).unwrap().admit(1));
    }

    #[test]
    fn test_locations() {
        let registry = CallSiteRegistry::new(1);
        let plain = registry.get(registry.register(meta(42))).unwrap();
        assert_eq!(plain.short_location(), "session.rs:42");
        assert_eq!(plain.full_location(), "src/net/session.rs:42");

        let custom = registry
            .get(registry.register(meta(43).location("order-gateway")))
            .unwrap();
        assert_eq!(custom.short_location(), "order-gateway");
        assert_eq!(custom.full_location(), "order-gateway");
    }

    #[test]
    fn test_bad_template_still_registers() {
        let registry = CallSiteRegistry::new(1);
        let id = registry.register(CallSiteMeta::new("a.rs", 1, LogLevel::Warn, "oops {"));
        let site = registry.get(id).unwrap();
        assert!(site.template().error().is_some());
        assert_eq!(site.level(), LogLevel::Warn);
    }

    #[test]
    fn test_cache_registers_once_per_registry() {
        static CACHE: CallSiteCache = CallSiteCache::new();
        let calls = AtomicUsize::new(0);
        let first = CallSiteRegistry::new(7);
        let second = CallSiteRegistry::new(8);

        let make = || {
            calls.fetch_add(1, Ordering::Relaxed);
            meta(99)
        };
        let a = CACHE.get_or_register(&first, make);
        let b = CACHE.get_or_register(&first, make);
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        CACHE.get_or_register(&second, make);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_caches_on_one_line_get_distinct_sites() {
        // two statements expanded from one user macro share file, line and column
        static FIRST: CallSiteCache = CallSiteCache::new();
        static SECOND: CallSiteCache = CallSiteCache::new();
        let registry = CallSiteRegistry::new(1);

        let a = FIRST.get_or_register(&registry, || meta(12).column(5));
        let b = SECOND.get_or_register(&registry, || {
            CallSiteMeta::new("src/net/session.rs", 12, LogLevel::Warn, "other {} {}").column(5)
        });
        assert_ne!(a, b);
        assert_eq!(registry.get(b).unwrap().level(), LogLevel::Warn);
        assert_eq!(registry.get(b).unwrap().template().source(), "other {} {}");

        // a hand registration at that location is a third site
        let manual = registry.register(meta(12).column(5));
        assert_ne!(manual, a);
        assert_eq!(registry.register(meta(12).column(5)), manual);
    }

    #[test]
    fn test_extend_cache() {
        let registry = CallSiteRegistry::new(1);
        let mut cache = Vec::new();
        registry.register(meta(1));
        registry.extend_cache(&mut cache);
        assert_eq!(cache.len(), 1);
        registry.register(meta(2));
        registry.register(meta(3));
        registry.extend_cache(&mut cache);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache[2].id(), CallSiteId::from_u32(2));
    }
}
