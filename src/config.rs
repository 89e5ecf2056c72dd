//! Configuration for the proxy pool.

use crate::filter::{Filter, Pipeline};

use std::sync::Arc;
use std::time::Duration;

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Names of the sources queried on every load.
    pub sources: Vec<String>,
    /// Names of the sources queried only when the primary ones fail.
    pub backup_sources: Vec<String>,
    /// Wall-clock budget for one fetch across all of its sources.
    pub fetch_timeout: Duration,
    /// Maximum number of sources fetched at once. `None` runs them all together.
    pub max_concurrent_fetches: Option<usize>,
    /// Reload the pool once when a selection finds it empty.
    pub reload_when_empty: bool,
    /// Restore the last good load when the primary sources fail.
    pub fallback_to_cached: bool,
    /// Query the backup sources when the primary sources fail.
    pub fallback_to_backup_sources: bool,
    /// Filters applied after every load.
    pub filters: Pipeline,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    sources: Vec<String>,
    backup_sources: Vec<String>,
    fetch_timeout: Option<Duration>,
    max_concurrent_fetches: Option<usize>,
    reload_when_empty: Option<bool>,
    fallback_to_cached: Option<bool>,
    fallback_to_backup_sources: Option<bool>,
    filters: Pipeline,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            backup_sources: Vec::new(),
            fetch_timeout: None,
            max_concurrent_fetches: None,
            reload_when_empty: None,
            fallback_to_cached: None,
            fallback_to_backup_sources: None,
            filters: Pipeline::new(),
        }
    }

    /// Set the names of the primary sources.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the names of the backup sources.
    pub fn backup_sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.backup_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timeout for one fetch.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Limit how many sources are fetched concurrently.
    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// Reload the pool once when a selection finds nothing to hand out.
    pub fn reload_when_empty(mut self, enabled: bool) -> Self {
        self.reload_when_empty = Some(enabled);
        self
    }

    /// Restore the last good load when the primary sources fail.
    pub fn fallback_to_cached(mut self, enabled: bool) -> Self {
        self.fallback_to_cached = Some(enabled);
        self
    }

    /// Query the backup sources when the primary sources fail.
    pub fn fallback_to_backup_sources(mut self, enabled: bool) -> Self {
        self.fallback_to_backup_sources = Some(enabled);
        self
    }

    /// Add one filter to the load-time pipeline.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Replace the load-time pipeline.
    pub fn filters(mut self, filters: Pipeline) -> Self {
        self.filters = filters;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            sources: self.sources,
            backup_sources: self.backup_sources,
            fetch_timeout: self.fetch_timeout.unwrap_or(Duration::from_secs(15)),
            max_concurrent_fetches: self.max_concurrent_fetches,
            reload_when_empty: self.reload_when_empty.unwrap_or(false),
            fallback_to_cached: self.fallback_to_cached.unwrap_or(false),
            fallback_to_backup_sources: self.fallback_to_backup_sources.unwrap_or(true),
            filters: self.filters,
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AllowCountries;

    #[test]
    fn defaults() {
        let config = ProxyPoolConfig::default();
        assert!(config.sources.is_empty());
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert!(!config.reload_when_empty);
        assert!(!config.fallback_to_cached);
        assert!(config.fallback_to_backup_sources);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn builder_overrides() {
        let config = ProxyPoolConfig::builder()
            .sources(vec!["Static"])
            .backup_sources(vec!["Backup"])
            .fetch_timeout(Duration::from_secs(3))
            .max_concurrent_fetches(2)
            .reload_when_empty(true)
            .fallback_to_cached(true)
            .fallback_to_backup_sources(false)
            .filter(AllowCountries::new(&["GB"]))
            .build();

        assert_eq!(config.sources, vec!["Static".to_string()]);
        assert_eq!(config.backup_sources, vec!["Backup".to_string()]);
        assert_eq!(config.max_concurrent_fetches, Some(2));
        assert!(config.reload_when_empty);
        assert!(config.fallback_to_cached);
        assert!(!config.fallback_to_backup_sources);
        assert_eq!(config.filters.len(), 1);
    }
}
