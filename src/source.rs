//! Proxy sources and the registry that names them.

use crate::container::Container;
use crate::error::{Error, Result, SourceError};
use crate::geo::CountryLookup;
use crate::proxy::{Proxy, Scheme};
use crate::utils;

use anyhow::anyhow;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// One origin of proxies, such as a public list or an API.
///
/// `fetch` writes what it finds into `collector` as it goes and returns the
/// proxies it gathered. Several sources share one collector during a fetch,
/// and a source that overruns `timeout` may be cancelled at any await point,
/// keeping only what it already wrote.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        collector: Arc<Container>,
        timeout: Duration,
    ) -> std::result::Result<Vec<Proxy>, SourceError>;
}

/// Name -> source lookup used when building a pool.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn Source>) -> &mut Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Builder-style [`SourceRegistry::register`].
    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.register(Arc::new(source));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Source>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSource(name.to_string()))
    }

    /// Look up several sources, failing on the first unknown name.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Source>>> {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

/// A fixed list of proxies. Useful offline and in tests.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    proxies: Vec<Proxy>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, proxies: Vec<Proxy>) -> Self {
        Self {
            name: name.into(),
            proxies,
        }
    }

    /// Build from lines of the form `scheme://host:port COUNTRY`.
    pub fn from_lines(name: impl Into<String>, lines: &str) -> Self {
        let name = name.into();
        let proxies = lines
            .lines()
            .filter_map(|line| {
                let mut columns = line.split_whitespace();
                let url = columns.next()?;
                let country = columns.next().unwrap_or("");
                match Proxy::parse(url, name.as_str()) {
                    Ok(proxy) => Some(proxy.with_country(country)),
                    Err(e) => {
                        debug!("{}: skipping static entry '{}': {}", name, line, e);
                        None
                    }
                }
            })
            .collect();

        Self { name, proxies }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        collector: Arc<Container>,
        _timeout: Duration,
    ) -> std::result::Result<Vec<Proxy>, SourceError> {
        if self.proxies.is_empty() {
            return Err(SourceError::Empty(self.name.clone()));
        }
        collector.extend(self.proxies.iter().cloned());
        Ok(self.proxies.clone())
    }
}

/// A plain-text list of proxies served over HTTP(S) or read from a file.
pub struct ListSource {
    name: String,
    location: String,
    default_scheme: Scheme,
    lookup: Option<Arc<dyn CountryLookup>>,
}

impl ListSource {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            default_scheme: Scheme::Http,
            lookup: None,
        }
    }

    /// Scheme given to lines that don't carry one.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.default_scheme = scheme;
        self
    }

    /// Tag proxies with the country the lookup reports for their host.
    pub fn with_lookup(mut self, lookup: Arc<dyn CountryLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    fn country_for(&self, host: &str) -> String {
        let Some(lookup) = &self.lookup else {
            return String::new();
        };
        match lookup.country_of(host) {
            Ok(country) => country,
            Err(e) => {
                debug!("{}: cannot find country of '{}': {}", self.name, host, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl Source for ListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        collector: Arc<Container>,
        timeout: Duration,
    ) -> std::result::Result<Vec<Proxy>, SourceError> {
        let content = utils::read_list(&self.location, timeout).await?;

        let mut proxies = Vec::new();
        for endpoint in utils::parse_proxy_list(&content, self.default_scheme) {
            let country = self.country_for(&endpoint.host);
            let proxy = Proxy::new(endpoint, self.name.as_str()).with_country(&country);
            collector.add(proxy.clone());
            proxies.push(proxy);
        }

        debug!("{}: parsed {} proxies from {}", self.name, proxies.len(), self.location);
        if proxies.is_empty() {
            return Err(SourceError::Empty(self.name.clone()));
        }
        Ok(proxies)
    }
}

/// Runs its inner source until one fetch succeeds, then replays that result on
/// every later fetch. Failed fetches are not remembered.
pub struct FrozenSource {
    name: String,
    inner: Arc<dyn Source>,
    frozen: OnceCell<Vec<Proxy>>,
}

impl FrozenSource {
    pub fn new(inner: Arc<dyn Source>) -> Self {
        Self {
            name: format!("Frozen{{{}}}", inner.name()),
            inner,
            frozen: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Source for FrozenSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        collector: Arc<Container>,
        timeout: Duration,
    ) -> std::result::Result<Vec<Proxy>, SourceError> {
        let proxies = self
            .frozen
            .get_or_try_init(|| async {
                let scratch = Arc::new(Container::new());
                self.inner
                    .fetch(scratch, timeout)
                    .await
                    .map_err(|e| SourceError::Other(anyhow!("{}: {}", self.name, e)))
            })
            .await?;

        collector.extend(proxies.iter().cloned());
        Ok(proxies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticCountryLookup;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Source for Counting {
        fn name(&self) -> &str {
            "Counting"
        }

        async fn fetch(
            &self,
            _collector: Arc<Container>,
            _timeout: Duration,
        ) -> std::result::Result<Vec<Proxy>, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let url = format!("http://10.0.0.{}:80", n + 1);
            Ok(vec![Proxy::parse(&url, "Counting").unwrap()])
        }
    }

    /// Fails its first fetch, then serves one proxy.
    struct FailsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Source for FailsOnce {
        fn name(&self) -> &str {
            "FailsOnce"
        }

        async fn fetch(
            &self,
            _collector: Arc<Container>,
            _timeout: Duration,
        ) -> std::result::Result<Vec<Proxy>, SourceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SourceError::Empty("FailsOnce".into()));
            }
            Ok(vec![Proxy::parse("http://10.0.0.9:80", "FailsOnce").unwrap()])
        }
    }

    #[test]
    fn registry_reports_unknown_names() {
        let registry = SourceRegistry::new().with_source(StaticSource::new("Static", vec![]));

        assert!(registry.get("Static").is_ok());
        let err = registry.resolve(&["Static", "Nope"]).err().unwrap();
        assert!(matches!(err, Error::UnknownSource(name) if name == "Nope"));
        assert_eq!(registry.names(), vec!["Static".to_string()]);
    }

    #[tokio::test]
    async fn static_source_fills_collector() {
        let source = StaticSource::from_lines(
            "Static",
            "http://154.72.199.38:32954 UG\nsocks5://178.62.193.19:1080 NL\nbroken line\n",
        );
        let collector = Arc::new(Container::new());

        let proxies = source
            .fetch(Arc::clone(&collector), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.count_in("NL"), 1);
    }

    #[tokio::test]
    async fn empty_static_source_errors() {
        let source = StaticSource::new("Empty", vec![]);
        let result = source
            .fetch(Arc::new(Container::new()), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SourceError::Empty(_))));
    }

    #[tokio::test]
    async fn list_source_tags_countries() {
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "1.1.1.1:1080\n2.2.2.2:1080\n")
            .await
            .unwrap();

        let lookup = StaticCountryLookup::new().insert("1.1.1.1", "AU");
        let source = ListSource::new("File", file.path().to_str().unwrap())
            .with_scheme(Scheme::Socks5)
            .with_lookup(Arc::new(lookup));
        let collector = Arc::new(Container::new());

        let proxies = source
            .fetch(Arc::clone(&collector), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(proxies.len(), 2);
        assert!(proxies.iter().all(|p| p.scheme() == Scheme::Socks5));
        assert_eq!(collector.count_in("AU"), 1);
        assert_eq!(collector.count_in("unknown"), 1);
    }

    #[tokio::test]
    async fn frozen_source_replays_first_result() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let frozen = FrozenSource::new(inner.clone());
        assert_eq!(frozen.name(), "Frozen{Counting}");

        for _ in 0..3 {
            let proxies = frozen
                .fetch(Arc::new(Container::new()), Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(proxies[0].url(), "http://10.0.0.1:80");
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn frozen_source_retries_until_a_fetch_succeeds() {
        let inner = Arc::new(FailsOnce {
            calls: AtomicUsize::new(0),
        });
        let frozen = FrozenSource::new(inner.clone());
        let collector = Arc::new(Container::new());

        let first = frozen.fetch(Arc::clone(&collector), Duration::from_secs(1)).await;
        assert!(matches!(first, Err(SourceError::Other(_))));
        assert!(collector.is_empty());

        for _ in 0..2 {
            let proxies = frozen
                .fetch(Arc::clone(&collector), Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(proxies.len(), 1);
        }
        assert_eq!(collector.len(), 1);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
