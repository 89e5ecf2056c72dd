//! Admission filters and the pipeline that chains them.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::proxy::{normalize_country, Proxy, Scheme};

use async_trait::async_trait;
use futures::future;
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Budget given to [`ConnectionFilter`] probes.
pub const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A predicate deciding whether a proxy may stay in the pool.
///
/// Filters must not have side effects on the proxy and must be safe to call
/// from many tasks at once.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn admit(&self, proxy: &Proxy) -> bool;
}

/// Filter wrapping a synchronous predicate. Build one with [`from_fn`].
pub struct FnFilter<F>(F);

#[async_trait]
impl<F> Filter for FnFilter<F>
where
    F: Fn(&Proxy) -> bool + Send + Sync,
{
    async fn admit(&self, proxy: &Proxy) -> bool {
        (self.0)(proxy)
    }
}

/// Turn a closure into a [`Filter`].
pub fn from_fn<F>(predicate: F) -> FnFilter<F>
where
    F: Fn(&Proxy) -> bool + Send + Sync,
{
    FnFilter(predicate)
}

/// Only admit proxies from the listed countries (ISO alpha-2).
#[derive(Debug, Clone)]
pub struct AllowCountries {
    countries: Vec<String>,
}

impl AllowCountries {
    pub fn new<S: AsRef<str>>(countries: &[S]) -> Self {
        let countries: Vec<_> = countries.iter().map(|c| normalize_country(c.as_ref())).collect();
        debug!("Allowing countries {:?}", countries);
        Self { countries }
    }
}

#[async_trait]
impl Filter for AllowCountries {
    async fn admit(&self, proxy: &Proxy) -> bool {
        let country = normalize_country(&proxy.country);
        self.countries.iter().any(|c| *c == country)
    }
}

/// Reject proxies from the listed countries.
#[derive(Debug, Clone)]
pub struct DisallowCountries {
    countries: Vec<String>,
}

impl DisallowCountries {
    pub fn new<S: AsRef<str>>(countries: &[S]) -> Self {
        let countries: Vec<_> = countries.iter().map(|c| normalize_country(c.as_ref())).collect();
        debug!("Disallowing countries {:?}", countries);
        Self { countries }
    }
}

#[async_trait]
impl Filter for DisallowCountries {
    async fn admit(&self, proxy: &Proxy) -> bool {
        let country = normalize_country(&proxy.country);
        !self.countries.iter().any(|c| *c == country)
    }
}

/// Only admit the given proxy schemes.
#[derive(Debug, Clone)]
pub struct ProxyTypes {
    schemes: Vec<Scheme>,
}

impl ProxyTypes {
    pub fn new(schemes: Vec<Scheme>) -> Self {
        debug!("Allowing proxy types {:?}", schemes);
        Self { schemes }
    }

    /// Parse scheme names such as `"HTTP"` or `"socks5"`.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let schemes = names
            .iter()
            .map(|name| {
                name.as_ref().parse::<Scheme>().map_err(|_| {
                    Error::InvalidFilter(format!("invalid proxy type '{}'", name.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(schemes))
    }
}

#[async_trait]
impl Filter for ProxyTypes {
    async fn admit(&self, proxy: &Proxy) -> bool {
        self.schemes.contains(&proxy.scheme())
    }
}

/// Only admit proxies that answer a probe within `within`.
pub struct SpeedFilter {
    probe: Arc<dyn Probe>,
    within: Duration,
}

impl SpeedFilter {
    pub fn new(probe: Arc<dyn Probe>, within: Duration) -> Self {
        debug!("Applying proxy speed filter with a budget of {:?}", within);
        Self { probe, within }
    }
}

#[async_trait]
impl Filter for SpeedFilter {
    async fn admit(&self, proxy: &Proxy) -> bool {
        self.probe.probe(proxy, self.within).await
    }
}

/// Only admit proxies that can be reached at all, using a generous budget.
pub struct ConnectionFilter {
    probe: Arc<dyn Probe>,
}

impl ConnectionFilter {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Filter for ConnectionFilter {
    async fn admit(&self, proxy: &Proxy) -> bool {
        self.probe.probe(proxy, CONNECTION_CHECK_TIMEOUT).await
    }
}

/// An ordered list of filters combined with AND.
#[derive(Clone, Default)]
pub struct Pipeline {
    filters: Vec<Arc<dyn Filter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter, builder style.
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.push(Arc::new(filter));
        self
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Append every filter of `other` after this pipeline's own.
    pub fn chain(mut self, other: &Pipeline) -> Self {
        self.filters.extend(other.filters.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether every filter admits `proxy`. Stops at the first rejection.
    pub async fn admits(&self, proxy: &Proxy) -> bool {
        for filter in &self.filters {
            if !filter.admit(proxy).await {
                return false;
            }
        }
        true
    }

    /// Build a new container holding the admitted proxies of `container`.
    ///
    /// Proxies are checked concurrently, which matters for probe-based filters.
    pub async fn apply(&self, container: &Container) -> Container {
        if self.filters.is_empty() {
            return container.clone();
        }

        let candidates = container.snapshot();
        let verdicts = future::join_all(candidates.iter().map(|p| self.admits(p))).await;

        let admitted: Container = candidates
            .into_iter()
            .zip(verdicts)
            .filter_map(|(proxy, admitted)| admitted.then_some(proxy))
            .collect();
        debug!(
            "Filters admitted {}/{} proxies",
            admitted.len(),
            container.len()
        );
        admitted
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("filters", &self.filters.len())
            .finish()
    }
}
