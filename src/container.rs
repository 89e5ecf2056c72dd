//! Concurrent, deduplicating store of proxies indexed by country.

use crate::error::{Error, Result};
use crate::proxy::{normalize_country, Endpoint, Proxy};

use parking_lot::RwLock;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Buckets {
    /// Country code -> proxies from that country. Never holds an empty bucket.
    by_country: HashMap<String, HashMap<Endpoint, Proxy>>,
    /// Endpoint -> the bucket it lives in.
    index: HashMap<Endpoint, String>,
}

impl Buckets {
    fn pick(&self, buckets: &[&HashMap<Endpoint, Proxy>]) -> Result<Proxy> {
        let total: usize = buckets.iter().map(|b| b.len()).sum();
        if total == 0 {
            return Err(Error::NoProxyAvailable);
        }

        let idx = rand::rng().random_range(0..total);
        buckets
            .iter()
            .flat_map(|b| b.values())
            .nth(idx)
            .cloned()
            .ok_or(Error::NoProxyAvailable)
    }
}

/// A set of proxies that is safe to share between tasks.
///
/// Proxies are grouped by country so country-restricted lookups only touch
/// the buckets they ask for. An endpoint is stored at most once; adding it
/// again, even with different metadata, leaves the first copy in place.
///
/// Every operation takes the lock exactly once, so a membership test and the
/// insert that follows it can't interleave with another writer. Cloning is
/// O(1): both copies share the same buckets until one of them is written to,
/// at which point the writer gets its own copy.
#[derive(Debug, Default)]
pub struct Container {
    inner: RwLock<Arc<Buckets>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a proxy. Returns `false` if its endpoint was already present.
    pub fn add(&self, proxy: Proxy) -> bool {
        let mut guard = self.inner.write();
        if guard.index.contains_key(&proxy.endpoint) {
            return false;
        }

        let buckets = Arc::make_mut(&mut *guard);
        let country = normalize_country(&proxy.country);
        buckets.index.insert(proxy.endpoint.clone(), country.clone());
        buckets
            .by_country
            .entry(country)
            .or_default()
            .insert(proxy.endpoint.clone(), proxy);
        true
    }

    /// Remove a proxy by endpoint. Returns `false` if it wasn't present.
    pub fn remove(&self, proxy: &Proxy) -> bool {
        let mut guard = self.inner.write();
        let Some(country) = guard.index.get(&proxy.endpoint).cloned() else {
            return false;
        };

        let buckets = Arc::make_mut(&mut *guard);
        buckets.index.remove(&proxy.endpoint);
        if let Some(bucket) = buckets.by_country.get_mut(&country) {
            bucket.remove(&proxy.endpoint);
            if bucket.is_empty() {
                buckets.by_country.remove(&country);
            }
        }
        true
    }

    pub fn contains(&self, proxy: &Proxy) -> bool {
        self.inner.read().index.contains_key(&proxy.endpoint)
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of proxies stored under `country`.
    pub fn count_in(&self, country: &str) -> usize {
        self.inner
            .read()
            .by_country
            .get(&normalize_country(country))
            .map_or(0, |b| b.len())
    }

    /// Countries that currently have at least one proxy.
    pub fn countries(&self) -> Vec<String> {
        self.inner.read().by_country.keys().cloned().collect()
    }

    /// Copy every proxy out of the container, in no particular order.
    pub fn snapshot(&self) -> Vec<Proxy> {
        self.inner
            .read()
            .by_country
            .values()
            .flat_map(|b| b.values().cloned())
            .collect()
    }

    /// Add every proxy from `proxies`, returning how many were new.
    pub fn extend<I>(&self, proxies: I) -> usize
    where
        I: IntoIterator<Item = Proxy>,
    {
        proxies.into_iter().map(|p| self.add(p)).filter(|added| *added).count()
    }

    /// Pick a proxy with equal probability across the whole container.
    ///
    /// Walks the flattened buckets, so the cost grows with the total size.
    pub fn random_uniform(&self) -> Result<Proxy> {
        let guard = self.inner.read();
        let buckets: Vec<_> = guard.by_country.values().collect();
        guard.pick(&buckets)
    }

    /// Pick a country uniformly, then a proxy uniformly within it.
    ///
    /// This is cheap but NOT uniform over proxies: a proxy in a country with
    /// few entries is more likely to be drawn than one in a crowded country.
    /// Use [`Container::random_uniform`] when the distribution matters.
    pub fn random_biased(&self) -> Result<Proxy> {
        let guard = self.inner.read();
        if guard.by_country.is_empty() {
            return Err(Error::NoProxyAvailable);
        }

        let mut rng = rand::rng();
        let bucket_idx = rng.random_range(0..guard.by_country.len());
        let bucket = guard
            .by_country
            .values()
            .nth(bucket_idx)
            .ok_or(Error::NoProxyAvailable)?;
        let idx = rng.random_range(0..bucket.len());
        bucket.values().nth(idx).cloned().ok_or(Error::NoProxyAvailable)
    }

    /// Pick a proxy uniformly from the union of the given countries.
    pub fn random_from_countries<S: AsRef<str>>(&self, countries: &[S]) -> Result<Proxy> {
        let wanted: HashSet<String> = countries
            .iter()
            .map(|c| normalize_country(c.as_ref()))
            .collect();

        let guard = self.inner.read();
        let buckets: Vec<_> = wanted
            .iter()
            .filter_map(|c| guard.by_country.get(c))
            .collect();
        guard.pick(&buckets)
    }
}

impl Clone for Container {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(Arc::clone(&self.inner.read())),
        }
    }
}

impl FromIterator<Proxy> for Container {
    fn from_iter<I: IntoIterator<Item = Proxy>>(iter: I) -> Self {
        let container = Container::new();
        container.extend(iter);
        container
    }
}
