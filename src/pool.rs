//! Core proxy pool implementation.

use crate::aggregator::Aggregator;
use crate::config::ProxyPoolConfig;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::filter::Pipeline;
use crate::proxy::Proxy;
use crate::source::{Source, SourceRegistry};

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where the pool's current population came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Nothing has been loaded yet.
    Empty,
    /// The population comes from a successful fetch.
    Loaded,
    /// The last load failed and the population was restored from the cache.
    StaleCache,
}

#[derive(Debug, Clone, Copy)]
enum Population {
    All,
    Unused,
}

struct Cache {
    all: Container,
    unused: Container,
}

struct PoolState {
    all: Container,
    unused: Container,
    cache: Option<Cache>,
    status: PoolStatus,
}

impl PoolState {
    fn draw(&self, from: Population, countries: Option<&[String]>) -> Result<Proxy> {
        let population = match from {
            Population::All => &self.all,
            Population::Unused => &self.unused,
        };
        match countries {
            Some(countries) => population.random_from_countries(countries),
            None => population.random_uniform(),
        }
    }
}

/// A pool of proxies gathered from several sources.
///
/// The pool tracks every loaded proxy (`all`) and the ones not handed out yet
/// (`unused`). Every public method runs under one pool-wide lock, so a reload
/// triggered by a selection can't interleave with another caller.
pub struct ProxyPool {
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    primary: Aggregator,
    backup: Aggregator,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// Create a new proxy pool, resolving source names through `registry`.
    /// Nothing is fetched until [`ProxyPool::load`] or a selection needs it.
    pub fn new(config: ProxyPoolConfig, registry: &SourceRegistry) -> Result<Self> {
        let primary = Self::aggregator(&config, registry.resolve(&config.sources)?);
        let backup = Self::aggregator(&config, registry.resolve(&config.backup_sources)?);

        info!(
            "Created proxy pool using sources {:?} (backup {:?})",
            config.sources, config.backup_sources
        );

        Ok(Self {
            config,
            primary,
            backup,
            state: Mutex::new(PoolState {
                all: Container::new(),
                unused: Container::new(),
                cache: None,
                status: PoolStatus::Empty,
            }),
        })
    }

    fn aggregator(config: &ProxyPoolConfig, sources: Vec<Arc<dyn Source>>) -> Aggregator {
        let aggregator = Aggregator::new(sources, config.fetch_timeout);
        match config.max_concurrent_fetches {
            Some(limit) => aggregator.with_concurrency(limit),
            None => aggregator,
        }
    }

    /// Load fresh proxies, falling back to the cache and then to the backup
    /// sources as configured.
    ///
    /// On failure the pool keeps exactly the proxies it had before the call.
    pub async fn load(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state).await
    }

    async fn load_locked(&self, state: &mut PoolState) -> Result<()> {
        info!("Attempting to load new proxies");

        let primary_error = match self.primary.fetch().await {
            Ok(fetched) => {
                self.install(state, fetched).await;
                return Ok(());
            }
            Err(e) => e,
        };
        warn!("Error occurred while fetching proxies: {}", primary_error);

        let mut fell_back = false;

        if self.config.fallback_to_cached {
            fell_back = true;
            match self.restore_cache(state).await {
                Ok(()) => {
                    info!("Restored {} cached proxies", state.all.len());
                    return Ok(());
                }
                Err(e) => warn!("Could not apply cache: {}", e),
            }
        }

        if self.config.fallback_to_backup_sources && !self.backup.sources().is_empty() {
            fell_back = true;
            warn!("Falling back to {} backup sources", self.backup.sources().len());
            match self.backup.fetch().await {
                Ok(fetched) => {
                    self.merge(state, fetched).await;
                    return Ok(());
                }
                Err(e) => warn!("Error occurred while fetching backup proxies: {}", e),
            }
        }

        if fell_back {
            Err(Error::FallbackExhausted {
                source: Box::new(primary_error),
            })
        } else {
            Err(primary_error)
        }
    }

    /// Replace the population with a fresh fetch and remember it as the cache.
    async fn install(&self, state: &mut PoolState, fetched: Container) {
        let filtered = self.config.filters.apply(&fetched).await;
        if filtered.is_empty() {
            warn!("Filters rejected all {} fetched proxies", fetched.len());
        }

        state.all = filtered.clone();
        state.unused = filtered;
        state.cache = Some(Cache {
            all: state.all.clone(),
            unused: state.unused.clone(),
        });
        state.status = PoolStatus::Loaded;
        info!("Loaded {} proxies", state.all.len());
    }

    async fn restore_cache(&self, state: &mut PoolState) -> Result<()> {
        let cache = state.cache.as_ref().ok_or(Error::NoCache)?;
        let (all, unused) = refilter(&self.config.filters, &cache.all, &cache.unused).await;

        state.all = all;
        state.unused = unused;
        state.status = PoolStatus::StaleCache;
        Ok(())
    }

    /// Union a backup fetch into the current population.
    async fn merge(&self, state: &mut PoolState, fetched: Container) {
        let all = state.all.clone();
        let unused = state.unused.clone();
        let fresh = fetched.snapshot();
        all.extend(fresh.iter().cloned());
        let added = unused.extend(fresh);

        let (all, unused) = refilter(&self.config.filters, &all, &unused).await;

        state.all = all;
        state.unused = unused;
        if state.status == PoolStatus::Empty {
            state.status = PoolStatus::Loaded;
        }
        info!("Merged {} new proxies from backup sources", added);
    }

    /// Fetch from the primary sources only, without any fallback.
    pub async fn fetch(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let fetched = self.primary.fetch().await?;
        self.install(&mut state, fetched).await;
        Ok(())
    }

    /// Fetch from the backup sources and merge them into the pool.
    pub async fn fetch_backup(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let fetched = self.backup.fetch().await?;
        self.merge(&mut state, fetched).await;
        Ok(())
    }

    /// Revert to the proxies captured by the last successful primary load.
    pub async fn apply_cache(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.restore_cache(&mut state).await
    }

    /// Apply `filters` to both the full and the unused population.
    pub async fn filter(&self, filters: &Pipeline) {
        let mut state = self.state.lock().await;
        let (all, unused) = refilter(filters, &state.all, &state.unused).await;
        state.all = all;
        state.unused = unused;
    }

    /// Hand out a proxy that hasn't been handed out since the last load.
    pub async fn new_proxy(&self) -> Result<Proxy> {
        self.dispense(Population::Unused, None).await
    }

    /// Hand out any loaded proxy, used or not. It is still marked as used.
    pub async fn random(&self) -> Result<Proxy> {
        self.dispense(Population::All, None).await
    }

    /// Like [`ProxyPool::new_proxy`], restricted to the given countries.
    pub async fn new_from_country<S: AsRef<str> + Sync>(&self, countries: &[S]) -> Result<Proxy> {
        let countries = owned(countries);
        self.dispense(Population::Unused, Some(&countries)).await
    }

    /// Like [`ProxyPool::random`], restricted to the given countries.
    pub async fn random_from_country<S: AsRef<str> + Sync>(&self, countries: &[S]) -> Result<Proxy> {
        let countries = owned(countries);
        self.dispense(Population::All, Some(&countries)).await
    }

    async fn dispense(&self, from: Population, countries: Option<&[String]>) -> Result<Proxy> {
        let mut state = self.state.lock().await;

        let proxy = match state.draw(from, countries) {
            Err(Error::NoProxyAvailable) if self.config.reload_when_empty => {
                info!("No {:?} proxies left to select from, reloading pool", from);
                self.load_locked(&mut state)
                    .await
                    .map_err(|e| Error::Reload {
                        source: Box::new(e),
                    })?;
                state.draw(from, countries)?
            }
            drawn => drawn?,
        };

        state.unused.remove(&proxy);
        Ok(proxy)
    }

    /// Number of loaded proxies, used or not.
    pub async fn size_all(&self) -> usize {
        self.state.lock().await.all.len()
    }

    /// Number of proxies not handed out yet.
    pub async fn size_unused(&self) -> usize {
        self.state.lock().await.unused.len()
    }

    pub async fn status(&self) -> PoolStatus {
        self.state.lock().await.status
    }

    /// Whether a successful primary load has been cached.
    pub async fn has_cache(&self) -> bool {
        self.state.lock().await.cache.is_some()
    }

    /// Copy of every loaded proxy.
    pub async fn all(&self) -> Vec<Proxy> {
        self.state.lock().await.all.snapshot()
    }

    /// Copy of every proxy not handed out yet.
    pub async fn unused(&self) -> Vec<Proxy> {
        self.state.lock().await.unused.snapshot()
    }
}

/// Filter `all` once and keep only the unused proxies that survived it, so
/// `unused` stays a subset of `all` even when filters disagree between calls.
async fn refilter(filters: &Pipeline, all: &Container, unused: &Container) -> (Container, Container) {
    let all = filters.apply(all).await;
    let unused = unused
        .snapshot()
        .into_iter()
        .filter(|proxy| all.contains(proxy))
        .collect();
    (all, unused)
}

fn owned<S: AsRef<str>>(countries: &[S]) -> Vec<String> {
    countries.iter().map(|c| c.as_ref().to_string()).collect()
}
