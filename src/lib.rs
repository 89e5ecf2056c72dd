//! # proxy-pool
//!
//! A rotating pool of proxies aggregated from many unreliable public sources.
//!
//! Sources are fetched concurrently under a shared timeout and deduplicated
//! into a country-indexed container. The pool hands proxies out either
//! unused-only or at random, optionally restricted to a set of countries, and
//! falls back to its last good load or to backup sources when the primary
//! sources fail.

pub mod aggregator;
pub mod config;
pub mod container;
pub mod error;
pub mod filter;
pub mod geo;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod source;
mod utils;

pub use aggregator::Aggregator;
pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder};
pub use container::Container;
pub use error::{Error, Result, SourceError};
pub use filter::{Filter, Pipeline};
pub use geo::{CountryLookup, GeoIpLookup, StaticCountryLookup};
pub use pool::{PoolStatus, ProxyPool};
pub use probe::{HttpProbe, Probe};
pub use proxy::{Anonymity, Endpoint, Proxy, Scheme};
pub use source::{FrozenSource, ListSource, Source, SourceRegistry, StaticSource};
