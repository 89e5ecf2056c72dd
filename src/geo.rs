//! Country lookup for proxies whose source doesn't report one.

use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("malformed ip address '{0}'")]
    InvalidAddress(String),
    #[error("no country recorded for '{0}'")]
    NotFound(String),
    #[error("geo database error: {0}")]
    Database(String),
}

/// Resolves an IP address (or host) to an ISO alpha-2 country code.
pub trait CountryLookup: Send + Sync {
    fn country_of(&self, host: &str) -> Result<String, LookupError>;
}

/// Country lookup backed by a MaxMind GeoIP2/GeoLite2 database.
pub struct GeoIpLookup {
    reader: Reader<Vec<u8>>,
}

impl GeoIpLookup {
    /// Open an `.mmdb` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let reader = Reader::open_readfile(path).map_err(|e| LookupError::Database(e.to_string()))?;
        Ok(Self { reader })
    }
}

impl CountryLookup for GeoIpLookup {
    fn country_of(&self, host: &str) -> Result<String, LookupError> {
        let ip: IpAddr = host
            .trim_matches(|c| c == '[' || c == ']')
            .parse()
            .map_err(|_| LookupError::InvalidAddress(host.to_string()))?;

        let found = self
            .reader
            .lookup(ip)
            .map_err(|e| LookupError::Database(e.to_string()))?;
        let record: Option<geoip2::City> = found
            .decode()
            .map_err(|e| LookupError::Database(e.to_string()))?;

        record
            .and_then(|city| city.country.iso_code.map(String::from))
            .ok_or_else(|| LookupError::NotFound(host.to_string()))
    }
}

/// Fixed host -> country table, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticCountryLookup {
    table: HashMap<String, String>,
}

impl StaticCountryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, host: impl Into<String>, country: impl Into<String>) -> Self {
        self.table.insert(host.into(), country.into());
        self
    }
}

impl CountryLookup for StaticCountryLookup {
    fn country_of(&self, host: &str) -> Result<String, LookupError> {
        self.table
            .get(host)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(host.to_string()))
    }
}
