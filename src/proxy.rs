//! Proxy representation and endpoint identity.

use crate::error::Error;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Country code used when the origin of a proxy is not known.
pub const UNKNOWN_COUNTRY: &str = "unknown";

/// Protocol spoken by a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Socks4 => "socks4",
            Scheme::Socks5 => "socks5",
        }
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            "socks4" => Ok(Scheme::Socks4),
            "socks5" => Ok(Scheme::Socks5),
            other => Err(Error::InvalidProxy(format!("unsupported scheme '{}'", other))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a proxy reveals about its client, as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anonymity {
    Elite,
    Anonymous,
    Transparent,
    Unknown,
}

impl FromStr for Anonymity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elite" | "high" => Ok(Anonymity::Elite),
            "anonymous" => Ok(Anonymity::Anonymous),
            "transparent" => Ok(Anonymity::Transparent),
            "unknown" | "" => Ok(Anonymity::Unknown),
            other => Err(Error::InvalidProxy(format!("unknown anonymity level '{}'", other))),
        }
    }
}

/// The (scheme, host, port) triple that identifies a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// The endpoint as a proxy URL, e.g. `socks5://127.0.0.1:1080`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let parsed = Url::parse(raw).map_err(|e| Error::InvalidProxy(format!("{}: {}", raw, e)))?;
        let scheme: Scheme = parsed.scheme().parse()?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidProxy(format!("{}: missing host", raw)))?;
        // `port()` hides the scheme default, so `http://h:80` still needs the fallback.
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidProxy(format!("{}: missing port", raw)))?;

        Ok(Endpoint::new(scheme, host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// A proxy endpoint plus the metadata its source reported.
///
/// Equality and hashing only look at the endpoint: two values describing the
/// same `scheme://host:port` are the same proxy whatever country or source
/// they were tagged with.
#[derive(Debug, Clone)]
pub struct Proxy {
    /// Where the proxy listens.
    pub endpoint: Endpoint,
    /// ISO 3166-1 alpha-2 code in upper case, or [`UNKNOWN_COUNTRY`].
    pub country: String,
    /// Name of the source that produced this proxy.
    pub source: String,
    /// Anonymity level, if the source reports one.
    pub anonymity: Option<Anonymity>,
    /// Timeout the source used when it vetted the proxy, if any.
    pub declared_timeout: Option<Duration>,
}

impl Proxy {
    /// Create a proxy of unknown origin.
    pub fn new(endpoint: Endpoint, source: impl Into<String>) -> Self {
        Self {
            endpoint,
            country: UNKNOWN_COUNTRY.to_string(),
            source: source.into(),
            anonymity: None,
            declared_timeout: None,
        }
    }

    /// Parse a proxy URL such as `http://1.2.3.4:8080`.
    pub fn parse(url: &str, source: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::new(url.parse()?, source))
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = normalize_country(country);
        self
    }

    pub fn with_anonymity(mut self, anonymity: Anonymity) -> Self {
        self.anonymity = Some(anonymity);
        self
    }

    pub fn with_declared_timeout(mut self, timeout: Duration) -> Self {
        self.declared_timeout = Some(timeout);
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.endpoint.scheme
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn url(&self) -> String {
        self.endpoint.url()
    }

    /// Convert the proxy URL to a reqwest::Proxy.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.url())
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {} [{}]", self.country, self.endpoint, self.source)
    }
}

/// Normalise a country code: upper-case alpha codes, anything blank or
/// spelled "unknown" becomes [`UNKNOWN_COUNTRY`].
pub fn normalize_country(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case(UNKNOWN_COUNTRY) {
        UNKNOWN_COUNTRY.to_string()
    } else {
        code.to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socks_and_http_urls() {
        let proxy = Proxy::parse("socks5://94.130.73.24:37188", "test").unwrap();
        assert_eq!(proxy.scheme(), Scheme::Socks5);
        assert_eq!(proxy.host(), "94.130.73.24");
        assert_eq!(proxy.endpoint.port, 37188);
        assert_eq!(proxy.country, UNKNOWN_COUNTRY);

        let http = Proxy::parse("http://1.1.1.1:80", "test").unwrap();
        assert_eq!(http.endpoint.port, 80);
        assert_eq!(http.url(), "http://1.1.1.1:80");
    }

    #[test]
    fn rejects_unsupported_or_incomplete_urls() {
        assert!(Proxy::parse("ftp://1.1.1.1:21", "test").is_err());
        assert!(Proxy::parse("socks5://1.1.1.1", "test").is_err());
        assert!(Proxy::parse("not a proxy", "test").is_err());
    }

    #[test]
    fn identity_ignores_metadata() {
        let a = Proxy::parse("http://1.1.1.1:80", "one").unwrap().with_country("fr");
        let b = Proxy::parse("http://1.1.1.1:80", "two").unwrap().with_country("DE");
        let c = Proxy::parse("https://1.1.1.1:80", "one").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.country, "FR");
    }

    #[test]
    fn country_normalisation() {
        assert_eq!(normalize_country(" gb "), "GB");
        assert_eq!(normalize_country(""), UNKNOWN_COUNTRY);
        assert_eq!(normalize_country("UNKNOWN"), UNKNOWN_COUNTRY);
    }

    #[test]
    fn scheme_and_anonymity_parse_case_insensitively() {
        assert_eq!("HTTP".parse::<Scheme>().unwrap(), Scheme::Http);
        assert_eq!("Elite".parse::<Anonymity>().unwrap(), Anonymity::Elite);
        assert!("socks6".parse::<Scheme>().is_err());
    }
}
