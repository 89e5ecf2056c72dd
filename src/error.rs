//! Error types for the proxy-pool crate.

use thiserror::Error;

/// Errors surfaced by the pool, its aggregator and its configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A configured source name is not in the registry.
    #[error("unknown proxy source '{0}'")]
    UnknownSource(String),

    /// A filter was built from invalid arguments.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A proxy URL or one of its attributes could not be parsed.
    #[error("invalid proxy: {0}")]
    InvalidProxy(String),

    /// A fetch attempt collected zero proxies across all of its sources.
    #[error("no proxies could be collected from {attempted} source(s)")]
    Aggregation { attempted: usize },

    /// The requested population (whole pool or a set of countries) is empty.
    #[error("No proxy available in pool")]
    NoProxyAvailable,

    /// The cache was requested before any successful load.
    #[error("no cached proxies to revert to")]
    NoCache,

    /// The pool ran dry and reloading it failed.
    #[error("pool is empty and reloading it failed")]
    Reload {
        #[source]
        source: Box<Error>,
    },

    /// The primary fetch failed and so did every fallback that was attempted.
    #[error("primary fetch failed and every fallback was exhausted")]
    FallbackExhausted {
        #[source]
        source: Box<Error>,
    },
}

/// Failure inside a single source. The aggregator logs these and moves on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("source '{0}' yielded no proxies")]
    Empty(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
