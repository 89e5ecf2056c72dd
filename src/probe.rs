//! Live connectivity checks against a proxy.

use crate::proxy::Proxy;

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

/// Default URL requested through a proxy to decide whether it works.
pub const DEFAULT_CHECK_URL: &str = "https://example.org";

/// Decides whether a proxy can complete a request within `timeout`.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, proxy: &Proxy, timeout: Duration) -> bool;
}

/// Probe that sends a GET through the proxy and expects a success status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    check_url: String,
}

impl HttpProbe {
    pub fn new(check_url: impl Into<String>) -> Self {
        Self {
            check_url: check_url.into(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_URL)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, proxy: &Proxy, timeout: Duration) -> bool {
        let reqwest_proxy = match proxy.to_reqwest_proxy() {
            Ok(p) => p,
            Err(e) => {
                debug!("Cannot use {} as a reqwest proxy: {}", proxy.endpoint, e);
                return false;
            }
        };

        let client = match reqwest::Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                debug!("Failed to build client for {}: {}", proxy.endpoint, e);
                return false;
            }
        };

        match client.get(&self.check_url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!("Probe through {} got status {}", proxy.endpoint, resp.status());
                false
            }
            Err(e) => {
                debug!("Probe through {} failed: {}", proxy.endpoint, e);
                false
            }
        }
    }
}
