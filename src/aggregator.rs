//! Concurrent fetch across several sources.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::source::Source;

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;

/// Fans one fetch out to a group of sources and gathers the results.
#[derive(Clone)]
pub struct Aggregator {
    sources: Vec<Arc<dyn Source>>,
    timeout: Duration,
    concurrency: usize,
}

impl Aggregator {
    /// Run every source at once, bounded by `timeout`.
    pub fn new(sources: Vec<Arc<dyn Source>>, timeout: Duration) -> Self {
        let concurrency = sources.len().max(1);
        Self {
            sources,
            timeout,
            concurrency,
        }
    }

    /// Run at most `limit` sources at the same time.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch from every source into one container.
    ///
    /// Returns once all sources finish or the timeout fires. Sources still
    /// running at the deadline are aborted and the proxies collected so far
    /// are returned. Individual source failures are logged and ignored; the
    /// only error is an empty result.
    pub async fn fetch(&self) -> Result<Container> {
        info!(
            "Fetching proxies from {} sources (timeout {:?})",
            self.sources.len(),
            self.timeout
        );

        let collector = Arc::new(Container::new());
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for source in &self.sources {
            let source = Arc::clone(source);
            let collector = Arc::clone(&collector);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                match source.fetch(Arc::clone(&collector), timeout).await {
                    Ok(proxies) => {
                        let found = proxies.len();
                        let new = collector.extend(proxies);
                        debug!("Fetched {} proxies from {} ({} new)", found, source.name(), new);
                    }
                    Err(e) => {
                        warn!("Failed to fetch proxies from {}: {}", source.name(), e);
                    }
                }
            });
        }

        let joined = time::timeout(self.timeout, async {
            while let Some(outcome) = tasks.join_next().await {
                if let Err(e) = outcome {
                    warn!("Source task ended abnormally: {}", e);
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "Fetch timed out after {:?}, abandoning {} unfinished sources",
                self.timeout,
                tasks.len()
            );
            tasks.abort_all();
        }

        // Detach from the shared collector so aborted tasks can't write into the result.
        let collected = Container::clone(&collector);
        drop(tasks);

        if collected.is_empty() {
            warn!("No proxies could be loaded from {} sources", self.sources.len());
            return Err(Error::Aggregation {
                attempted: self.sources.len(),
            });
        }

        info!("Fetched {} unique proxies", collected.len());
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::proxy::Proxy;
    use crate::source::StaticSource;
    use async_trait::async_trait;

    /// Writes one proxy immediately, then another after `delay`.
    struct Slow {
        name: String,
        delay: Duration,
        subnet: u8,
    }

    impl Slow {
        fn proxy(&self, host: u8) -> Proxy {
            let url = format!("http://10.0.{}.{}:80", self.subnet, host);
            Proxy::parse(&url, self.name.as_str()).unwrap()
        }
    }

    #[async_trait]
    impl Source for Slow {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(
            &self,
            collector: Arc<Container>,
            _timeout: Duration,
        ) -> std::result::Result<Vec<Proxy>, SourceError> {
            collector.add(self.proxy(1));
            time::sleep(self.delay).await;
            collector.add(self.proxy(2));
            Ok(vec![])
        }
    }

    struct Failing;

    #[async_trait]
    impl Source for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        async fn fetch(
            &self,
            _collector: Arc<Container>,
            _timeout: Duration,
        ) -> std::result::Result<Vec<Proxy>, SourceError> {
            Err(SourceError::Empty("Failing".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Source for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        async fn fetch(
            &self,
            _collector: Arc<Container>,
            _timeout: Duration,
        ) -> std::result::Result<Vec<Proxy>, SourceError> {
            panic!("scraper bug")
        }
    }

    fn fixed(name: &str, urls: &[&str]) -> Arc<dyn Source> {
        let proxies = urls.iter().map(|u| Proxy::parse(u, name).unwrap()).collect();
        Arc::new(StaticSource::new(name, proxies))
    }

    #[tokio::test]
    async fn merges_and_dedups_sources() {
        let aggregator = Aggregator::new(
            vec![
                fixed("A", &["http://1.1.1.1:80", "http://2.2.2.2:80"]),
                fixed("B", &["http://2.2.2.2:80", "socks5://3.3.3.3:1080"]),
            ],
            Duration::from_secs(5),
        );

        let collected = aggregator.fetch().await.unwrap();
        assert_eq!(collected.len(), 3);
    }

    #[tokio::test]
    async fn failing_sources_are_absorbed() {
        let aggregator = Aggregator::new(
            vec![
                Arc::new(Failing) as Arc<dyn Source>,
                Arc::new(Panicking),
                fixed("A", &["http://1.1.1.1:80"]),
            ],
            Duration::from_secs(5),
        );

        let collected = aggregator.fetch().await.unwrap();
        assert_eq!(collected.len(), 1);
    }

    #[tokio::test]
    async fn empty_result_is_an_error() {
        let failing: Arc<dyn Source> = Arc::new(Failing);
        let aggregator = Aggregator::new(vec![failing], Duration::from_secs(5));
        assert!(matches!(
            aggregator.fetch().await,
            Err(Error::Aggregation { attempted: 1 })
        ));

        let nothing = Aggregator::new(vec![], Duration::from_secs(5));
        assert!(matches!(
            nothing.fetch().await,
            Err(Error::Aggregation { attempted: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_partial_results() {
        let slow: Arc<dyn Source> = Arc::new(Slow {
            name: "Slow".into(),
            delay: Duration::from_secs(60),
            subnet: 0,
        });
        let aggregator = Aggregator::new(vec![slow], Duration::from_secs(1));

        let collected = aggregator.fetch().await.unwrap();
        assert_eq!(collected.len(), 1);
        assert!(collected.contains(&Proxy::parse("http://10.0.0.1:80", "Slow").unwrap()));

        // Nothing written after the deadline can reach the returned container.
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(collected.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_serialises_sources() {
        let sources: Vec<Arc<dyn Source>> = (0..2)
            .map(|i| {
                Arc::new(Slow {
                    name: format!("Slow{}", i),
                    delay: Duration::from_secs(2),
                    subnet: i,
                }) as Arc<dyn Source>
            })
            .collect();

        // Run together, both finish inside the budget.
        let parallel = Aggregator::new(sources.clone(), Duration::from_secs(3));
        assert_eq!(parallel.fetch().await.unwrap().len(), 4);

        // One at a time, the second source only gets its first write in.
        let aggregator = Aggregator::new(sources, Duration::from_secs(3)).with_concurrency(1);
        let collected = aggregator.fetch().await.unwrap();
        assert_eq!(collected.len(), 3);

        assert_eq!(aggregator.timeout(), Duration::from_secs(3));
        assert_eq!(aggregator.sources().len(), 2);
    }
}
