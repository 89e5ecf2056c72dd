//! Simple example of using proxy-pool.

use proxy_pool::filter::ProxyTypes;
use proxy_pool::{ListSource, ProxyPool, ProxyPoolConfig, Scheme, SourceRegistry, StaticSource};
use std::time::Duration;

const OFFLINE_PROXIES: &str = "\
http://154.72.199.38:32954 UG
http://186.103.175.158:3128 CL
socks5://178.62.193.19:1080 NL
socks5://94.130.73.24:37188 DE
socks5://54.38.195.161:47404 FR
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let registry = SourceRegistry::new()
        // free socks5 proxy urls, format like `Free-Proxy`
        .with_source(
            ListSource::new(
                "Free-Proxy",
                "https://cdn.jsdelivr.net/gh/dpangestuw/Free-Proxy@main/socks5_proxies.txt",
            )
            .with_scheme(Scheme::Socks5),
        )
        .with_source(
            ListSource::new(
                "proxifly",
                "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/protocols/socks5/data.txt",
            )
            .with_scheme(Scheme::Socks5),
        )
        .with_source(StaticSource::from_lines("Static", OFFLINE_PROXIES));

    let config = ProxyPoolConfig::builder()
        .sources(vec!["Free-Proxy", "proxifly"])
        // used when the lists above are unreachable
        .backup_sources(vec!["Static"])
        .fetch_timeout(Duration::from_secs(10))
        .reload_when_empty(true)
        .fallback_to_cached(true)
        .filter(ProxyTypes::parse(&["socks5"])?)
        .build();

    let pool = ProxyPool::new(config, &registry)?;

    println!("Loading proxy pool...");
    pool.load().await?;
    println!(
        "Loaded {} proxies ({:?})",
        pool.size_all().await,
        pool.status().await
    );

    for _ in 0..3 {
        println!("New: {}", pool.new_proxy().await?);
    }
    match pool.new_from_country(&["DE", "NL"]).await {
        Ok(proxy) => println!("From DE/NL: {}", proxy),
        Err(e) => println!("No DE/NL proxy: {}", e),
    }
    println!("Unused: {}/{}", pool.size_unused().await, pool.size_all().await);

    Ok(())
}
