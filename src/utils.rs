//! Utility functions for list-based sources.

use crate::error::SourceError;
use crate::proxy::{Endpoint, Scheme};

use log::debug;
use reqwest::Client;
use std::time::Duration;

/// Fetch the raw text of a proxy list from a URL or file path.
pub(crate) async fn read_list(location: &str, timeout: Duration) -> Result<String, SourceError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let client = Client::builder().timeout(timeout).build()?;
        let response = client.get(location).send().await?.error_for_status()?;
        Ok(response.text().await?)
    } else {
        Ok(tokio::fs::read_to_string(location).await?)
    }
}

/// Parse one endpoint per line. Bare `host:port` lines get `default_scheme`;
/// blank lines, `#` comments, bare words and malformed entries are skipped.
pub(crate) fn parse_proxy_list(content: &str, default_scheme: Scheme) -> Vec<Endpoint> {
    content
        .lines()
        .filter_map(|line| {
            // Some lists append metadata after the address.
            let line = line.split_whitespace().next()?;
            if line.starts_with('#') {
                return None;
            }

            let raw = if line.contains("://") {
                line.to_string()
            } else {
                // Bare entries must spell out host:port, or header words
                // would pick up the scheme's default port.
                match line.rsplit_once(':') {
                    Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                        format!("{}://{}", default_scheme, line)
                    }
                    _ => {
                        debug!("Skipping proxy line without host:port '{}'", line);
                        return None;
                    }
                }
            };

            match raw.parse::<Endpoint>() {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    debug!("Skipping malformed proxy line '{}': {}", line, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_list() {
        let content = "\
# free proxies
1.2.3.4:8080
socks5://5.6.7.8:1080 DE

garbage
http://9.9.9.9:3128
";
        let parsed = parse_proxy_list(content, Scheme::Socks4);
        let urls: Vec<_> = parsed.iter().map(|e| e.url()).collect();
        assert_eq!(
            urls,
            vec![
                "socks4://1.2.3.4:8080",
                "socks5://5.6.7.8:1080",
                "http://9.9.9.9:3128",
            ]
        );
    }

    #[test]
    fn bare_words_are_not_proxies() {
        let content = "Free proxy list\nUpdated: 2024-01-01\n1.2.3.4:8080\nlocalhost:\n";
        let urls: Vec<_> = parse_proxy_list(content, Scheme::Http)
            .iter()
            .map(|e| e.url())
            .collect();
        assert_eq!(urls, vec!["http://1.2.3.4:8080"]);
    }

    #[tokio::test]
    async fn reads_local_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "1.1.1.1:80\n").await.unwrap();

        let text = read_list(file.path().to_str().unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(text, "1.1.1.1:80\n");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = read_list("/nonexistent/proxies.txt", Duration::from_secs(1)).await;
        assert!(matches!(err, Err(SourceError::Io(_))));
    }
}
