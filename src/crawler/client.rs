//! HTTP clients
//!
//! Requests go through the proxied client when a proxy is configured,
//! except for hosts on the bypass list, which use the direct client.

use crate::config::Config;
use crate::url::matches_any;
use reqwest::{redirect::Policy, Client, ClientBuilder, Proxy};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Direct and proxied clients sharing the same settings
#[derive(Debug, Clone)]
pub struct HttpClients {
    direct: Client,
    proxied: Option<Client>,
    bypass: Vec<String>,
}

impl HttpClients {
    /// Builds the clients from the crawler and proxy configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HttpClients)` - Successfully built clients
    /// * `Err(reqwest::Error)` - A client or the proxy URL was invalid
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let direct = builder(config).no_proxy().build()?;
        let proxied = match &config.proxy.url {
            Some(url) => Some(builder(config).proxy(Proxy::all(url.as_str())?).build()?),
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            bypass: config.proxy.bypass.clone(),
        })
    }

    /// Client to use for requests to `host`
    pub fn for_host(&self, host: &str) -> &Client {
        match &self.proxied {
            Some(proxied) if !matches_any(&self.bypass, host) => proxied,
            _ => &self.direct,
        }
    }

    pub fn is_proxied(&self, host: &str) -> bool {
        self.proxied.is_some() && !matches_any(&self.bypass, host)
    }
}

fn builder(config: &Config) -> ClientBuilder {
    let crawler = &config.crawler;
    Client::builder()
        .user_agent(crawler.user_agent.as_str())
        .timeout(crawler.http_timeout())
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(Policy::none()) // Redirects are chased by the fetcher
        .gzip(true)
        .brotli(true)
        .danger_accept_invalid_certs(!crawler.verify_tls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_only() {
        let clients = HttpClients::from_config(&Config::default()).unwrap();
        assert!(!clients.is_proxied("a.example"));
    }

    #[test]
    fn test_proxy_bypass() {
        let mut config = Config::default();
        config.proxy.url = Some("http://127.0.0.1:3128".to_string());
        config.proxy.bypass = vec!["*.internal.example".to_string()];

        let clients = HttpClients::from_config(&config).unwrap();
        assert!(clients.is_proxied("a.example"));
        assert!(!clients.is_proxied("api.internal.example"));
    }

    #[test]
    fn test_invalid_proxy() {
        let mut config = Config::default();
        config.proxy.url = Some("::not a url::".to_string());
        assert!(HttpClients::from_config(&config).is_err());
    }
}
