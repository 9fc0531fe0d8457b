//! HTTP/JSON orchestrator client

use super::{Orchestrator, OrchestratorError, OrchestratorResult, SeencheckQuery};
use crate::config::OrchestratorConfig;
use crate::item::{Item, ItemKind};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A URL as exchanged with the orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HqUrl {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    via: String,
    #[serde(default)]
    hop: u64,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    kind: String,
}

impl From<&Item> for HqUrl {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            value: item.url.clone(),
            via: item.parent_url.clone().unwrap_or_default(),
            hop: item.hop,
            kind: item.kind.to_db_string().to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UrlBatch {
    #[serde(default)]
    urls: Vec<HqUrl>,
}

/// Orchestrator client speaking JSON over HTTP
///
/// Endpoints live under `<url>/api/projects/<project>/`: `feed`, `finished`,
/// `discovered`, `reset` and `seencheck`. Credentials are sent in the
/// `X-Auth-Key` and `X-Auth-Secret` headers.
pub struct HqClient {
    client: Client,
    base_url: String,
    project: String,
    key: String,
    secret: String,
}

impl HqClient {
    /// Creates a new client from the `[orchestrator]` configuration table
    pub fn new(config: &OrchestratorConfig, user_agent: &str) -> OrchestratorResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            key: config.key.clone(),
            secret: config.secret.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api/projects/{}/{}", self.base_url, self.project, path);
        self.client
            .request(method, url)
            .header("X-Auth-Key", &self.key)
            .header("X-Auth-Secret", &self.secret)
    }

    async fn check_status(response: Response) -> OrchestratorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(OrchestratorError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn post_urls(&self, path: &str, urls: Vec<HqUrl>) -> OrchestratorResult<Response> {
        let response = self
            .request(Method::POST, path)
            .json(&UrlBatch { urls })
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn post_items(&self, path: &str, items: &[Item]) -> OrchestratorResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.post_urls(path, items.iter().map(HqUrl::from).collect())
            .await?;
        debug!(endpoint = path, count = items.len(), "Reported items to orchestrator");
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for HqClient {
    async fn pull(&self, batch: usize) -> OrchestratorResult<Vec<Item>> {
        let response = self
            .request(Method::GET, "feed")
            .query(&[("size", batch)])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let feed: UrlBatch = response
            .json()
            .await
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))?;

        let mut items = Vec::with_capacity(feed.urls.len());
        for url in feed.urls {
            match Item::seed(&url.value) {
                Ok(mut item) => {
                    if !url.id.is_empty() {
                        item.id = url.id;
                    }
                    item.hop = url.hop;
                    item.kind = ItemKind::from_db_string(&url.kind).unwrap_or_default();
                    item.parent_url = (!url.via.is_empty()).then_some(url.via);
                    // The orchestrator already deduplicated these
                    item.bypass_seencheck = true;
                    items.push(item);
                }
                Err(e) => warn!(url = %url.value, error = %e, "Skipping invalid URL from orchestrator"),
            }
        }

        debug!(count = items.len(), "Pulled items from orchestrator");
        Ok(items)
    }

    async fn send_back(&self, items: &[Item]) -> OrchestratorResult<()> {
        self.post_items("reset", items).await
    }

    async fn mark_finished(&self, items: &[Item]) -> OrchestratorResult<()> {
        self.post_items("finished", items).await
    }

    async fn discovered(&self, items: &[Item]) -> OrchestratorResult<()> {
        self.post_items("discovered", items).await
    }

    async fn seencheck(&self, urls: &[SeencheckQuery]) -> OrchestratorResult<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let payload = urls
            .iter()
            .map(|q| HqUrl {
                value: q.url.clone(),
                kind: q.kind.to_db_string().to_string(),
                ..Default::default()
            })
            .collect();

        let response = self.post_urls("seencheck", payload).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let unseen: UrlBatch = response
            .json()
            .await
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))?;
        Ok(unseen.urls.into_iter().map(|u| u.value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(url: &str) -> OrchestratorConfig {
        OrchestratorConfig {
            url: url.to_string(),
            project: "weekly".to_string(),
            key: "k".to_string(),
            secret: "s".to_string(),
            batch_size: 10,
            send_back_on_429: false,
        }
    }

    #[tokio::test]
    async fn test_pull_maps_urls_to_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/projects/weekly/feed"))
            .and(query_param("size", "10"))
            .and(header("X-Auth-Key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "urls": [
                    {"id": "u1", "value": "http://a.example/", "hop": 2, "via": "http://b.example/"},
                    {"id": "u2", "value": "ftp://nope.example/"},
                    {"value": "http://a.example/s.css", "type": "asset"}
                ]
            })))
            .mount(&server)
            .await;

        let client = HqClient::new(&create_test_config(&server.uri()), "test").unwrap();
        let items = client.pull(10).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "u1");
        assert_eq!(items[0].hop, 2);
        assert_eq!(items[0].parent_url.as_deref(), Some("http://b.example/"));
        assert!(items[0].bypass_seencheck);
        assert_eq!(items[1].kind, ItemKind::Asset);
    }

    #[tokio::test]
    async fn test_seencheck_returns_unseen() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/weekly/seencheck"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "urls": [{"value": "http://a.example/new"}]
            })))
            .mount(&server)
            .await;

        let client = HqClient::new(&create_test_config(&server.uri()), "test").unwrap();
        let queries = vec![
            SeencheckQuery {
                url: "http://a.example/new".to_string(),
                kind: ItemKind::Seed,
            },
            SeencheckQuery {
                url: "http://a.example/old".to_string(),
                kind: ItemKind::Seed,
            },
        ];
        let unseen = client.seencheck(&queries).await.unwrap();
        assert_eq!(unseen, vec!["http://a.example/new".to_string()]);
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/weekly/finished"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = HqClient::new(&create_test_config(&server.uri()), "test").unwrap();
        let item = Item::seed("http://a.example/").unwrap();
        let err = client.mark_finished(&[item]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_batches_skip_requests() {
        // No mock mounted: any request would fail with 404
        let server = MockServer::start().await;
        let client = HqClient::new(&create_test_config(&server.uri()), "test").unwrap();
        assert!(client.discovered(&[]).await.is_ok());
        assert!(client.seencheck(&[]).await.unwrap().is_empty());
    }
}
