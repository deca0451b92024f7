//! Notion REST client.
//!
//! [`NotionApi`] is the boundary between the document provider and the
//! network; tests substitute an in-memory implementation. [`HttpNotionApi`]
//! talks to the public v1 API with the caller's bearer token on every call.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::blocks::{BlockPage, Page, SearchObject, SearchResponse};
use crate::config::NotionConfig;

pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Maximum page size accepted by the block children endpoint.
const PAGE_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid object id: {0:?}")]
    InvalidId(String),

    #[error("notion api error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The Notion operations the provider depends on.
#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn retrieve_page(&self, token: &str, page_id: &str) -> Result<Page, NotionError>;

    /// One page of the direct children of `block_id`, starting at `cursor`.
    async fn list_block_children(
        &self,
        token: &str,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, NotionError>;

    /// Searches pages shared with the integration behind `token`.
    async fn search(&self, token: &str, query: &str) -> Result<Vec<SearchObject>, NotionError>;
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// [`NotionApi`] over HTTPS.
pub struct HttpNotionApi {
    client: Client,
    base: Url,
    version: String,
}

impl HttpNotionApi {
    pub fn new(config: &NotionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = Url::parse(&config.api_base)
            .with_context(|| format!("invalid Notion api_base: {}", config.api_base))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("invalid Notion api_base: {}", config.api_base);
        }
        Ok(Self {
            client,
            base,
            version: config.notion_version.clone(),
        })
    }

    /// Appends `segments` to the API base. Each segment is percent-encoded
    /// as a whole, so an id can never address a different endpoint.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<T, NotionError> {
        let resp = request
            .bearer_auth(token)
            .header("Notion-Version", &self.version)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "notion response");

        if status.is_success() {
            return serde_json::from_str(&body).map_err(NotionError::Decode);
        }

        let err: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => NotionError::NotFound(err.message),
            _ if err.code == "object_not_found" => NotionError::NotFound(err.message),
            StatusCode::UNAUTHORIZED => NotionError::Unauthorized(err.message),
            _ => NotionError::Api {
                status: status.as_u16(),
                code: err.code,
                message: err.message,
            },
        })
    }
}

/// Rejects ids that cannot stand as a single path segment.
fn object_id(id: &str) -> Result<&str, NotionError> {
    match id {
        "" | "." | ".." => Err(NotionError::InvalidId(id.to_string())),
        _ => Ok(id),
    }
}

#[async_trait]
impl NotionApi for HttpNotionApi {
    async fn retrieve_page(&self, token: &str, page_id: &str) -> Result<Page, NotionError> {
        tracing::debug!(page_id, "retrieve page");
        let request = self.client.get(self.url(&["pages", object_id(page_id)?]));
        self.send(request, token).await
    }

    async fn list_block_children(
        &self,
        token: &str,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, NotionError> {
        tracing::debug!(block_id, cursor = ?cursor, "list block children");
        let mut request = self
            .client
            .get(self.url(&["blocks", object_id(block_id)?, "children"]))
            .query(&[("page_size", PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("start_cursor", cursor)]);
        }
        self.send(request, token).await
    }

    async fn search(&self, token: &str, query: &str) -> Result<Vec<SearchObject>, NotionError> {
        tracing::debug!(query, "search");
        let body = json!({
            "query": query,
            "filter": { "value": "page", "property": "object" },
        });
        let request = self.client.post(self.url(&["search"])).json(&body);
        let resp: SearchResponse = self.send(request, token).await?;
        Ok(resp.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpNotionApi {
        HttpNotionApi::new(&NotionConfig {
            api_base: server.uri(),
            ..NotionConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_page_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/p1"))
            .and(header("authorization", "Bearer secret_abc"))
            .and(header("notion-version", DEFAULT_NOTION_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "page",
                "id": "p1",
                "url": "https://www.notion.so/p1",
                "last_edited_time": "2025-01-02T03:04:00.000Z",
                "properties": {
                    "title": { "type": "title", "title": [{ "plain_text": "Roadmap" }] }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = api(&server).retrieve_page("secret_abc", "p1").await.unwrap();
        assert_eq!(page.title(), "Roadmap");
        assert_eq!(page.url, "https://www.notion.so/p1");
        assert_eq!(
            page.last_edited_time.as_deref(),
            Some("2025-01-02T03:04:00.000Z")
        );
    }

    #[tokio::test]
    async fn test_list_block_children_passes_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/p1/children"))
            .and(query_param("page_size", "100"))
            .and(query_param("start_cursor", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [
                    { "id": "b1", "type": "paragraph", "paragraph": { "rich_text": [{ "plain_text": "hi" }] } }
                ],
                "next_cursor": null,
                "has_more": false
            })))
            .mount(&server)
            .await;

        let page = api(&server)
            .list_block_children("t", "p1", Some("c2"))
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_search_filters_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "query": "plan",
                "filter": { "value": "page", "property": "object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [
                    { "object": "page", "id": "p1", "url": "u1", "properties": {} },
                    { "object": "database", "id": "d1" }
                ]
            })))
            .mount(&server)
            .await;

        let results = api(&server).search("t", "plan").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], SearchObject::Page(p) if p.id == "p1"));
    }

    #[tokio::test]
    async fn test_ids_stay_in_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/pages/[^/]+$"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "object": "error", "status": 404, "code": "object_not_found", "message": "no such page"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server);
        assert!(matches!(
            api.retrieve_page("t", "../users").await,
            Err(NotionError::NotFound(_))
        ));
        assert!(matches!(
            api.list_block_children("t", "..", None).await,
            Err(NotionError::InvalidId(_))
        ));
    }

    #[test]
    fn test_url_keeps_base_path() {
        let api = HttpNotionApi::new(&NotionConfig {
            api_base: "https://api.notion.com/v1/".to_string(),
            ..NotionConfig::default()
        })
        .unwrap();
        assert_eq!(
            api.url(&["blocks", "a/b", "children"]).as_str(),
            "https://api.notion.com/v1/blocks/a%2Fb/children"
        );
        assert!(HttpNotionApi::new(&NotionConfig {
            api_base: "not a url".to_string(),
            ..NotionConfig::default()
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/pages/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "object": "error", "status": 404, "code": "object_not_found",
                "message": "Could not find page with ID: gone."
            })))
            .mount(&server)
            .await;
        Mock::given(path("/pages/locked"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "object": "error", "status": 401, "code": "unauthorized",
                "message": "API token is invalid."
            })))
            .mount(&server)
            .await;
        Mock::given(path("/pages/busy"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "object": "error", "status": 429, "code": "rate_limited", "message": "slow down"
            })))
            .mount(&server)
            .await;

        let api = api(&server);
        assert!(matches!(
            api.retrieve_page("t", "gone").await,
            Err(NotionError::NotFound(_))
        ));
        assert!(matches!(
            api.retrieve_page("t", "locked").await,
            Err(NotionError::Unauthorized(_))
        ));
        match api.retrieve_page("t", "busy").await {
            Err(NotionError::Api { status, code, .. }) => {
                assert_eq!(status, 429);
                assert_eq!(code, "rate_limited");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
