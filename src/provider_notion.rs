//! Notion document provider.
//!
//! Searches pages by title and fetches a page as a [`Document`] whose text
//! is the flattened block tree (see [`crate::extract`]). The caller's bearer
//! token is forwarded to Notion on every request; the provider itself holds
//! no credentials.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

use crate::backends::{Backend, BackendFactory};
use crate::blocks::{Page, SearchObject};
use crate::config::Config;
use crate::context::RequestContext;
use crate::extract;
use crate::gateway::provider_tools;
use crate::models::Document;
use crate::notion_api::{HttpNotionApi, NotionApi, NotionError};
use crate::provider::{Provider, ProviderError};

pub const BACKEND_NAME: &str = "notion";

const SEARCH_SYNTAX: &str = "Search Notion pages shared with the connected integration. \
The query is matched against page titles; use a few distinctive words from the title \
rather than a full sentence. Results contain the page id, title and URL. Pass a \
result's id to the fetch tool to read the full page content.";

pub struct NotionProvider {
    api: Arc<dyn NotionApi>,
}

impl NotionProvider {
    pub fn new(api: Arc<dyn NotionApi>) -> Self {
        Self { api }
    }
}

fn token(ctx: &RequestContext) -> Result<&str, ProviderError> {
    ctx.token()
        .ok_or(ProviderError::MissingCredential("bearer token"))
}

fn backend_error(err: NotionError, what: &'static str) -> ProviderError {
    match err {
        NotionError::NotFound(msg) => ProviderError::NotFound(msg),
        NotionError::InvalidId(id) => ProviderError::InvalidArgument(format!("invalid id: {:?}", id)),
        other => ProviderError::Backend(anyhow::Error::new(other).context(what)),
    }
}

fn page_to_document(page: &Page) -> Document {
    let title = page.title();
    Document::new(page.id.clone(), title.clone(), title).with_url(page.url.clone())
}

#[async_trait]
impl Provider for NotionProvider {
    fn search_syntax(&self) -> &str {
        SEARCH_SYNTAX
    }

    async fn search(&self, ctx: &RequestContext, query: &str) -> Result<Vec<Document>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::InvalidArgument(
                "query cannot be empty".to_string(),
            ));
        }
        let token = token(ctx)?;

        let results = self
            .api
            .search(token, query)
            .await
            .map_err(|e| backend_error(e, "search api"))?;

        let mut documents = Vec::with_capacity(results.len());
        for result in &results {
            match result {
                SearchObject::Page(page) => documents.push(page_to_document(page)),
                other => {
                    tracing::info!(kind = other.kind(), "ignoring unsupported object type");
                }
            }
        }
        Ok(documents)
    }

    async fn fetch(&self, ctx: &RequestContext, id: &str) -> Result<Document, ProviderError> {
        if id.trim().is_empty() {
            return Err(ProviderError::InvalidArgument("id cannot be empty".to_string()));
        }
        let token = token(ctx)?;

        let page = self
            .api
            .retrieve_page(token, id)
            .await
            .map_err(|e| backend_error(e, "get page"))?;
        let text = extract::page_text(self.api.as_ref(), token, id)
            .await
            .map_err(|e| backend_error(e, "fetch page content"))?;

        let mut document = Document::new(id, page.title(), text).with_url(page.url.clone());
        if let Some(edited) = &page.last_edited_time {
            document = document.with_metadata("last_edited_time", edited);
        }
        tracing::debug!(id, bytes = document.text.len(), "fetched notion page");
        Ok(document)
    }
}

/// Enables the `notion` backend when `[backends.notion]` is configured.
pub struct NotionFactory;

#[async_trait]
impl BackendFactory for NotionFactory {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn build(&self, config: &Config) -> anyhow::Result<Option<Backend>> {
        let Some(notion) = &config.backends.notion else {
            return Ok(None);
        };
        let api = HttpNotionApi::new(notion).context("Failed to build Notion HTTP client")?;
        let provider = NotionProvider::new(Arc::new(api));
        Ok(Some(Backend::new(
            BACKEND_NAME,
            "Notion",
            provider_tools(Arc::new(provider)),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Block, BlockKind, Property, RichText, TextBody};
    use crate::notion_api::fake::FakeNotion;
    use std::collections::BTreeMap;

    fn page(id: &str, title: &str) -> Page {
        let mut properties = BTreeMap::new();
        properties.insert(
            "Name".to_string(),
            Property::Title {
                title: title.split(' ').map(RichText::plain).collect(),
            },
        );
        Page {
            id: id.to_string(),
            url: format!("https://www.notion.so/{}", id),
            last_edited_time: None,
            properties,
        }
    }

    fn authed() -> RequestContext {
        RequestContext::default().with_token("secret_abc")
    }

    #[tokio::test]
    async fn test_search_maps_pages_and_skips_others() {
        let api = Arc::new(FakeNotion::new().with_search_results(vec![
            SearchObject::Page(page("p1", "Team Roadmap")),
            SearchObject::Database {
                id: "db".to_string(),
            },
            SearchObject::Page(page("p2", "Hiring")),
        ]));
        let provider = NotionProvider::new(api.clone());

        let docs = provider.search(&authed(), "roadmap").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "p1");
        assert_eq!(docs[0].title, "Team Roadmap");
        assert_eq!(docs[0].text, "Team Roadmap");
        assert_eq!(docs[0].url.as_deref(), Some("https://www.notion.so/p1"));
        assert_eq!(docs[1].id, "p2");
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query_before_backend() {
        let api = Arc::new(FakeNotion::new());
        let provider = NotionProvider::new(api.clone());

        for query in ["", "   "] {
            let err = provider.search(&authed(), query).await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidArgument(_)));
        }
        let err = provider
            .search(&RequestContext::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let api = Arc::new(FakeNotion::new());
        let provider = NotionProvider::new(api.clone());
        let ctx = RequestContext::default();

        assert!(matches!(
            provider.search(&ctx, "x").await,
            Err(ProviderError::MissingCredential(_))
        ));
        assert!(matches!(
            provider.fetch(&ctx, "p1").await,
            Err(ProviderError::MissingCredential(_))
        ));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_builds_document() {
        let mut meta = page("p1", "Design Notes");
        meta.last_edited_time = Some("2025-03-01T10:00:00.000Z".to_string());
        let api = Arc::new(
            FakeNotion::new().with_page(meta).with_children(
                "p1",
                vec![
                    Block::new(
                        "h",
                        BlockKind::Heading1 {
                            heading_1: TextBody::plain("Goals"),
                        },
                    ),
                    Block::new(
                        "p",
                        BlockKind::Paragraph {
                            paragraph: TextBody::plain("Ship it."),
                        },
                    ),
                ],
            ),
        );
        let provider = NotionProvider::new(api);

        let doc = provider.fetch(&authed(), "p1").await.unwrap();
        assert_eq!(doc.id, "p1");
        assert_eq!(doc.title, "Design Notes");
        assert_eq!(doc.text, "# Goals\nShip it.");
        assert_eq!(doc.url.as_deref(), Some("https://www.notion.so/p1"));
        assert_eq!(
            doc.metadata.unwrap()["last_edited_time"],
            "2025-03-01T10:00:00.000Z"
        );
    }

    #[tokio::test]
    async fn test_fetch_is_repeatable() {
        let api = Arc::new(FakeNotion::new().with_page(page("p1", "Same")).with_children(
            "p1",
            vec![Block::new(
                "p",
                BlockKind::Paragraph {
                    paragraph: TextBody::plain("body"),
                },
            )],
        ));
        let provider = NotionProvider::new(api);
        let first = provider.fetch(&authed(), "p1").await.unwrap();
        let second = provider.fetch(&authed(), "p1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let api = Arc::new(
            FakeNotion::new()
                .with_page(page("broken", "Broken"))
                .failing("broken"),
        );
        let provider = NotionProvider::new(api);

        assert!(matches!(
            provider.fetch(&authed(), "nope").await,
            Err(ProviderError::NotFound(_))
        ));
        let err = provider.fetch(&authed(), "broken").await.unwrap_err();
        assert!(matches!(err, ProviderError::Backend(_)));
        assert!(format!("{:#}", anyhow::Error::from(err)).starts_with("get page"));
    }
}
