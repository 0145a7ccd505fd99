//! Confluence REST client: space lookup, page tree listing, and Word export.

use std::path::Path;

use anyhow::{Context, Result};
use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{MigrateConfig, confluence_web_host};
use crate::http::{HttpSession, HttpSettings, Idempotency};
use crate::staging::StagedExport;

const PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceInfo {
    pub key: String,
    pub name: String,
}

/// A source page as seen during traversal. Child ids keep Confluence's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNode {
    pub id: String,
    pub title: String,
    pub child_ids: Vec<String>,
}

pub trait SourceApi {
    fn get_space(&mut self, space_key: &str) -> Result<SpaceInfo>;
    fn get_root_page_ids(&mut self, space_key: &str) -> Result<Vec<String>>;
    fn get_page(&mut self, page_id: &str) -> Result<PageNode>;
    fn export_page(&mut self, page_id: &str, staging_dir: &Path) -> Result<StagedExport>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct ConfluenceClientConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub http: HttpSettings,
}

impl ConfluenceClientConfig {
    pub fn from_config(config: &MigrateConfig) -> Result<Self> {
        Ok(Self {
            base_url: confluence_web_host(&config.require_confluence_base_url()?),
            api_token: config.confluence_api_token(),
            http: HttpSettings::from_env(&config.user_agent()),
        })
    }
}

pub struct ConfluenceClient {
    session: HttpSession,
    base_url: String,
    api_token: Option<String>,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        Ok(Self {
            session: HttpSession::new(config.http, "Confluence")?,
            base_url: config.base_url,
            api_token: config.api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        label: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/rest/api/{}", self.base_url, path);
        let token = self.api_token.clone();
        let response = self.session.send(label, Idempotency::Read, |client| {
            authorize(client.get(&url).query(query), token.as_deref())
        })?;
        response
            .json()
            .with_context(|| format!("failed to decode Confluence response for {label}"))
    }

    /// Follow `start`/`limit` paging for as long as Confluence reports a `next` link.
    fn collect_ids(
        &mut self,
        label: &str,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        loop {
            let mut query = extra.to_vec();
            query.push(("start", ids.len().to_string()));
            query.push(("limit", PAGE_LIMIT.to_string()));
            let page: ContentList = self.get_json(label, path, &query)?;
            let has_next = page.links.and_then(|links| links.next).is_some();
            if page.results.is_empty() {
                break;
            }
            ids.extend(page.results.into_iter().map(|item| item.id));
            if !has_next {
                break;
            }
        }
        Ok(ids)
    }
}

impl SourceApi for ConfluenceClient {
    fn get_space(&mut self, space_key: &str) -> Result<SpaceInfo> {
        let space: SpacePayload =
            self.get_json("Confluence space lookup", &format!("space/{space_key}"), &[])?;
        Ok(SpaceInfo {
            key: space.key,
            name: space.name,
        })
    }

    fn get_root_page_ids(&mut self, space_key: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "Confluence root page listing",
            &format!("space/{space_key}/content/page"),
            &[("depth", "root".to_string())],
        )
    }

    fn get_page(&mut self, page_id: &str) -> Result<PageNode> {
        let content: ContentSummary =
            self.get_json("Confluence page lookup", &format!("content/{page_id}"), &[])?;
        let child_ids = self.collect_ids(
            "Confluence child page listing",
            &format!("content/{page_id}/child/page"),
            &[],
        )?;
        Ok(PageNode {
            id: content.id,
            title: content.title,
            child_ids,
        })
    }

    fn export_page(&mut self, page_id: &str, staging_dir: &Path) -> Result<StagedExport> {
        let url = format!("{}/exportword", self.base_url);
        let token = self.api_token.clone();
        let query = [("pageId", page_id.to_string())];
        let response = self
            .session
            .send("Confluence Word export", Idempotency::Read, |client| {
                authorize(client.get(&url).query(&query), token.as_deref())
            })?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read Word export for page {page_id}"))?;
        debug!(page_id, bytes = bytes.len(), "exported page");
        StagedExport::write(staging_dir, &format!("{page_id}.doc"), &bytes)
    }

    fn request_count(&self) -> usize {
        self.session.request_count()
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

#[derive(Debug, Deserialize)]
struct SpacePayload {
    key: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentSummary {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize, Default)]
struct ContentList {
    #[serde(default)]
    results: Vec<ContentSummary>,
    #[serde(rename = "_links")]
    links: Option<ListLinks>,
}

#[derive(Debug, Deserialize, Default)]
struct ListLinks {
    next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{ContentList, SpacePayload};

    #[test]
    fn content_list_decodes_next_link() {
        let payload = r#"{
            "results": [{"id": "100", "title": "Setup Guide", "type": "page"}],
            "start": 0,
            "limit": 50,
            "size": 1,
            "_links": {"next": "/rest/api/space/TEAM/content/page?start=50"}
        }"#;
        let list: ContentList = serde_json::from_str(payload).expect("decode");
        assert_eq!(list.results.len(), 1);
        assert_eq!(list.results[0].title, "Setup Guide");
        assert!(list.links.and_then(|links| links.next).is_some());
    }

    #[test]
    fn content_list_tolerates_missing_links() {
        let list: ContentList = serde_json::from_str(r#"{"results": []}"#).expect("decode");
        assert!(list.results.is_empty());
        assert!(list.links.is_none());
    }

    #[test]
    fn space_payload_ignores_extra_fields() {
        let space: SpacePayload =
            serde_json::from_str(r#"{"id": 7, "key": "TEAM", "name": "Team Space", "type": "global"}"#)
                .expect("decode");
        assert_eq!(space.key, "TEAM");
        assert_eq!(space.name, "Team Space");
    }
}
