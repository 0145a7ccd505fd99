//! Outline API client. Every method is a `POST <base>/<method>` with a JSON
//! body, except `documents.import`, which takes a multipart upload.

use anyhow::{Context, Result, bail};
use reqwest::blocking::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::MigrateConfig;
use crate::http::{HttpSession, HttpSettings, Idempotency};
use crate::staging::StagedExport;

const LIST_LIMIT: usize = 100;
const WORD_MIME: &str = "application/msword";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug)]
pub struct ImportRequest<'a> {
    pub staged: &'a StagedExport,
    pub collection_id: &'a str,
    pub parent_document_id: Option<&'a str>,
    pub title: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub id: String,
    pub url_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub id: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub parent_document_id: Option<String>,
}

/// Body of a `documents.update` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentUpdate {
    pub id: String,
    pub title: String,
    pub text: String,
    pub publish: bool,
    pub done: bool,
    pub append: bool,
}

impl DocumentUpdate {
    /// Replace the whole body, publish, and mark the edit session done.
    pub fn full_replace(id: &str, title: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            publish: true,
            done: true,
            append: false,
        }
    }
}

pub trait DestinationApi {
    fn collection_info(&mut self, collection_id: &str) -> Result<CollectionInfo>;
    fn import_document(&mut self, request: &ImportRequest<'_>) -> Result<ImportResult>;
    fn document_info(&mut self, document_id: &str) -> Result<DocumentContent>;
    fn update_document(&mut self, update: &DocumentUpdate) -> Result<()>;
    fn list_documents(&mut self, collection_id: &str) -> Result<Vec<DocumentSummary>>;
    fn delete_document(&mut self, document_id: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct OutlineClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub http: HttpSettings,
}

impl OutlineClientConfig {
    pub fn from_config(config: &MigrateConfig) -> Result<Self> {
        Ok(Self {
            base_url: config
                .require_outline_base_url()?
                .trim()
                .trim_end_matches('/')
                .to_string(),
            api_token: config.require_outline_api_token()?,
            http: HttpSettings::from_env(&config.user_agent()),
        })
    }
}

pub struct OutlineClient {
    session: HttpSession,
    base_url: String,
    api_token: String,
}

impl OutlineClient {
    pub fn new(config: OutlineClientConfig) -> Result<Self> {
        Ok(Self {
            session: HttpSession::new(config.http, "Outline")?,
            base_url: config.base_url,
            api_token: config.api_token,
        })
    }

    fn post_json<T: DeserializeOwned>(
        &mut self,
        method: &str,
        body: &Value,
        idempotency: Idempotency,
    ) -> Result<T> {
        let payload = self.post(method, body, idempotency)?;
        decode_envelope(method, payload)
    }

    /// For methods whose reply carries no `data` (e.g. `documents.delete`).
    fn post_ack(&mut self, method: &str, body: &Value) -> Result<()> {
        let payload = self.post(method, body, Idempotency::Write)?;
        check_envelope(method, payload).map(|_| ())
    }

    fn post(&mut self, method: &str, body: &Value, idempotency: Idempotency) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let token = self.api_token.clone();
        let response = self
            .session
            .send(&format!("Outline {method}"), idempotency, |client| {
                client.post(&url).bearer_auth(&token).json(body)
            })?;
        response
            .json()
            .with_context(|| format!("failed to decode Outline {method} response"))
    }
}

impl DestinationApi for OutlineClient {
    fn collection_info(&mut self, collection_id: &str) -> Result<CollectionInfo> {
        let data: CollectionPayload = self.post_json(
            "collections.info",
            &json!({ "id": collection_id }),
            Idempotency::Read,
        )?;
        Ok(CollectionInfo {
            id: data.id,
            name: data.name,
        })
    }

    fn import_document(&mut self, request: &ImportRequest<'_>) -> Result<ImportResult> {
        let bytes = request.staged.read_bytes()?;
        let url = format!("{}/documents.import", self.base_url);
        let token = self.api_token.clone();
        let file_name = format!("{}.doc", request.title);
        let collection_id = request.collection_id.to_string();
        let parent = request.parent_document_id.map(ToString::to_string);

        // Multipart bodies are consumed on send, so the form is rebuilt per attempt.
        let response = self
            .session
            .send("Outline documents.import", Idempotency::Write, |client| {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(WORD_MIME)
                    .unwrap_or_else(|_| Part::bytes(bytes.clone()).file_name(file_name.clone()));
                let mut form = Form::new()
                    .text("collectionId", collection_id.clone())
                    .text("publish", "true")
                    .part("file", part);
                if let Some(parent) = &parent {
                    form = form.text("parentDocumentId", parent.clone());
                }
                client.post(&url).bearer_auth(&token).multipart(form)
            })?;
        let payload: Value = response
            .json()
            .context("failed to decode Outline documents.import response")?;
        let data: DocumentPayload = decode_envelope("documents.import", payload)?;
        Ok(ImportResult {
            id: data.id,
            url_id: data.url_id,
            title: data.title,
        })
    }

    fn document_info(&mut self, document_id: &str) -> Result<DocumentContent> {
        let data: DocumentPayload = self.post_json(
            "documents.info",
            &json!({ "id": document_id }),
            Idempotency::Read,
        )?;
        Ok(DocumentContent {
            id: data.id,
            title: data.title,
            text: data.text.unwrap_or_default(),
        })
    }

    fn update_document(&mut self, update: &DocumentUpdate) -> Result<()> {
        let body = serde_json::to_value(update).context("failed to encode document update")?;
        self.post_ack("documents.update", &body)
    }

    fn list_documents(&mut self, collection_id: &str) -> Result<Vec<DocumentSummary>> {
        let mut output = Vec::new();
        loop {
            let page: Vec<DocumentPayload> = self.post_json(
                "documents.list",
                &json!({
                    "collectionId": collection_id,
                    "offset": output.len(),
                    "limit": LIST_LIMIT,
                }),
                Idempotency::Read,
            )?;
            let fetched = page.len();
            output.extend(page.into_iter().map(|item| DocumentSummary {
                id: item.id,
                title: item.title,
                parent_document_id: item.parent_document_id,
            }));
            if fetched < LIST_LIMIT {
                break;
            }
        }
        Ok(output)
    }

    fn delete_document(&mut self, document_id: &str) -> Result<()> {
        self.post_ack("documents.delete", &json!({ "id": document_id }))
    }

    fn request_count(&self) -> usize {
        self.session.request_count()
    }
}

/// Unwrap Outline's `{ "ok": ..., "data": ... }` envelope.
fn decode_envelope<T: DeserializeOwned>(method: &str, payload: Value) -> Result<T> {
    let data = check_envelope(method, payload)?
        .ok_or_else(|| anyhow::anyhow!("missing data in Outline {method} response"))?;
    serde_json::from_value(data).with_context(|| format!("failed to decode Outline {method} data"))
}

fn check_envelope(method: &str, payload: Value) -> Result<Option<Value>> {
    let envelope: Envelope = serde_json::from_value(payload)
        .with_context(|| format!("unexpected Outline {method} response shape"))?;
    if envelope.ok == Some(false) || envelope.error.is_some() {
        bail!(
            "Outline API error on {method} [{}]: {}",
            envelope.error.as_deref().unwrap_or("unknown_error"),
            envelope.message.as_deref().unwrap_or("no message")
        );
    }
    Ok(envelope.data)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: Option<bool>,
    error: Option<String>,
    message: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CollectionPayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPayload {
    id: String,
    #[serde(default)]
    url_id: String,
    #[serde(default)]
    title: String,
    text: Option<String>,
    parent_document_id: Option<String>,
}
