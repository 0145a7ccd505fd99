use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::MigrateConfig;
use crate::outline::{DestinationApi, OutlineClient, OutlineClientConfig};

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub collection_id: String,
    pub collection_name: String,
    pub dry_run: bool,
    pub found: usize,
    /// Documents deleted directly, in listing order.
    pub deleted: Vec<String>,
    /// Nested documents Outline removed together with a deleted ancestor.
    pub removed_with_parent: usize,
    pub request_count: usize,
}

/// Delete every document in an Outline collection.
///
/// Outline deletes nested documents together with their parent, so only
/// documents whose parent is not itself listed are deleted directly.
pub fn clean_collection(
    config: &MigrateConfig,
    collection_id: &str,
    options: &CleanOptions,
) -> Result<CleanReport> {
    let mut client = OutlineClient::new(OutlineClientConfig::from_config(config)?)?;
    clean_collection_with_api(&mut client, collection_id, options)
}

pub fn clean_collection_with_api<D: DestinationApi>(
    api: &mut D,
    collection_id: &str,
    options: &CleanOptions,
) -> Result<CleanReport> {
    let collection_id = collection_id.trim();
    if Uuid::parse_str(collection_id).is_err() {
        bail!("clean requires a collection UUID, got `{collection_id}`");
    }

    let collection = api
        .collection_info(collection_id)
        .with_context(|| format!("failed to resolve Outline collection {collection_id}"))?;
    let documents = api
        .list_documents(collection_id)
        .with_context(|| format!("failed to list documents in collection {collection_id}"))?;

    let mut report = CleanReport {
        collection_id: collection_id.to_string(),
        collection_name: collection.name,
        dry_run: options.dry_run,
        found: documents.len(),
        deleted: Vec::new(),
        removed_with_parent: 0,
        request_count: 0,
    };

    if !options.dry_run {
        let listed: BTreeSet<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
        let (tops, nested): (Vec<_>, Vec<_>) = documents.iter().partition(|doc| {
            doc.parent_document_id
                .as_deref()
                .is_none_or(|parent| !listed.contains(parent))
        });
        report.removed_with_parent = nested.len();
        for document in tops {
            api.delete_document(&document.id)
                .with_context(|| format!("failed to delete document {}", document.id))?;
            info!(document_id = %document.id, title = %document.title, "deleted document");
            report.deleted.push(document.id.clone());
        }
    }

    report.request_count = api.request_count();
    Ok(report)
}
